use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteQueryResult, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::info;

use crate::models::{AlertKind, AlertState, Condition, SeatTarget, Subscription, Venue};
use crate::traits::AlertStore;

const OPEN_COLUMNS: &str = "id, recipient, vendor, venue_code, movie_keyword, screen, target_date, \
    show_time, active, is_sent, sent_at, send_count, last_checked, cooldown_min, created_at";

const SEAT_COLUMNS: &str = "id, recipient, vendor, venue_code, movie_keyword, screen, target_date, \
    show_time, desired_count, baseline_available_seats, last_available_seats, active, is_sent, \
    sent_at, send_count, last_checked, cooldown_min, created_at";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            if let Some(parent) = db_url
                .strip_prefix("sqlite:")
                .map(|path| path.trim_start_matches("//"))
                .and_then(|path| Path::new(path).parent())
                .filter(|parent| !parent.as_os_str().is_empty())
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {}", parent.display()))?;
            }

            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePool::connect(db_url).await?;
        Self::migrate(pool).await
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        // Every pooled connection to `:memory:` would see its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    /// Every subscription of one kind, sent or not, newest first
    pub async fn list_all(&self, kind: AlertKind) -> Result<Vec<Subscription>> {
        let sql = match kind {
            AlertKind::Open => format!("SELECT {OPEN_COLUMNS} FROM open_alerts ORDER BY id DESC"),
            AlertKind::Seat => format!("SELECT {SEAT_COLUMNS} FROM seat_alerts ORDER BY id DESC"),
        };

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|row| subscription_from_row(kind, row)).collect()
    }

    /// Removes a subscription. Returns whether a row was deleted.
    pub async fn delete(&self, kind: AlertKind, id: i64) -> Result<bool> {
        let sql = match kind {
            AlertKind::Open => "DELETE FROM open_alerts WHERE id = ?",
            AlertKind::Seat => "DELETE FROM seat_alerts WHERE id = ?",
        };

        let result = sqlx::query(sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_open(
        &self,
        subscription: &Subscription,
        show_time: Option<NaiveTime>,
    ) -> Result<SqliteQueryResult> {
        let state = &subscription.state;

        let result = sqlx::query(
            r"
            INSERT INTO open_alerts (recipient, vendor, venue_code, movie_keyword, screen,
                target_date, show_time, active, is_sent, sent_at, send_count, last_checked,
                cooldown_min, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&subscription.recipient)
        .bind(subscription.venue.vendor.as_str())
        .bind(&subscription.venue.code)
        .bind(&subscription.movie_keyword)
        .bind(&subscription.screen)
        .bind(subscription.target_date)
        .bind(show_time)
        .bind(state.active)
        .bind(state.is_sent)
        .bind(state.sent_at)
        .bind(i64::from(state.send_count))
        .bind(state.last_checked)
        .bind(i64::from(state.cooldown_min))
        .bind(state.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result)
    }

    async fn insert_seat(
        &self,
        subscription: &Subscription,
        target: &SeatTarget,
    ) -> Result<SqliteQueryResult> {
        let state = &subscription.state;
        let target_date = subscription
            .target_date
            .ok_or_else(|| anyhow!("{} has no target date", subscription.label()))?;

        let result = sqlx::query(
            r"
            INSERT INTO seat_alerts (recipient, vendor, venue_code, movie_keyword, screen,
                target_date, show_time, desired_count, baseline_available_seats,
                last_available_seats, active, is_sent, sent_at, send_count, last_checked,
                cooldown_min, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&subscription.recipient)
        .bind(subscription.venue.vendor.as_str())
        .bind(&subscription.venue.code)
        .bind(&subscription.movie_keyword)
        .bind(&subscription.screen)
        .bind(target_date)
        .bind(target.show_time)
        .bind(i64::from(target.desired_count))
        .bind(i64::from(target.baseline_available_seats))
        .bind(target.last_available_seats.map(i64::from))
        .bind(state.active)
        .bind(state.is_sent)
        .bind(state.sent_at)
        .bind(i64::from(state.send_count))
        .bind(state.last_checked)
        .bind(i64::from(state.cooldown_min))
        .bind(state.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result)
    }

    /// Writes lifecycle fields of an existing row. is_sent and send_count never
    /// decrease and the baseline is never touched.
    async fn update_lifecycle(
        &self,
        subscription: &Subscription,
        id: i64,
    ) -> Result<SqliteQueryResult> {
        let state = &subscription.state;

        let query = match &subscription.condition {
            Condition::Open { .. } => sqlx::query(
                r"
                UPDATE open_alerts SET
                    active = ?,
                    is_sent = MAX(is_sent, ?),
                    sent_at = COALESCE(?, sent_at),
                    send_count = MAX(send_count, ?),
                    last_checked = COALESCE(?, last_checked),
                    cooldown_min = ?
                WHERE id = ?
                ",
            ),
            Condition::Seat(target) => sqlx::query(
                r"
                UPDATE seat_alerts SET
                    last_available_seats = COALESCE(?, last_available_seats),
                    active = ?,
                    is_sent = MAX(is_sent, ?),
                    sent_at = COALESCE(?, sent_at),
                    send_count = MAX(send_count, ?),
                    last_checked = COALESCE(?, last_checked),
                    cooldown_min = ?
                WHERE id = ?
                ",
            )
            .bind(target.last_available_seats.map(i64::from)),
        };

        let result = query
            .bind(state.active)
            .bind(state.is_sent)
            .bind(state.sent_at)
            .bind(i64::from(state.send_count))
            .bind(state.last_checked)
            .bind(i64::from(state.cooldown_min))
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result)
    }
}

fn table(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::Open => "open_alerts",
        AlertKind::Seat => "seat_alerts",
    }
}

fn count(row: &SqliteRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).with_context(|| format!("{column} out of range: {value}"))
}

fn subscription_from_row(kind: AlertKind, row: &SqliteRow) -> Result<Subscription> {
    let vendor: String = row.try_get("vendor")?;

    let condition = match kind {
        AlertKind::Open => Condition::Open {
            show_time: row.try_get::<Option<NaiveTime>, _>("show_time")?,
        },
        AlertKind::Seat => Condition::Seat(SeatTarget {
            show_time: row.try_get("show_time")?,
            desired_count: count(row, "desired_count")?,
            baseline_available_seats: count(row, "baseline_available_seats")?,
            last_available_seats: row
                .try_get::<Option<i64>, _>("last_available_seats")?
                .map(u32::try_from)
                .transpose()
                .context("last_available_seats out of range")?,
        }),
    };

    Ok(Subscription {
        id: Some(row.try_get("id")?),
        recipient: row.try_get("recipient")?,
        venue: Venue::new(vendor.parse()?, row.try_get::<String, _>("venue_code")?),
        movie_keyword: row.try_get("movie_keyword")?,
        screen: row.try_get("screen")?,
        target_date: row.try_get::<Option<NaiveDate>, _>("target_date")?,
        condition,
        state: AlertState {
            active: row.try_get("active")?,
            is_sent: row.try_get("is_sent")?,
            sent_at: row.try_get::<Option<DateTime<Utc>>, _>("sent_at")?,
            send_count: count(row, "send_count")?,
            last_checked: row.try_get::<Option<DateTime<Utc>>, _>("last_checked")?,
            cooldown_min: count(row, "cooldown_min")?,
            created_at: row.try_get("created_at")?,
        },
    })
}

#[async_trait]
impl AlertStore for Database {
    async fn create(&self, subscription: &Subscription) -> Result<i64> {
        let result = match &subscription.condition {
            Condition::Open { show_time } => self.insert_open(subscription, *show_time).await?,
            Condition::Seat(target) => self.insert_seat(subscription, target).await?,
        };
        let id = result.last_insert_rowid();

        info!("Created {} alert #{} for {}", subscription.kind(), id, subscription.venue);
        Ok(id)
    }

    async fn list_pending(&self, kind: AlertKind) -> Result<Vec<Subscription>> {
        let sql = match kind {
            AlertKind::Open => format!(
                "SELECT {OPEN_COLUMNS} FROM open_alerts WHERE active = 1 AND is_sent = 0 ORDER BY id"
            ),
            AlertKind::Seat => format!(
                "SELECT {SEAT_COLUMNS} FROM seat_alerts WHERE active = 1 AND is_sent = 0 ORDER BY id"
            ),
        };

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|row| subscription_from_row(kind, row)).collect()
    }

    async fn save(&self, subscription: &Subscription) -> Result<()> {
        let Some(id) = subscription.id else {
            return Err(anyhow!("cannot save {} before it was created", subscription.label()));
        };

        let result = self.update_lifecycle(subscription, id).await?;
        if result.rows_affected() == 0 {
            info!("{} was deleted meanwhile, not saving it", subscription.label());
        }

        Ok(())
    }

    async fn claim(&self, subscription: &Subscription) -> Result<bool> {
        let Some(id) = subscription.id else {
            return Err(anyhow!("cannot claim {} before it was created", subscription.label()));
        };

        let sql = format!(
            "UPDATE {} SET is_sent = 1 WHERE id = ? AND active = 1 AND is_sent = 0",
            table(subscription.kind())
        );
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, subscription: &Subscription) -> Result<()> {
        let Some(id) = subscription.id else {
            return Err(anyhow!("cannot release {} before it was created", subscription.label()));
        };

        // A claim never sets sent_at, a delivered alert always has it
        let sql = format!(
            "UPDATE {} SET is_sent = 0 WHERE id = ? AND sent_at IS NULL",
            table(subscription.kind())
        );
        sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooldown;
    use crate::models::Vendor;

    fn open_alert() -> Subscription {
        Subscription {
            id: None,
            recipient: "fan@example.com".to_string(),
            venue: Venue::new(Vendor::Megabox, "1351"),
            movie_keyword: "주토피아".to_string(),
            screen: Some("DOLBY".to_string()),
            target_date: None,
            condition: Condition::Open {
                show_time: NaiveTime::from_hms_opt(19, 10, 0),
            },
            state: AlertState::new(Utc::now()),
        }
    }

    fn seat_alert() -> Subscription {
        Subscription {
            target_date: NaiveDate::from_ymd_opt(2025, 12, 8),
            condition: Condition::Seat(SeatTarget {
                show_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
                desired_count: 2,
                baseline_available_seats: 10,
                last_available_seats: None,
            }),
            ..open_alert()
        }
    }

    #[tokio::test]
    async fn created_alerts_come_back_pending() {
        let db = Database::in_memory().await.unwrap();

        let open_id = db.create(&open_alert()).await.unwrap();
        let seat_id = db.create(&seat_alert()).await.unwrap();

        let open = db.list_pending(AlertKind::Open).await.unwrap();
        let seat = db.list_pending(AlertKind::Seat).await.unwrap();

        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, Some(open_id));
        assert_eq!(open[0].condition, open_alert().condition);
        assert_eq!(seat.len(), 1);
        assert_eq!(seat[0].id, Some(seat_id));
        assert_eq!(seat[0].condition, seat_alert().condition);
        assert_eq!(seat[0].target_date, seat_alert().target_date);
    }

    #[tokio::test]
    async fn sent_alerts_leave_the_pending_list() {
        let db = Database::in_memory().await.unwrap();
        let id = db.create(&open_alert()).await.unwrap();

        let mut alert = db.list_pending(AlertKind::Open).await.unwrap().remove(0);
        cooldown::record_sent(&mut alert.state, Utc::now());
        db.save(&alert).await.unwrap();

        assert!(db.list_pending(AlertKind::Open).await.unwrap().is_empty());
        let stored = db.list_all(AlertKind::Open).await.unwrap();
        assert_eq!(stored[0].id, Some(id));
        assert!(stored[0].state.is_sent);
        assert_eq!(stored[0].state.send_count, 1);
    }

    #[tokio::test]
    async fn stale_copy_cannot_clear_is_sent() {
        let db = Database::in_memory().await.unwrap();
        db.create(&open_alert()).await.unwrap();
        let stale = db.list_pending(AlertKind::Open).await.unwrap().remove(0);

        let mut sent = stale.clone();
        cooldown::record_sent(&mut sent.state, Utc::now());
        db.save(&sent).await.unwrap();
        db.save(&stale).await.unwrap();

        let stored = db.list_all(AlertKind::Open).await.unwrap().remove(0);
        assert!(stored.state.is_sent);
        assert_eq!(stored.state.send_count, 1);
    }

    #[tokio::test]
    async fn baseline_survives_saves() {
        let db = Database::in_memory().await.unwrap();
        db.create(&seat_alert()).await.unwrap();

        let mut alert = db.list_pending(AlertKind::Seat).await.unwrap().remove(0);
        if let Condition::Seat(target) = &mut alert.condition {
            target.baseline_available_seats = 99;
            target.last_available_seats = Some(11);
        }
        alert.state.last_checked = Some(Utc::now());
        db.save(&alert).await.unwrap();

        let stored = db.list_pending(AlertKind::Seat).await.unwrap().remove(0);
        let Condition::Seat(target) = stored.condition else {
            panic!("expected a seat alert");
        };
        assert_eq!(target.baseline_available_seats, 10);
        assert_eq!(target.last_available_seats, Some(11));
        assert!(stored.state.last_checked.is_some());
    }

    #[tokio::test]
    async fn inactive_alerts_are_not_pending() {
        let db = Database::in_memory().await.unwrap();
        let mut alert = open_alert();
        alert.state.active = false;
        db.create(&alert).await.unwrap();

        assert!(db.list_pending(AlertKind::Open).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let db = Database::in_memory().await.unwrap();
        let id = db.create(&seat_alert()).await.unwrap();

        assert!(db.delete(AlertKind::Seat, id).await.unwrap());
        assert!(!db.delete(AlertKind::Seat, id).await.unwrap());
        assert!(db.list_all(AlertKind::Seat).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saving_a_deleted_alert_does_not_restore_it() {
        let db = Database::in_memory().await.unwrap();
        let id = db.create(&open_alert()).await.unwrap();
        let mut loaded = db.list_pending(AlertKind::Open).await.unwrap().remove(0);

        assert!(db.delete(AlertKind::Open, id).await.unwrap());
        loaded.state.last_checked = Some(Utc::now());
        db.save(&loaded).await.unwrap();

        assert!(db.list_all(AlertKind::Open).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_one_claim_wins() {
        let db = Database::in_memory().await.unwrap();
        db.create(&seat_alert()).await.unwrap();
        let alert = db.list_pending(AlertKind::Seat).await.unwrap().remove(0);

        assert!(db.claim(&alert).await.unwrap());
        assert!(!db.claim(&alert).await.unwrap());
        assert!(db.list_pending(AlertKind::Seat).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn released_claim_is_pending_again() {
        let db = Database::in_memory().await.unwrap();
        db.create(&open_alert()).await.unwrap();
        let alert = db.list_pending(AlertKind::Open).await.unwrap().remove(0);

        assert!(db.claim(&alert).await.unwrap());
        db.release(&alert).await.unwrap();

        assert_eq!(db.list_pending(AlertKind::Open).await.unwrap().len(), 1);
        assert!(db.claim(&alert).await.unwrap());
    }

    #[tokio::test]
    async fn release_keeps_delivered_alerts_sent() {
        let db = Database::in_memory().await.unwrap();
        db.create(&open_alert()).await.unwrap();
        let mut alert = db.list_pending(AlertKind::Open).await.unwrap().remove(0);

        assert!(db.claim(&alert).await.unwrap());
        cooldown::record_sent(&mut alert.state, Utc::now());
        db.save(&alert).await.unwrap();
        db.release(&alert).await.unwrap();

        let stored = db.list_all(AlertKind::Open).await.unwrap().remove(0);
        assert!(stored.state.is_sent);
    }

    #[tokio::test]
    async fn saving_an_uncreated_alert_fails() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.save(&open_alert()).await.is_err());
    }
}
