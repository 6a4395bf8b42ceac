//! Periodic alert evaluation: one cycle loads every pending alert, fetches each
//! (venue, date) once, evaluates, delivers and writes back what changed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::availability;
use crate::config::Config;
use crate::cooldown;
use crate::mailer::{SmtpNotifier, templates};
use crate::matcher;
use crate::models::{AlertKind, Condition, ShowtimeRecord, Subscription, Venue};
use crate::planner::{self, FetchGroup, GroupKey};
use crate::scrapers::ProviderRegistry;
use crate::traits::{AlertStore, FetchError, Notifier};
use crate::trigger::{self, Decision, Evaluation};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound for a single schedule fetch; no retry follows a timeout
    pub fetch_timeout: Duration,
    /// Groups fetched and evaluated at the same time
    pub max_concurrent_fetches: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 4,
        }
    }
}

/// Counters for one completed cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub subscriptions: usize,
    pub groups: usize,
    pub fetch_failures: usize,
    pub evaluated: usize,
    pub fired: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    /// Fired alerts another run had already claimed
    pub claimed_elsewhere: usize,
    pub persisted: usize,
}

impl CycleReport {
    fn absorb(&mut self, group: &CycleReport) {
        self.fetch_failures += group.fetch_failures;
        self.evaluated += group.evaluated;
        self.fired += group.fired;
        self.delivered += group.delivered;
        self.delivery_failures += group.delivery_failures;
        self.claimed_elsewhere += group.claimed_elsewhere;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle held the run flag, nothing was evaluated
    Skipped,
}

enum Delivery {
    Sent,
    Failed,
    ClaimedElsewhere,
}

/// Result of one group: its counters and the alerts whose state moved
#[derive(Default)]
struct GroupOutcome {
    stats: CycleReport,
    changed: Vec<Subscription>,
}

/// Clears the run flag when the cycle ends, panics included
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct AlertEngine {
    store: Arc<dyn AlertStore>,
    providers: ProviderRegistry,
    notifier: Arc<dyn Notifier>,
    settings: EngineSettings,
    running: Arc<AtomicBool>,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn AlertStore>,
        providers: ProviderRegistry,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            providers,
            notifier,
            settings,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Engine backed by `store`, the vendor providers and SMTP delivery
    pub fn from_config(config: &Config, store: Arc<dyn AlertStore>) -> Result<Self> {
        let providers = ProviderRegistry::from_config(config)?;
        let notifier = SmtpNotifier::from_config(&config.smtp)?;

        Ok(Self::new(
            store,
            providers,
            Arc::new(notifier),
            EngineSettings {
                fetch_timeout: config.fetch_timeout,
                max_concurrent_fetches: config.max_concurrent_fetches,
            },
        ))
    }

    /// Runs one full cycle unless another one is still in progress.
    ///
    /// Only loading pending alerts and persisting updates can fail the cycle;
    /// fetch and delivery problems are logged and counted in the report.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("Previous alert cycle still running, skipping this tick");
            return Ok(CycleOutcome::Skipped);
        };

        let report = self.run_cycle_at(Utc::now(), Local::now().date_naive()).await?;
        Ok(CycleOutcome::Completed(report))
    }

    async fn run_cycle_at(&self, now: DateTime<Utc>, today: NaiveDate) -> Result<CycleReport> {
        let mut pending = self
            .store
            .list_pending(AlertKind::Open)
            .await
            .context("loading pending open alerts")?;
        pending.extend(
            self.store
                .list_pending(AlertKind::Seat)
                .await
                .context("loading pending seat alerts")?,
        );
        pending.retain(|subscription| cooldown::may_evaluate(&subscription.state));

        let mut report = CycleReport {
            subscriptions: pending.len(),
            ..CycleReport::default()
        };

        if pending.is_empty() {
            info!("No pending alerts");
            return Ok(report);
        }

        let groups = planner::plan(pending, today);
        report.groups = groups.len();
        info!(
            "Checking {} alerts across {} venue/date groups",
            report.subscriptions, report.groups
        );

        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_fetches.max(1)));
        let mut tasks = JoinSet::new();

        for group in groups {
            let engine = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                engine.process_group(group, now).await
            });
        }

        let mut changed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.absorb(&outcome.stats);
                    changed.extend(outcome.changed);
                }
                Err(e) => error!("Alert group task failed: {}", e),
            }
        }

        // Single writer: every row is saved at most once, after all groups finished
        let mut persist_failures = 0;
        for subscription in &changed {
            match self.store.save(subscription).await {
                Ok(()) => report.persisted += 1,
                Err(e) => {
                    persist_failures += 1;
                    error!("Failed to persist {}: {:#}", subscription.label(), e);
                }
            }
        }

        info!(
            "Cycle finished: {} evaluated, {} fired, {} delivered, {} delivery failures, \
             {} fetch failures, {} saved",
            report.evaluated,
            report.fired,
            report.delivered,
            report.delivery_failures,
            report.fetch_failures,
            report.persisted
        );

        if persist_failures > 0 {
            bail!(
                "failed to persist {persist_failures} of {} updated alerts",
                changed.len()
            );
        }

        Ok(report)
    }

    async fn fetch(
        &self,
        venue: &Venue,
        date: NaiveDate,
    ) -> Result<Vec<ShowtimeRecord>, FetchError> {
        let provider = self
            .providers
            .get(venue.vendor)
            .ok_or_else(|| FetchError::UnknownVenue(venue.to_string()))?;
        let timeout = self.settings.fetch_timeout;

        tokio::time::timeout(timeout, provider.get_showtimes(&venue.code, date))
            .await
            .map_err(|_| FetchError::Timeout(timeout.as_secs()))?
    }

    async fn process_group(&self, group: FetchGroup, now: DateTime<Utc>) -> GroupOutcome {
        let FetchGroup { key, subscriptions } = group;
        let GroupKey { venue, date } = &key;
        let mut outcome = GroupOutcome::default();

        let records = match self.fetch(venue, *date).await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    "Fetching {} on {} failed, {} alerts wait for the next cycle: {}",
                    venue,
                    date,
                    subscriptions.len(),
                    e
                );
                outcome.stats.fetch_failures = 1;
                return outcome;
            }
        };

        info!(
            "{} on {}: {} showtimes for {} alerts",
            venue,
            date,
            records.len(),
            subscriptions.len()
        );

        for mut subscription in subscriptions {
            if !cooldown::may_evaluate(&subscription.state) {
                continue;
            }

            let evaluation = trigger::evaluate(&subscription, &records);
            outcome.stats.evaluated += 1;
            cooldown::record_checked(&mut subscription, &evaluation, now);

            match evaluation.decision {
                Decision::Fire => {
                    outcome.stats.fired += 1;
                    info!("{} ({}) triggered", subscription.label(), subscription.movie_keyword);

                    match self.deliver(&subscription, &evaluation, *date).await {
                        Delivery::Sent => {
                            cooldown::record_sent(&mut subscription.state, now);
                            outcome.stats.delivered += 1;
                        }
                        Delivery::Failed => outcome.stats.delivery_failures += 1,
                        Delivery::ClaimedElsewhere => outcome.stats.claimed_elsewhere += 1,
                    }
                }
                Decision::Hold => {
                    debug!(
                        "{} ({}) not yet true",
                        subscription.label(),
                        subscription.movie_keyword
                    );
                }
                Decision::Inconclusive => {
                    debug!(
                        "{} matched a showtime without readable availability",
                        subscription.label()
                    );
                }
            }

            outcome.changed.push(subscription);
        }

        outcome
    }

    /// Renders the alert, claims it in the store and sends it.
    async fn deliver(
        &self,
        subscription: &Subscription,
        evaluation: &Evaluation,
        date: NaiveDate,
    ) -> Delivery {
        let notification = match &subscription.condition {
            Condition::Open { .. } => {
                templates::open_alert(subscription, evaluation.matched_title.as_deref(), date)
            }
            Condition::Seat(_) => {
                let Some(notification) = evaluation
                    .available_seats
                    .and_then(|seats| templates::seat_alert(subscription, seats))
                else {
                    warn!("{} fired without a seat count, not sending", subscription.label());
                    return Delivery::Failed;
                };
                notification
            }
        };

        match self.store.claim(subscription).await {
            Ok(true) => {}
            Ok(false) => {
                info!("{} was already claimed by another run, not sending", subscription.label());
                return Delivery::ClaimedElsewhere;
            }
            Err(e) => {
                warn!("Claiming {} failed, will retry next cycle: {:#}", subscription.label(), e);
                return Delivery::Failed;
            }
        }

        match self.notifier.send(&subscription.recipient, &notification).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                warn!(
                    "Delivering {} via {} failed, will retry next cycle: {}",
                    subscription.label(),
                    self.notifier.channel_name(),
                    e
                );
                if let Err(e) = self.store.release(subscription).await {
                    error!(
                        "Releasing {} failed, it stays marked sent: {:#}",
                        subscription.label(),
                        e
                    );
                }
                Delivery::Failed
            }
        }
    }

    /// Current availability of a seat alert's target showtime, used as its baseline.
    ///
    /// # Returns
    /// * `Ok(None)` - The showtime was not found or its availability was unreadable
    pub async fn current_seats(&self, subscription: &Subscription) -> Result<Option<u32>> {
        let date = planner::evaluation_date(subscription, Local::now().date_naive());
        let records = self.fetch(&subscription.venue, date).await?;

        Ok(matcher::match_seat(subscription, &records)
            .and_then(|record| availability::extract_available_seats(&record.seats_status)))
    }
}
