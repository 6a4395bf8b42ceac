use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

mod availability;
mod config;
mod cooldown;
mod database;
mod engine;
mod mailer;
mod matcher;
mod models;
mod planner;
mod scrapers;
mod traits;
mod trigger;
mod venues;

use config::Config;
use database::Database;
use engine::{AlertEngine, CycleOutcome};
use models::{AlertKind, AlertState, Condition, SeatTarget, Subscription, Vendor, Venue};
use traits::AlertStore;

/// Movie ticket alerts: booking opened and seats released
#[derive(Parser, Debug)]
#[command(name = "catch-seat", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check now, then on CATCHSEAT_SCHEDULE until Ctrl-C (default)
    Run,
    /// Run a single cycle and exit
    RunOnce,
    /// Alert when a film opens for booking
    AddOpen {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "megabox")]
        vendor: Vendor,
        /// Venue code, e.g. 1351 for Megabox COEX
        #[arg(long)]
        venue: String,
        /// Title keyword, matched ignoring case and spaces
        #[arg(long)]
        movie: String,
        #[arg(long)]
        screen: Option<String>,
        /// YYYY-MM-DD, defaults to the day of each check
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Only this start time, e.g. 18:30
        #[arg(long)]
        time: Option<String>,
    },
    /// Alert when seats for one showtime increase
    AddSeat {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "megabox")]
        vendor: Vendor,
        #[arg(long)]
        venue: String,
        #[arg(long)]
        movie: String,
        #[arg(long)]
        screen: Option<String>,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        time: String,
        /// Seat increase over the baseline that triggers the alert
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        desired: u32,
        /// Seats available now; read from the live schedule when omitted
        #[arg(long)]
        baseline: Option<u32>,
    },
    /// Show every stored alert
    List,
    /// Delete an alert
    Delete {
        #[arg(value_enum)]
        kind: KindArg,
        id: i64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Open,
    Seat,
}

impl From<KindArg> for AlertKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Open => AlertKind::Open,
            KindArg::Seat => AlertKind::Seat,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let database = Arc::new(Database::new(&config.database_url).await?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let engine = AlertEngine::from_config(&config, database)?;
            run_scheduled(engine, &config.schedule).await
        }
        Command::RunOnce => {
            let engine = AlertEngine::from_config(&config, database)?;
            match engine.run_cycle().await? {
                CycleOutcome::Completed(report) => info!("{:?}", report),
                CycleOutcome::Skipped => info!("Cycle skipped"),
            }
            Ok(())
        }
        Command::AddOpen {
            email,
            vendor,
            venue,
            movie,
            screen,
            date,
            time,
        } => {
            let show_time = time.as_deref().map(parse_time).transpose()?;
            let subscription = Subscription {
                id: None,
                recipient: email,
                venue: Venue::new(vendor, venue),
                movie_keyword: movie,
                screen,
                target_date: date,
                condition: Condition::Open { show_time },
                state: AlertState::new(Utc::now()),
            };

            let id = database.create(&subscription).await?;
            println!("Created open alert #{id}");
            Ok(())
        }
        Command::AddSeat {
            email,
            vendor,
            venue,
            movie,
            screen,
            date,
            time,
            desired,
            baseline,
        } => {
            let mut subscription = Subscription {
                id: None,
                recipient: email,
                venue: Venue::new(vendor, venue),
                movie_keyword: movie,
                screen,
                target_date: Some(date),
                condition: Condition::Seat(SeatTarget {
                    show_time: parse_time(&time)?,
                    desired_count: desired,
                    baseline_available_seats: baseline.unwrap_or_default(),
                    last_available_seats: None,
                }),
                state: AlertState::new(Utc::now()),
            };

            if baseline.is_none() {
                let engine = AlertEngine::from_config(&config, database.clone())?;
                let current = engine.current_seats(&subscription).await?.ok_or_else(|| {
                    anyhow!("no readable seat count for that showtime, pass --baseline explicitly")
                })?;
                info!("Using {} currently available seats as the baseline", current);

                if let Condition::Seat(target) = &mut subscription.condition {
                    target.baseline_available_seats = current;
                    target.last_available_seats = Some(current);
                }
            }

            let id = database.create(&subscription).await?;
            println!("Created seat alert #{id}");
            Ok(())
        }
        Command::List => list(&database).await,
        Command::Delete { kind, id } => {
            let kind = AlertKind::from(kind);
            if !database.delete(kind, id).await? {
                bail!("no {kind} alert with id {id}");
            }
            println!("Deleted {kind} alert #{id}");
            Ok(())
        }
    }
}

fn parse_time(raw: &str) -> Result<chrono::NaiveTime> {
    matcher::normalize_clock(raw).with_context(|| format!("not a showtime: {raw}"))
}

async fn run_scheduled(engine: AlertEngine, schedule: &str) -> Result<()> {
    info!("Starting Catch-Seat alert runner");

    // Run once immediately
    if let Err(e) = engine.run_cycle().await {
        error!("Error during initial cycle: {:#}", e);
    }

    let mut sched = JobScheduler::new().await?;

    let job_engine = engine.clone();
    sched
        .add(Job::new_async(schedule, move |_uuid, _l| {
            let engine = job_engine.clone();
            Box::pin(async move {
                if let Err(e) = engine.run_cycle().await {
                    error!("Error during alert cycle: {:#}", e);
                }
            })
        })?)
        .await?;

    info!("Scheduler started - checking on '{}'", schedule);
    sched.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    sched.shutdown().await?;
    Ok(())
}

async fn list(database: &Database) -> Result<()> {
    for kind in [AlertKind::Open, AlertKind::Seat] {
        for subscription in database.list_all(kind).await? {
            let status = match (subscription.state.active, subscription.state.is_sent) {
                (_, true) => "sent",
                (false, false) => "inactive",
                (true, false) => "pending",
            };
            let detail = match &subscription.condition {
                Condition::Open { show_time } => show_time
                    .map(|time| time.format("%H:%M").to_string())
                    .unwrap_or_else(|| "any time".to_string()),
                Condition::Seat(target) => format!(
                    "{} +{} over {}",
                    target.show_time.format("%H:%M"),
                    target.desired_count,
                    target.baseline_available_seats
                ),
            };
            let date = subscription
                .target_date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "today".to_string());

            println!(
                "{:<8} {:<8} {:<28} {:<20} {:<10} {:<20} {}",
                subscription.label(),
                status,
                subscription.recipient,
                venues::display_name(&subscription.venue),
                date,
                detail,
                subscription.movie_keyword
            );
        }
    }
    Ok(())
}
