//! Data models for alert subscriptions, showtime records and outgoing notifications

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticketing site a venue belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Megabox,
    Cgv,
}

impl Vendor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Megabox => "megabox",
            Self::Cgv => "cgv",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "megabox" => Ok(Self::Megabox),
            "cgv" => Ok(Self::Cgv),
            other => Err(anyhow::anyhow!("unknown vendor: {other}")),
        }
    }
}

/// A single cinema branch, identified by its vendor-specific code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Venue {
    pub vendor: Vendor,
    pub code: String,
}

impl Venue {
    pub fn new(vendor: Vendor, code: impl Into<String>) -> Self {
        Self {
            vendor,
            code: code.into(),
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vendor, self.code)
    }
}

/// One parsed row of a venue's schedule for a single date.
///
/// Produced fresh by a provider on every fetch and discarded at the end of the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowtimeRecord {
    pub movie_title: String,
    pub screen_name: String,
    /// Start time as shown by the vendor, normally `HH:MM`
    pub start_time: String,
    /// Free-text availability, e.g. `잔여 152석` or `매진`
    pub seats_status: String,
    pub bookable: bool,
}

/// Which of the two conditions a subscription watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    Open,
    Seat,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Seat => f.write_str("seat"),
        }
    }
}

/// Target showtime and seat thresholds of a seat-type subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatTarget {
    pub show_time: NaiveTime,
    /// Minimum increase over the baseline that fires the alert, always positive
    pub desired_count: u32,
    /// Availability when the subscription was created. Never rewritten.
    pub baseline_available_seats: u32,
    /// Availability seen by the most recent readable evaluation
    pub last_available_seats: Option<u32>,
}

/// Kind-specific part of a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Fires once a bookable showtime for the film exists
    Open { show_time: Option<NaiveTime> },
    /// Fires once the target showtime gained at least `desired_count` seats
    Seat(SeatTarget),
}

/// Lifecycle bookkeeping shared by both kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertState {
    pub active: bool,
    /// Terminal once set. Nothing in the engine clears it.
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub send_count: u32,
    pub last_checked: Option<DateTime<Utc>>,
    /// Stored for each row but not consulted: alerts are one-shot
    pub cooldown_min: u32,
    pub created_at: DateTime<Utc>,
}

impl AlertState {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            active: true,
            is_sent: false,
            sent_at: None,
            send_count: 0,
            last_checked: None,
            cooldown_min: 0,
            created_at,
        }
    }
}

/// A stored request to be notified when a condition becomes true
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Row id, `None` until the store assigned one
    pub id: Option<i64>,
    pub recipient: String,
    pub venue: Venue,
    pub movie_keyword: String,
    pub screen: Option<String>,
    /// Required for seat-type subscriptions
    pub target_date: Option<NaiveDate>,
    pub condition: Condition,
    pub state: AlertState,
}

impl Subscription {
    pub fn kind(&self) -> AlertKind {
        match self.condition {
            Condition::Open { .. } => AlertKind::Open,
            Condition::Seat(_) => AlertKind::Seat,
        }
    }

    /// Human-readable handle for log lines, e.g. `seat#12`
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("{}#{id}", self.kind()),
            None => format!("{}#new", self.kind()),
        }
    }
}

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_parses_case_insensitively() {
        assert_eq!("MegaBox".parse::<Vendor>().unwrap(), Vendor::Megabox);
        assert_eq!(" cgv ".parse::<Vendor>().unwrap(), Vendor::Cgv);
        assert!("lotte".parse::<Vendor>().is_err());
    }

    #[test]
    fn label_includes_kind_and_id() {
        let subscription = Subscription {
            id: Some(7),
            recipient: "fan@example.com".to_string(),
            venue: Venue::new(Vendor::Megabox, "1351"),
            movie_keyword: "Zootopia".to_string(),
            screen: None,
            target_date: None,
            condition: Condition::Open { show_time: None },
            state: AlertState::new(Utc::now()),
        };

        assert_eq!(subscription.kind(), AlertKind::Open);
        assert_eq!(subscription.label(), "open#7");
    }
}
