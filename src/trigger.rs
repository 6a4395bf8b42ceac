//! Fire/no-fire policies for open-type and seat-type subscriptions.
//!
//! Both policies are pure: they read a subscription and the showtimes fetched for
//! its venue and date, and never touch persisted state.

use crate::availability::extract_available_seats;
use crate::matcher::{match_open, match_seat};
use crate::models::{Condition, ShowtimeRecord, Subscription};

/// Outcome of evaluating one subscription against one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The condition holds; a notification should go out
    Fire,
    /// The condition does not hold yet
    Hold,
    /// The matched showtime had no readable availability this cycle
    Inconclusive,
}

/// What the evaluator saw, for state updates and message rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    /// Title of the first matching record as the vendor spells it
    pub matched_title: Option<String>,
    /// Seat count read from the matched record (seat-type only)
    pub available_seats: Option<u32>,
}

impl Evaluation {
    fn hold() -> Self {
        Self {
            decision: Decision::Hold,
            matched_title: None,
            available_seats: None,
        }
    }
}

/// Evaluates a subscription with the policy matching its kind.
pub fn evaluate(subscription: &Subscription, records: &[ShowtimeRecord]) -> Evaluation {
    match &subscription.condition {
        Condition::Open { .. } => evaluate_open(subscription, records),
        Condition::Seat(_) => evaluate_seat(subscription, records),
    }
}

/// Fires iff at least one bookable showtime matches title, screen and time.
pub fn evaluate_open(subscription: &Subscription, records: &[ShowtimeRecord]) -> Evaluation {
    match match_open(subscription, records).first() {
        Some(record) => Evaluation {
            decision: Decision::Fire,
            matched_title: Some(record.movie_title.clone()),
            available_seats: None,
        },
        None => Evaluation::hold(),
    }
}

/// Fires iff `current - baseline >= desired_count` for the targeted showtime.
pub fn evaluate_seat(subscription: &Subscription, records: &[ShowtimeRecord]) -> Evaluation {
    let Condition::Seat(target) = &subscription.condition else {
        return Evaluation::hold();
    };
    let Some(record) = match_seat(subscription, records) else {
        return Evaluation::hold();
    };

    let matched_title = Some(record.movie_title.clone());
    let Some(current) = extract_available_seats(&record.seats_status) else {
        return Evaluation {
            decision: Decision::Inconclusive,
            matched_title,
            available_seats: None,
        };
    };

    let increase = i64::from(current) - i64::from(target.baseline_available_seats);
    let decision = if increase >= i64::from(target.desired_count) {
        Decision::Fire
    } else {
        Decision::Hold
    };

    Evaluation {
        decision,
        matched_title,
        available_seats: Some(current),
    }
}
