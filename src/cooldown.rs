//! Gate and state transitions that keep delivery at most once per subscription.
//!
//! A subscription moves from pending to sent exactly once, and only after the
//! dispatcher confirmed delivery. Failed deliveries leave it pending so the next
//! cycle retries. `cooldown_min` is kept on the row but never re-opens the gate.

use chrono::{DateTime, Utc};

use crate::models::{AlertState, Condition, Subscription};
use crate::trigger::Evaluation;

/// Whether the engine may evaluate this subscription at all.
pub fn may_evaluate(state: &AlertState) -> bool {
    state.active && !state.is_sent
}

/// Records an evaluation, whatever its outcome.
///
/// `last_available_seats` only moves when the evaluation actually read a seat count;
/// an inconclusive read leaves the previous value in place.
pub fn record_checked(
    subscription: &mut Subscription,
    evaluation: &Evaluation,
    now: DateTime<Utc>,
) {
    subscription.state.last_checked = Some(now);

    if let Condition::Seat(target) = &mut subscription.condition
        && let Some(seats) = evaluation.available_seats
    {
        target.last_available_seats = Some(seats);
    }
}

/// Records a confirmed delivery. Must only be called after the dispatcher succeeded.
pub fn record_sent(state: &mut AlertState, now: DateTime<Utc>) {
    state.is_sent = true;
    state.sent_at = Some(now);
    state.send_count += 1;
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::models::{SeatTarget, Venue, Vendor};
    use crate::trigger::Decision;

    fn seat_alert() -> Subscription {
        Subscription {
            id: Some(1),
            recipient: "fan@example.com".to_string(),
            venue: Venue::new(Vendor::Megabox, "0052"),
            movie_keyword: "Zootopia".to_string(),
            screen: None,
            target_date: NaiveDate::from_ymd_opt(2025, 12, 8),
            condition: Condition::Seat(SeatTarget {
                show_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
                desired_count: 2,
                baseline_available_seats: 10,
                last_available_seats: Some(10),
            }),
            state: AlertState::new(Utc::now()),
        }
    }

    fn last_seen(subscription: &Subscription) -> Option<u32> {
        match &subscription.condition {
            Condition::Seat(target) => target.last_available_seats,
            Condition::Open { .. } => None,
        }
    }

    #[test]
    fn gate_requires_active_and_unsent() {
        let mut state = AlertState::new(Utc::now());
        assert!(may_evaluate(&state));

        state.is_sent = true;
        assert!(!may_evaluate(&state));

        state.is_sent = false;
        state.active = false;
        assert!(!may_evaluate(&state));
    }

    #[test]
    fn sent_state_is_terminal_for_the_gate() {
        let mut state = AlertState::new(Utc::now());
        state.cooldown_min = 1;
        let now = Utc::now();

        record_sent(&mut state, now);

        assert!(state.is_sent);
        assert_eq!(state.sent_at, Some(now));
        assert_eq!(state.send_count, 1);
        assert!(!may_evaluate(&state));
    }

    #[test]
    fn checked_updates_seen_seats_when_readable() {
        let mut subscription = seat_alert();
        let now = Utc::now();
        let evaluation = Evaluation {
            decision: Decision::Hold,
            matched_title: None,
            available_seats: Some(11),
        };

        record_checked(&mut subscription, &evaluation, now);

        assert_eq!(subscription.state.last_checked, Some(now));
        assert_eq!(last_seen(&subscription), Some(11));
    }

    #[test]
    fn inconclusive_check_keeps_stale_seats() {
        let mut subscription = seat_alert();
        let evaluation = Evaluation {
            decision: Decision::Inconclusive,
            matched_title: None,
            available_seats: None,
        };

        record_checked(&mut subscription, &evaluation, Utc::now());

        assert!(subscription.state.last_checked.is_some());
        assert_eq!(last_seen(&subscription), Some(10));
        assert!(!subscription.state.is_sent);
    }
}
