//! Groups pending subscriptions so each (venue, date) is fetched once per cycle

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::models::{Subscription, Venue};

/// Key of a single external fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub venue: Venue,
    pub date: NaiveDate,
}

/// Subscriptions sharing one fetch
#[derive(Debug, Clone)]
pub struct FetchGroup {
    pub key: GroupKey,
    pub subscriptions: Vec<Subscription>,
}

/// The date a subscription is evaluated for: its target date, or `today` if it has none.
pub fn evaluation_date(subscription: &Subscription, today: NaiveDate) -> NaiveDate {
    subscription.target_date.unwrap_or(today)
}

/// Groups subscriptions by venue and evaluation date, ordered by key.
///
/// Subscriptions without a venue code cannot be fetched and are left out.
pub fn plan(subscriptions: Vec<Subscription>, today: NaiveDate) -> Vec<FetchGroup> {
    let mut groups: BTreeMap<GroupKey, Vec<Subscription>> = BTreeMap::new();

    for subscription in subscriptions {
        if subscription.venue.code.trim().is_empty() {
            warn!("{} has no venue code, skipping", subscription.label());
            continue;
        }

        let key = GroupKey {
            venue: subscription.venue.clone(),
            date: evaluation_date(&subscription, today),
        };
        groups.entry(key).or_default().push(subscription);
    }

    groups
        .into_iter()
        .map(|(key, subscriptions)| FetchGroup { key, subscriptions })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{AlertState, Condition, Vendor};

    fn alert(id: i64, code: &str, date: Option<NaiveDate>) -> Subscription {
        Subscription {
            id: Some(id),
            recipient: "fan@example.com".to_string(),
            venue: Venue::new(Vendor::Megabox, code),
            movie_keyword: "Zootopia".to_string(),
            screen: None,
            target_date: date,
            condition: Condition::Open { show_time: None },
            state: AlertState::new(Utc::now()),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    #[test]
    fn shared_venue_and_date_make_one_group() {
        let groups = plan(
            vec![alert(1, "1351", Some(day(8))), alert(2, "1351", Some(day(8)))],
            day(1),
        );

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].subscriptions.len(), 2);
    }

    #[test]
    fn missing_date_falls_back_to_today() {
        let groups = plan(
            vec![alert(1, "1351", None), alert(2, "1351", Some(day(1)))],
            day(1),
        );

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key.date, day(1));
    }

    #[test]
    fn distinct_keys_are_sorted() {
        let groups = plan(
            vec![
                alert(1, "4651", Some(day(8))),
                alert(2, "1351", Some(day(9))),
                alert(3, "1351", Some(day(8))),
            ],
            day(1),
        );

        let keys: Vec<_> = groups
            .iter()
            .map(|group| (group.key.venue.code.as_str(), group.key.date))
            .collect();
        assert_eq!(keys, vec![("1351", day(8)), ("1351", day(9)), ("4651", day(8))]);
    }

    #[test]
    fn blank_venue_is_dropped() {
        assert!(plan(vec![alert(1, "  ", None)], day(1)).is_empty());
    }
}
