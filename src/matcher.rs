//! Lenient matching of subscription criteria against a venue's showtimes

use chrono::NaiveTime;

use crate::models::{Condition, ShowtimeRecord, Subscription};

/// Strips all whitespace and lowercases, so `Zootopia 2` and `zootopia2` compare equal.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<String>()
        .to_lowercase()
}

/// The keyword must appear inside the title. An empty keyword matches nothing.
pub fn title_matches(keyword: &str, title: &str) -> bool {
    let keyword = normalize_text(keyword);
    !keyword.is_empty() && normalize_text(title).contains(&keyword)
}

/// An unset or blank preference accepts any screen.
pub fn screen_matches(preference: Option<&str>, screen_name: &str) -> bool {
    match preference.map(normalize_text) {
        Some(preference) if !preference.is_empty() => {
            normalize_text(screen_name).contains(&preference)
        }
        _ => true,
    }
}

/// Parses a clock time written as `HH:MM`, `H:MM` or `HHMM` into a 24-hour time.
///
/// Only digits are considered, so `19:10`, `1910` and ` 19 : 10 ` are equivalent.
pub fn normalize_clock(text: &str) -> Option<NaiveTime> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    let hhmm = match digits.len() {
        3 => format!("0{digits}"),
        4 => digits,
        _ => return None,
    };

    NaiveTime::parse_from_str(&hhmm, "%H%M").ok()
}

fn starts_at(record: &ShowtimeRecord, wanted: NaiveTime) -> bool {
    normalize_clock(&record.start_time) == Some(wanted)
}

/// Every bookable record satisfying an open-type subscription's title, screen and
/// optional time preference. Seat-type subscriptions never match here.
pub fn match_open<'a>(
    subscription: &Subscription,
    records: &'a [ShowtimeRecord],
) -> Vec<&'a ShowtimeRecord> {
    let Condition::Open { show_time } = &subscription.condition else {
        return Vec::new();
    };

    records
        .iter()
        .filter(|record| record.bookable)
        .filter(|record| title_matches(&subscription.movie_keyword, &record.movie_title))
        .filter(|record| screen_matches(subscription.screen.as_deref(), &record.screen_name))
        .filter(|record| show_time.is_none_or(|wanted| starts_at(record, wanted)))
        .collect()
}

/// The first record that is the exact showtime a seat-type subscription targets.
pub fn match_seat<'a>(
    subscription: &Subscription,
    records: &'a [ShowtimeRecord],
) -> Option<&'a ShowtimeRecord> {
    let Condition::Seat(target) = &subscription.condition else {
        return None;
    };

    records.iter().find(|record| {
        title_matches(&subscription.movie_keyword, &record.movie_title)
            && screen_matches(subscription.screen.as_deref(), &record.screen_name)
            && starts_at(record, target.show_time)
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::models::{AlertState, SeatTarget, Venue, Vendor};

    fn record(title: &str, screen: &str, start: &str, bookable: bool) -> ShowtimeRecord {
        ShowtimeRecord {
            movie_title: title.to_string(),
            screen_name: screen.to_string(),
            start_time: start.to_string(),
            seats_status: "잔여 100석".to_string(),
            bookable,
        }
    }

    fn open(keyword: &str, screen: Option<&str>, show_time: Option<&str>) -> Subscription {
        Subscription {
            id: Some(1),
            recipient: "fan@example.com".to_string(),
            venue: Venue::new(Vendor::Megabox, "1351"),
            movie_keyword: keyword.to_string(),
            screen: screen.map(str::to_string),
            target_date: None,
            condition: Condition::Open {
                show_time: show_time.and_then(normalize_clock),
            },
            state: AlertState::new(Utc::now()),
        }
    }

    fn seat(keyword: &str, screen: Option<&str>, show_time: &str) -> Subscription {
        Subscription {
            condition: Condition::Seat(SeatTarget {
                show_time: normalize_clock(show_time).unwrap(),
                desired_count: 2,
                baseline_available_seats: 10,
                last_available_seats: None,
            }),
            target_date: NaiveDate::from_ymd_opt(2025, 12, 8),
            ..open(keyword, screen, None)
        }
    }

    #[test]
    fn title_is_substring_ignoring_case_and_spaces() {
        assert!(title_matches("zootopia", "Zootopia 2"));
        assert!(title_matches("주토피아2", "주토피아 2"));
        assert!(!title_matches("Zootopia 2", "Zootopia"));
        assert!(!title_matches("   ", "Zootopia"));
    }

    #[test]
    fn screen_preference_is_optional_substring() {
        assert!(screen_matches(None, "DOLBY CINEMA [Laser]"));
        assert!(screen_matches(Some(""), "DOLBY CINEMA [Laser]"));
        assert!(screen_matches(Some("dolbycinema"), "DOLBY CINEMA [Laser]"));
        assert!(!screen_matches(Some("IMAX"), "DOLBY CINEMA [Laser]"));
    }

    #[test]
    fn clock_normalization_accepts_common_shapes() {
        let ten_past_seven = NaiveTime::from_hms_opt(19, 10, 0);
        assert_eq!(normalize_clock("19:10"), ten_past_seven);
        assert_eq!(normalize_clock("1910"), ten_past_seven);
        assert_eq!(normalize_clock("9:15"), NaiveTime::from_hms_opt(9, 15, 0));
        assert_eq!(normalize_clock("25:00"), None);
        assert_eq!(normalize_clock("soon"), None);
    }

    #[test]
    fn open_match_requires_bookable_records() {
        let records = vec![
            record("Zootopia 2", "DOLBY CINEMA", "19:10", false),
            record("Zootopia 2", "DOLBY CINEMA", "21:40", true),
        ];

        let matched = match_open(&open("zootopia", None, None), &records);

        assert_eq!(matched, vec![&records[1]]);
    }

    #[test]
    fn open_match_honours_screen_and_time_preferences() {
        let records = vec![
            record("Zootopia 2", "컴포트 3관", "19:10", true),
            record("Zootopia 2", "DOLBY CINEMA", "21:40", true),
        ];

        assert_eq!(match_open(&open("zootopia", Some("dolby"), None), &records).len(), 1);
        assert!(match_open(&open("zootopia", Some("dolby"), Some("19:10")), &records).is_empty());
        assert_eq!(match_open(&open("zootopia", None, None), &records).len(), 2);
    }

    #[test]
    fn seat_match_takes_first_exact_showtime() {
        let records = vec![
            record("Wicked", "DOLBY CINEMA", "18:30", true),
            record("Zootopia 2", "DOLBY CINEMA", "18:30", false),
            record("Zootopia 2", "DOLBY CINEMA", "1830", true),
        ];

        let matched = match_seat(&seat("Zootopia", Some("DOLBY CINEMA"), "1830"), &records);

        assert_eq!(matched, Some(&records[1]));
    }

    #[test]
    fn seat_match_rejects_other_start_times() {
        let records = vec![record("Zootopia 2", "DOLBY CINEMA", "18:40", true)];

        assert!(match_seat(&seat("Zootopia", None, "18:30"), &records).is_none());
    }

    #[test]
    fn kinds_do_not_cross_match() {
        let records = vec![record("Zootopia 2", "DOLBY CINEMA", "18:30", true)];

        assert!(match_open(&seat("Zootopia", None, "18:30"), &records).is_empty());
        assert!(match_seat(&open("Zootopia", None, None), &records).is_none());
    }
}
