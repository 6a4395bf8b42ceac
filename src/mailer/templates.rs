//! Subject and body rendering for alert e-mails

use chrono::NaiveDate;

use crate::models::{Condition, Notification, Subscription};
use crate::venues;

const SIGNATURE: &str = "- 이 메일은 자동 발송되었습니다.";

fn screen_label(subscription: &Subscription) -> &str {
    subscription
        .screen
        .as_deref()
        .filter(|screen| !screen.trim().is_empty())
        .unwrap_or("(상영관 미지정)")
}

/// Message for an open-type alert.
///
/// `real_title` is the title of the matching showtime, which may be longer than the
/// subscriber's keyword (`주토피아` → `주토피아 2`). `date` is the evaluated date.
pub fn open_alert(
    subscription: &Subscription,
    real_title: Option<&str>,
    date: NaiveDate,
) -> Notification {
    let keyword = subscription.movie_keyword.trim();
    let title = real_title.unwrap_or(keyword);
    let venue = venues::display_name(&subscription.venue);
    let brand = venues::brand(subscription.venue.vendor);

    let subject = format!("[Catch-Seat] '{title}' 예매가 열렸어요!");
    let body = format!(
        "안녕하세요, Catch-Seat입니다.\n\n\
         요청하신 영화 예매 오픈 알림을 알려드립니다.\n\n\
         알림신청 키워드: {keyword}\n\
         영화: {title}\n\
         영화관: {venue}\n\
         상영관: {screen}\n\
         날짜: {date}\n\n\
         {brand} 예매 페이지에서 좌석 상황을 확인해 주세요.\n\n\
         {SIGNATURE}",
        screen = screen_label(subscription),
        date = date.format("%Y-%m-%d"),
    );

    Notification { subject, body }
}

/// Message for a seat-type alert that saw `current_available` seats.
///
/// Returns `None` for open-type subscriptions.
pub fn seat_alert(subscription: &Subscription, current_available: u32) -> Option<Notification> {
    let Condition::Seat(target) = &subscription.condition else {
        return None;
    };

    let title = match subscription.movie_keyword.trim() {
        "" => "(제목 미지정)",
        keyword => keyword,
    };
    let venue = venues::display_name(&subscription.venue);
    let brand = venues::brand(subscription.venue.vendor);
    let show_datetime = match subscription.target_date {
        Some(date) => format!("{} {}", date.format("%Y-%m-%d"), target.show_time.format("%H:%M")),
        None => target.show_time.format("%H:%M").to_string(),
    };
    let baseline = target.baseline_available_seats;
    let increase = i64::from(current_available) - i64::from(baseline);

    let subject = format!("[Catch-Seat] 좌석이 다시 풀렸어요! - {title} / {venue}");
    let body = format!(
        "안녕하세요, Catch-Seat입니다.\n\n\
         요청하신 좌석 취소 알림 조건을 만족하는 상영 회차가 발견되었습니다.\n\n\
         영화: {title}\n\
         영화관: {venue}\n\
         상영관: {screen}\n\
         상영 일시: {show_datetime}\n\n\
         기준 잔여 좌석 수(baseline): {baseline}석\n\
         현재 잔여 좌석 수: {current_available}석\n\
         증가한 좌석 수: {increase}석\n\
         {brand} 예매 페이지에서 좌석 상황을 확인해 주세요.\n\n\
         {SIGNATURE}",
        screen = screen_label(subscription),
    );

    Some(Notification { subject, body })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, Utc};

    use super::*;
    use crate::models::{AlertState, SeatTarget, Venue, Vendor};

    fn subscription(condition: Condition) -> Subscription {
        Subscription {
            id: Some(4),
            recipient: "fan@example.com".to_string(),
            venue: Venue::new(Vendor::Megabox, "1351"),
            movie_keyword: "주토피아".to_string(),
            screen: Some("DOLBY CINEMA".to_string()),
            target_date: NaiveDate::from_ymd_opt(2025, 12, 8),
            condition,
            state: AlertState::new(Utc::now()),
        }
    }

    #[test]
    fn open_message_names_real_title_and_venue() {
        let alert = subscription(Condition::Open { show_time: None });
        let date = NaiveDate::from_ymd_opt(2025, 12, 8).unwrap();

        let message = open_alert(&alert, Some("주토피아 2"), date);

        assert_eq!(message.subject, "[Catch-Seat] '주토피아 2' 예매가 열렸어요!");
        assert!(message.body.contains("알림신청 키워드: 주토피아\n"));
        assert!(message.body.contains("영화관: 메가박스 코엑스\n"));
        assert!(message.body.contains("날짜: 2025-12-08"));
    }

    #[test]
    fn seat_message_reports_increase() {
        let alert = subscription(Condition::Seat(SeatTarget {
            show_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            desired_count: 2,
            baseline_available_seats: 10,
            last_available_seats: None,
        }));

        let message = seat_alert(&alert, 13).unwrap();

        assert!(message.subject.ends_with("주토피아 / 메가박스 코엑스"));
        assert!(message.body.contains("상영 일시: 2025-12-08 18:30"));
        assert!(message.body.contains("증가한 좌석 수: 3석"));
    }

    #[test]
    fn seat_message_needs_seat_alert() {
        let alert = subscription(Condition::Open { show_time: None });
        assert!(seat_alert(&alert, 10).is_none());
    }
}
