//! Megabox branch schedule provider

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, ORIGIN, REFERER};
use serde::Deserialize;
use tracing::{debug, info};

use super::USER_AGENT;
use crate::models::{ShowtimeRecord, Venue, Vendor};
use crate::traits::{FetchError, ProviderConfig, ShowtimeProvider};
use crate::venues;

/// Raw `schedulePage.do` response, only the parts we read
#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(rename = "megaMap", default)]
    mega_map: Option<MegaMap>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MegaMap {
    #[serde(default)]
    movie_form_list: Option<Vec<ScheduleItem>>,
}

/// One screening in `movieFormList`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ScheduleItem {
    theab_expo_nm: Option<String>,
    theab_eng_nm: Option<String>,
    rpst_movie_nm: Option<String>,
    movie_nm: Option<String>,
    play_start_time: Option<String>,
    /// Sent as a number, occasionally as a string
    rest_seat_cnt: Option<serde_json::Value>,
    bokd_able_at: Option<String>,
}

fn first_non_empty(candidates: [&Option<String>; 2]) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// `잔여 N석`, `매진` for zero, empty when the count is missing
fn format_seats(rest: Option<&serde_json::Value>) -> String {
    let count = rest.and_then(|value| {
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
    });

    match count {
        None => String::new(),
        Some(0) => "매진".to_string(),
        Some(n) => format!("잔여 {n}석"),
    }
}

/// `HHMM` becomes `HH:MM`; anything else is passed through
fn format_start_time(raw: Option<&str>) -> String {
    let raw = raw.unwrap_or_default().trim();
    if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("{}:{}", &raw[..2], &raw[2..])
    } else {
        raw.to_string()
    }
}

/// Turns a raw schedule payload into records, keeping only screens whose name
/// contains `screen_filter` (case-insensitive) when one is set.
fn normalize_schedule(
    body: &str,
    screen_filter: Option<&str>,
) -> Result<Vec<ShowtimeRecord>, FetchError> {
    let response: ScheduleResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let items = response
        .mega_map
        .and_then(|map| map.movie_form_list)
        .unwrap_or_default();
    let screen_filter = screen_filter.map(str::to_lowercase);

    let records = items
        .into_iter()
        .filter_map(|item| {
            let screen_name = first_non_empty([&item.theab_expo_nm, &item.theab_eng_nm]);
            if let Some(filter) = &screen_filter
                && !screen_name.to_lowercase().contains(filter.as_str())
            {
                return None;
            }

            Some(ShowtimeRecord {
                movie_title: first_non_empty([&item.rpst_movie_nm, &item.movie_nm]),
                screen_name,
                start_time: format_start_time(item.play_start_time.as_deref()),
                seats_status: format_seats(item.rest_seat_cnt.as_ref()),
                bookable: item.bokd_able_at.as_deref() == Some("Y"),
            })
        })
        .collect();

    Ok(records)
}

/// Provider for Megabox branch schedules
pub struct MegaboxProvider {
    client: Client,
    config: ProviderConfig,
    screen_filter: Option<String>,
}

impl MegaboxProvider {
    /// Create a Megabox provider
    ///
    /// # Arguments
    /// * `timeout` - Per-request timeout
    /// * `screen_filter` - Keep only screens containing this text, e.g. `dolby`
    pub fn new(timeout: Duration, screen_filter: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(ORIGIN, HeaderValue::from_static("https://www.megabox.co.kr"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.megabox.co.kr/theater"));

        let config = ProviderConfig {
            name: "Megabox".to_string(),
            base_url: "https://www.megabox.co.kr".to_string(),
            schedule_url_pattern: "https://www.megabox.co.kr/on/oh/ohc/Brch/schedulePage.do"
                .to_string(),
        };

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            screen_filter: screen_filter.filter(|filter| !filter.trim().is_empty()),
        })
    }
}

#[async_trait]
impl ShowtimeProvider for MegaboxProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn get_showtimes(
        &self,
        venue_code: &str,
        date: NaiveDate,
    ) -> Result<Vec<ShowtimeRecord>, FetchError> {
        let venue = Venue::new(Vendor::Megabox, venue_code);
        let branch_name = venues::branch_name(&venue)
            .ok_or_else(|| FetchError::UnknownVenue(venue_code.to_string()))?;
        let play_date = date.format("%Y%m%d").to_string();

        info!(
            "Fetching {} schedule for branch {} on {}",
            self.config.name, venue_code, play_date
        );

        let form = [
            ("brchNm", branch_name),
            ("brchNo", venue_code),
            ("brchNo1", venue_code),
            ("masterType", "brch"),
            ("playDe", play_date.as_str()),
            ("firstAt", "N"),
        ];

        let response = self
            .client
            .post(self.build_schedule_url(venue_code, date))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.text().await?;
        let records = normalize_schedule(&body, self.screen_filter.as_deref())?;

        debug!(
            "Branch {} on {}: {} showtimes after screen filter",
            venue_code,
            play_date,
            records.len()
        );
        Ok(records)
    }
}
