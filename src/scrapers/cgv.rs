//! CGV theater timetable provider

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use reqwest::header::REFERER;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::USER_AGENT;
use crate::models::ShowtimeRecord;
use crate::traits::{FetchError, ProviderConfig, ShowtimeProvider};

/// CSS selectors for the parts of the timetable page we read
#[derive(Debug, Clone)]
pub struct TimetableSelectors {
    /// Container holding every movie of the day
    pub section: String,
    /// One block per movie within the section
    pub movie_block: String,
    /// Movie title within a movie block
    pub title: String,
    /// One block per screen within a movie block
    pub hall: String,
    /// Screen name candidates within a hall block, first one wins
    pub hall_name: String,
    /// One entry per screening within a hall block
    pub time_slot: String,
    /// Start time within a screening entry
    pub start_time: String,
    /// Remaining seat text within a screening entry (optional)
    pub seats: Option<String>,
}

impl Default for TimetableSelectors {
    fn default() -> Self {
        Self {
            section: "div.sect-showtimes".to_string(),
            movie_block: "div.col-times".to_string(),
            title: "div.info-movie strong".to_string(),
            hall: "div.type-hall".to_string(),
            hall_name: "div.info-hall li".to_string(),
            time_slot: "div.info-timetable li".to_string(),
            start_time: "em".to_string(),
            seats: Some("span.txt-lightblue".to_string()),
        }
    }
}

fn parse_selector(selector: &str, what: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector)
        .map_err(|e| FetchError::Parse(format!("invalid {what} selector: {e:?}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a timetable page into records.
///
/// A screening counts as bookable when its entry is a link. A page without the
/// showtimes section is an empty schedule, not an error.
fn parse_timetable(
    html: &str,
    selectors: &TimetableSelectors,
) -> Result<Vec<ShowtimeRecord>, FetchError> {
    let section_selector = parse_selector(&selectors.section, "section")?;
    let movie_selector = parse_selector(&selectors.movie_block, "movie block")?;
    let title_selector = parse_selector(&selectors.title, "title")?;
    let hall_selector = parse_selector(&selectors.hall, "hall")?;
    let hall_name_selector = parse_selector(&selectors.hall_name, "hall name")?;
    let slot_selector = parse_selector(&selectors.time_slot, "time slot")?;
    let start_selector = parse_selector(&selectors.start_time, "start time")?;
    let link_selector = parse_selector("a", "link")?;
    let seats_selector = selectors
        .seats
        .as_deref()
        .map(|s| parse_selector(s, "seats"))
        .transpose()?;

    let document = Html::parse_document(html);
    let Some(section) = document.select(&section_selector).next() else {
        return Ok(Vec::new());
    };

    let mut records = Vec::new();

    for movie in section.select(&movie_selector) {
        let movie_title = movie
            .select(&title_selector)
            .next()
            .map(element_text)
            .unwrap_or_default();

        for hall in movie.select(&hall_selector) {
            let screen_name = hall
                .select(&hall_name_selector)
                .next()
                .map(element_text)
                .unwrap_or_default();

            for slot in hall.select(&slot_selector) {
                let Some(start_time) = slot.select(&start_selector).next().map(element_text) else {
                    continue;
                };

                let seats_status = seats_selector
                    .as_ref()
                    .and_then(|selector| slot.select(selector).next())
                    .map(element_text)
                    .unwrap_or_default();

                records.push(ShowtimeRecord {
                    movie_title: movie_title.clone(),
                    screen_name: screen_name.clone(),
                    start_time,
                    seats_status,
                    bookable: slot.select(&link_selector).next().is_some(),
                });
            }
        }
    }

    Ok(records)
}

/// Provider for CGV theater timetables
pub struct CgvProvider {
    client: Client,
    config: ProviderConfig,
    selectors: TimetableSelectors,
}

impl CgvProvider {
    /// Create a CGV provider with the default page selectors
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        let config = ProviderConfig {
            name: "CGV".to_string(),
            base_url: "https://www.cgv.co.kr".to_string(),
            schedule_url_pattern: "https://www.cgv.co.kr/common/showtimes/iframeTheater.aspx\
                                   ?areacode=01&theatercode={venue}&date={date}"
                .to_string(),
        };

        Ok(Self {
            client,
            config,
            selectors: TimetableSelectors::default(),
        })
    }
}

#[async_trait]
impl ShowtimeProvider for CgvProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn get_showtimes(
        &self,
        venue_code: &str,
        date: NaiveDate,
    ) -> Result<Vec<ShowtimeRecord>, FetchError> {
        let url = self.build_schedule_url(venue_code, date);
        info!(
            "Fetching {} timetable for theater {} on {}",
            self.config.name, venue_code, date
        );

        // The iframe endpoint rejects requests without a theater page referer
        let referer = format!(
            "{}/theater/?theaterCode={}&areacode=01",
            self.config.base_url,
            urlencoding::encode(venue_code)
        );

        let response = self.client.get(&url).header(REFERER, referer).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let html = response.text().await?;
        let records = parse_timetable(&html, &self.selectors)?;

        debug!("Theater {} on {}: {} showtimes", venue_code, date, records.len());
        Ok(records)
    }
}
