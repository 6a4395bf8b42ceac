//! Known cinema branches per vendor

use crate::models::{Venue, Vendor};

/// Megabox branches with a Dolby Cinema screen, by `brchNo`
pub const MEGABOX_DOLBY_BRANCHES: [(&str, &str); 8] = [
    ("0019", "남양주현대아울렛스페이스원"),
    ("7011", "대구신세계(동대구)"),
    ("0028", "대전신세계아트앤사이언스"),
    ("4062", "송도(트리플스트리트)"),
    ("0052", "수원AK플라자(수원역)"),
    ("0020", "안성스타필드"),
    ("1351", "코엑스"),
    ("4651", "하남스타필드"),
];

/// CGV theaters by `theatercode`
pub const CGV_THEATERS: [(&str, &str); 3] = [
    ("0013", "용산아이파크몰"),
    ("0050", "강남"),
    ("0056", "홍대"),
];

fn lookup(table: &[(&'static str, &'static str)], code: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}

/// Branch name as the vendor spells it, without the brand prefix
pub fn branch_name(venue: &Venue) -> Option<&'static str> {
    match venue.vendor {
        Vendor::Megabox => lookup(&MEGABOX_DOLBY_BRANCHES, &venue.code),
        Vendor::Cgv => lookup(&CGV_THEATERS, &venue.code),
    }
}

/// Brand label used in messages
pub fn brand(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::Megabox => "메가박스",
        Vendor::Cgv => "CGV",
    }
}

/// Label for messages, e.g. `메가박스 코엑스`. Unknown codes fall back to the code.
pub fn display_name(venue: &Venue) -> String {
    let brand = brand(venue.vendor);
    match branch_name(venue) {
        Some(name) => format!("{brand} {name}"),
        None => format!("{brand} 지점({})", venue.code),
    }
}
