//! Seat count extraction from free-text availability strings

/// Markers vendors use for a fully booked showtime, compared case-insensitively
const SOLD_OUT_MARKERS: [&str; 3] = ["매진", "sold out", "soldout"];

/// Returns `true` if the status text announces a sold-out showtime.
pub fn is_sold_out(status: &str) -> bool {
    let lowered = status.to_lowercase();
    SOLD_OUT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Extracts the number of available seats from a status string such as `잔여 152석`.
///
/// The sold-out check runs before the digit scan since sold-out strings usually
/// carry no digits at all.
///
/// # Returns
/// * `Some(0)` - The status carries a sold-out marker, whatever digits it also contains
/// * `Some(n)` - The first run of digits in the status
/// * `None` - Nothing parseable; callers must skip the record instead of assuming zero
pub fn extract_available_seats(status: &str) -> Option<u32> {
    if is_sold_out(status) {
        return Some(0);
    }

    let start = status.find(|c: char| c.is_ascii_digit())?;
    let digits = &status[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    digits[..end].parse().ok()
}
