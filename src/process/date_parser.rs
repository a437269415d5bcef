use chrono::{NaiveDate, NaiveTime};

use crate::process::utils::{clean_str, is_blank, Cell};

/// Date layouts seen on the capacity postings, US style first.
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// Parse a posting date into a calendar date.
///
/// Accepts `MM/DD/YYYY`, `YYYY-MM-DD` and `YYYY/MM/DD`, optionally followed by a
/// time of day (separated by a space or an ISO `T`). The time is checked but dropped.
pub fn parse_report_date(s: &str) -> Option<NaiveDate> {
    let s = clean_str(s);
    let (date_part, time_part) = match s.split_once(' ') {
        Some((d, t)) => (d, Some(t.trim())),
        None => match s.split_once('T') {
            Some((d, t)) => (d, Some(t.trim_end_matches('Z'))),
            None => (s, None),
        },
    };

    if let Some(t) = time_part {
        if !TIME_FORMATS
            .iter()
            .any(|f| NaiveTime::parse_from_str(t, f).is_ok())
        {
            return None;
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(date_part, f).ok())
}

/// Date cell with the feed's blank convention applied.
pub fn parse_date_cell(raw: &str) -> Cell<NaiveDate> {
    if is_blank(raw) {
        return Cell::Blank;
    }
    match parse_report_date(raw) {
        Some(d) => Cell::Value(d),
        None => Cell::Invalid,
    }
}

/// The `gasDay` query format the endpoint expects.
pub fn format_gas_day(day: NaiveDate) -> String {
    day.format("%m/%d/%Y").to_string()
}
