//! Statement date parsing.
//!
//! Row dates are often printed without a year ("03 Jun", "04/22"); the year is
//! recovered from the statement period.

use chrono::{Datelike, NaiveDate};

use crate::error::DateError;

/// Long description of a statement period, e.g. `01 April 2025 to 30 April 2025`.
pub fn describe_period(start: NaiveDate, end: NaiveDate) -> String {
    format!("{} to {}", start.format("%d %B %Y"), end.format("%d %B %Y"))
}

fn has_year(format: &str) -> bool {
    format.contains("%y") || format.contains("%Y")
}

fn normalize(raw: &str) -> String {
    raw.replace(',', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse with the first matching format that carries a year.
pub fn parse_date(raw: &str, formats: &[String]) -> Result<NaiveDate, DateError> {
    let s = normalize(raw);
    if s.is_empty() {
        return Err(DateError::Empty);
    }
    formats
        .iter()
        .filter(|f| has_year(f))
        .find_map(|f| NaiveDate::parse_from_str(&s, f).ok())
        .ok_or(DateError::NoMatch(s))
}

/// Parse with a yearless format, supplying `year`.
pub fn parse_with_year(raw: &str, formats: &[String], year: i32) -> Result<NaiveDate, DateError> {
    let s = normalize(raw);
    if s.is_empty() {
        return Err(DateError::Empty);
    }
    formats
        .iter()
        .filter(|f| !has_year(f))
        .find_map(|f| NaiveDate::parse_from_str(&format!("{s} {year}"), &format!("{f} %Y")).ok())
        .ok_or(DateError::NoMatch(s))
}

/// Parse a row date that belongs to the period `start..=end`.
///
/// Full dates are returned as printed. Yearless dates take the end year, or
/// the start year when that would land after the period end.
pub fn parse_in_period(
    raw: &str,
    formats: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<NaiveDate, DateError> {
    if let Ok(date) = parse_date(raw, formats) {
        return Ok(date);
    }
    let date = parse_with_year(raw, formats, end.year())?;
    if date > end && start.year() != end.year() {
        return parse_with_year(raw, formats, start.year());
    }
    Ok(date)
}

/// Parse the two ends of a period marker. A start without a year borrows the
/// end's year and steps back one year if it would otherwise follow the end.
pub fn parse_period(
    raw_start: &str,
    raw_end: &str,
    formats: &[String],
) -> Result<(NaiveDate, NaiveDate), DateError> {
    let end = parse_date(raw_end, formats)?;
    let start = match parse_date(raw_start, formats) {
        Ok(d) => d,
        Err(_) => {
            let d = parse_with_year(raw_start, formats, end.year())?;
            if d > end {
                parse_with_year(raw_start, formats, end.year() - 1)?
            } else {
                d
            }
        }
    };
    Ok((start, end))
}
