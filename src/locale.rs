//! Locale-tolerant coercion of numbers and date boundaries.
//!
//! Source systems emit Brazilian-formatted values (`"R$ 1.234,56"`,
//! `"05/03/2024"`) next to plain JSON numbers and ISO dates. Everything here
//! degrades to `0` / `None` instead of failing.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde_json::Value;

/// Which end of a day a parsed date should be pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Local midnight.
    Start,
    /// `23:59:59.999` local time.
    End,
}

impl Boundary {
    pub fn apply(self, date: NaiveDate) -> NaiveDateTime {
        let time = match self {
            Boundary::Start => NaiveTime::MIN,
            Boundary::End => {
                NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
            }
        };
        date.and_time(time)
    }
}

/// Coerces any JSON value into a finite `f64`, returning `0.0` when that is
/// not possible.
pub fn parse_locale_number(input: &Value) -> f64 {
    match input {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(s) => parse_locale_str(s),
        _ => 0.0,
    }
}

/// Parses a string using `.` as thousands separator and `,` as decimal
/// separator. Currency symbols and other decoration are stripped.
pub fn parse_locale_str(input: &str) -> f64 {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .filter(|c| *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if cleaned.is_empty() {
        return 0.0;
    }

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Parses a date-ish value and pins it to the requested [`Boundary`].
///
/// Accepted shapes:
/// - `"YYYY-MM-DD..."` (anything after the first ten characters is ignored)
/// - `"DD/MM/YYYY..."`
/// - a JSON number, read as epoch milliseconds in local time
///
/// Returns `None` for null, missing or unparseable input.
pub fn parse_date_boundary(raw: &Value, boundary: Boundary) -> Option<NaiveDateTime> {
    let date = match raw {
        Value::String(s) => parse_date_prefix(s.trim())?,
        Value::Number(n) => {
            let millis = n.as_i64()?;
            Local.timestamp_millis_opt(millis).single()?.date_naive()
        }
        _ => return None,
    };
    Some(boundary.apply(date))
}

fn parse_date_prefix(s: &str) -> Option<NaiveDate> {
    let prefix = s.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(prefix, "%d/%m/%Y"))
        .ok()
}
