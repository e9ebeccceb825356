use crate::error::{AppError, Result};
use chrono::NaiveDate;
use regex_lite::Regex;
use std::sync::OnceLock;

/// Template used to right-pad short numeric time strings: a bare "2004"
/// becomes "200401010000" (midnight, 1 January).
const PAD_TEMPLATE: &str = "000001010000";

fn iso_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2})\s*(\d{2})?:?(\d{2})?").unwrap()
    })
}

/// Right-pads a numeric time string out to 12 digits (YYYYMMDDhhmm).
pub fn pad_time(timestring: &str) -> String {
    let mut padded = timestring.to_string();
    if padded.len() < PAD_TEMPLATE.len() {
        padded.push_str(&PAD_TEMPLATE[padded.len()..]);
    }
    padded
}

/// Lenient extraction of a 12-digit time long from an ISO-like date/time
/// literal (`YYYY-MM-DD[ hh[:mm]]`, 'T' separator accepted). Returns None
/// when the text does not lead with a date. Used for table cells and data
/// lines where a mismatch just means "skip".
pub fn date_field_to_long(text: &str) -> Option<i64> {
    let text = text.replace('T', " ");
    let caps = iso_pattern().captures(text.trim_start())?;

    let mut digits = String::with_capacity(12);
    for group in 1..=5 {
        if let Some(m) = caps.get(group) {
            digits.push_str(m.as_str());
        }
    }
    while digits.len() < 12 {
        digits.push_str("00");
    }
    digits.parse().ok()
}

/// Parses a user-supplied date/time literal into a 12-digit time long.
///
/// Accepts either bare digits (right-padded per `pad_time`) or an ISO-like
/// literal. Calendar components are validated, so "2004-13-01" is an error
/// rather than a nonsense long.
pub fn parse_time_long(text: &str) -> Result<i64> {
    let text = text.trim();

    let value = if text.chars().all(|c| c.is_ascii_digit()) && !text.is_empty() {
        if text.len() < 4 || text.len() > 12 {
            return Err(AppError::Parse(format!(
                "Numeric time '{}' must be 4-12 digits (YYYY[MM[DD[hh[mm]]]])",
                text
            )));
        }
        pad_time(text)
            .parse::<i64>()
            .map_err(|e| AppError::Parse(format!("Failed to parse time '{}': {}", text, e)))?
    } else {
        date_field_to_long(text).ok_or_else(|| {
            AppError::Parse(format!(
                "Time '{}' is not YYYYMMDDhhmm or YYYY-MM-DD[ hh:mm]",
                text
            ))
        })?
    };

    validate_time_long(value)?;
    Ok(value)
}

fn validate_time_long(value: i64) -> Result<()> {
    let year = (value / 100_000_000) as i32;
    let month = (value / 1_000_000 % 100) as u32;
    let day = (value / 10_000 % 100) as u32;
    let hour = (value / 100 % 100) as u32;
    let minute = (value % 100) as u32;

    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
        return Err(AppError::Parse(format!(
            "Invalid date combination: year={}, month={}, day={} from {}",
            year, month, day, value
        )));
    }
    if hour > 23 || minute > 59 {
        return Err(AppError::Parse(format!(
            "Invalid time combination: hour={}, minute={} from {}",
            hour, minute, value
        )));
    }
    Ok(())
}

/// A closed extraction window as a pair of 12-digit time longs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(AppError::Parse(format!(
                "Window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses a (start, end) pair of date/time literals into a window.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_time_long(start)?, parse_time_long(end)?)
    }

    /// Leading six digits (YYYYMM) of the window start.
    pub fn start_month(&self) -> i64 {
        self.start / 1_000_000
    }

    /// Leading six digits (YYYYMM) of the window end.
    pub fn end_month(&self) -> i64 {
        self.end / 1_000_000
    }

    pub fn contains(&self, time: i64) -> bool {
        self.start <= time && time <= self.end
    }
}
