use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;

use crate::clock::STATION_TZ;
use crate::error::{Error, Result};

const END_OF_DAY: NaiveTime = NaiveTime::from_hms_opt(23, 59, 59).unwrap();

// Numeric fields accept one or two digits, so `2-1-2024` matches `%d-%m-%Y`.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

// (format, includes seconds)
const TIME_FORMATS: &[(&str, bool)] = &[
    ("%H:%M", false),
    ("%H:%M:%S", true),
    ("%I:%M %p", false),
    ("%I:%M:%S %p", true),
];

/// Result of parsing user supplied date/time text in the station zone.
///
/// The flags record which parts were spelled out so that callers can fill
/// in the rest relative to "now". Empty input means "now" and counts as a
/// date without a time of day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedTime {
    pub instant: DateTime<Tz>,
    pub has_date: bool,
    pub has_time: bool,
    pub has_seconds: bool,
}

pub fn parse(input: &str, now: DateTime<Tz>) -> Result<ParsedTime> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(ParsedTime {
            instant: now,
            has_date: true,
            has_time: false,
            has_seconds: false,
        });
    }
    let parts = parse_parts(input).ok_or_else(|| Error::MalformedTime(input.to_string()))?;
    let date = parts.date.unwrap_or_else(|| now.date_naive());
    let time = parts.time.unwrap_or(NaiveTime::MIN);
    Ok(ParsedTime {
        instant: localize(date.and_time(time), input)?,
        has_date: parts.date.is_some(),
        has_time: parts.time.is_some(),
        has_seconds: parts.has_seconds,
    })
}

/// Parses text that must carry a calendar date, such as the timestamps on
/// station pages.
pub fn parse_absolute(input: &str) -> Result<DateTime<Tz>> {
    let input = input.trim();
    let parts = parse_parts(input).ok_or_else(|| Error::MalformedTime(input.to_string()))?;
    let Some(date) = parts.date else {
        return Err(Error::MalformedTime(input.to_string()));
    };
    localize(date.and_time(parts.time.unwrap_or(NaiveTime::MIN)), input)
}

/// Start of a window. A bare time of day means its latest occurrence that
/// is not after `now`.
pub fn parse_from(input: &str, now: DateTime<Tz>) -> Result<DateTime<Tz>> {
    let parsed = parse(input, now)?;
    if parsed.has_date {
        return Ok(parsed.instant);
    }
    let time = parsed.instant.time();
    let today = localize(now.date_naive().and_time(time), input)?;
    if today <= now {
        return Ok(today);
    }
    let yesterday = shift_days(now.date_naive(), -1, input)?;
    localize(yesterday.and_time(time), input)
}

/// End of a window. A bare time of day means its next occurrence that is
/// not before `now`. Missing parts then round up: a date alone ends at
/// 23:59:59 and a time without seconds ends at :59.
pub fn parse_until(input: &str, now: DateTime<Tz>) -> Result<DateTime<Tz>> {
    let parsed = parse(input, now)?;
    let mut naive = parsed.instant.naive_local();
    if !parsed.has_date {
        let today = localize(now.date_naive().and_time(naive.time()), input)?;
        if today < now {
            naive = shift_days(now.date_naive(), 1, input)?.and_time(naive.time());
        }
    }
    if !parsed.has_time {
        naive = naive.date().and_time(END_OF_DAY);
    } else if !parsed.has_seconds {
        naive = naive
            .with_second(59)
            .ok_or_else(|| Error::MalformedTime(input.to_string()))?;
    }
    localize(naive, input)
}

/// 23:59:59 on `date` in the station zone.
pub fn end_of_day_on(date: NaiveDate) -> Result<DateTime<Tz>> {
    localize(date.and_time(END_OF_DAY), &date.to_string())
}

struct Parts {
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    has_seconds: bool,
}

fn parse_parts(input: &str) -> Option<Parts> {
    for date_format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, date_format) {
            return Some(Parts {
                date: Some(date),
                time: None,
                has_seconds: false,
            });
        }
        for (time_format, has_seconds) in TIME_FORMATS {
            let format = format!("{date_format} {time_format}");
            if let Ok(moment) = NaiveDateTime::parse_from_str(input, &format) {
                return Some(Parts {
                    date: Some(moment.date()),
                    time: Some(moment.time()),
                    has_seconds: *has_seconds,
                });
            }
        }
    }
    for (time_format, has_seconds) in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(input, time_format) {
            return Some(Parts {
                date: None,
                time: Some(time),
                has_seconds: *has_seconds,
            });
        }
    }
    None
}

fn shift_days(date: NaiveDate, days: i64, input: &str) -> Result<NaiveDate> {
    let shifted = if days < 0 {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or_else(|| Error::MalformedTime(input.to_string()))
}

// Local times inside a DST gap have no instant and are rejected.
fn localize(naive: NaiveDateTime, input: &str) -> Result<DateTime<Tz>> {
    STATION_TZ
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::MalformedTime(input.to_string()))
}

#[cfg(test)]
pub(crate) fn local(text: &str) -> DateTime<Tz> {
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").expect("test timestamp");
    localize(naive, text).expect("test timestamp in zone")
}
