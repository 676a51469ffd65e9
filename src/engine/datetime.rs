//! Timestamp composition from captured fields.
//!
//! Vendor logs rarely carry one parseable timestamp string; rules capture the
//! pieces (`"15"`, `"Jan"`, `"2023"`, ...) and declare what each piece means
//! with an ordered list of component tokens:
//!
//! ```text
//! values: ["15", "Jan", "2023", "10", "30", "00"]
//! spec:   [DayOfMonth, MonthName, Year, Hour, Minute, Second]
//!                    └──▶ 2023-01-15T10:30:00 in the configured zone
//! ```
//!
//! A rule may supply several alternative specs for the same destination; they
//! are tried in order and the first one whose tokens all parse wins. Each
//! token consumes exactly one captured value, so the token count must equal
//! the value count.
//!
//! Components are accumulated into [`DateParts`] and only combined at the end,
//! because combining eagerly gives order-dependent results (an AM/PM marker
//! must see the hour regardless of which was captured first).
//!
//! Year-less dates are an error unless `assume_current_year` is explicitly
//! configured; the implicit-default trap is deliberately avoided. When it is
//! configured, a composed instant that lands too far in the future rolls back
//! one year — logs near New Year's Eve are stamped with the old year.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use crate::error::TimestampError;

/// One date/time component kind. Each token parses exactly one captured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateToken {
    /// English month name, long or abbreviated ("Jan", "january").
    MonthName,
    /// Numeric month, 1-12.
    MonthNum,
    /// Day of month, 1-31.
    DayOfMonth,
    /// English weekday name; validated and discarded.
    Weekday,
    /// Four-digit year.
    Year,
    /// Two-digit year; 70 pivots the century (69 -> 2069, 70 -> 1970).
    Year2,
    /// Hour, 0-23.
    Hour,
    /// Minute, 0-59.
    Minute,
    /// Second, 0-60 (60 is folded into 59).
    Second,
    /// Fractional-second digits.
    Subsecond,
    /// "AM"/"PM"/"A.M."/"P.M.", any case. Adjusts a previously parsed hour.
    AmPm,
    /// Numeric offset: "+02:00", "-0530", or "Z".
    TzOffset,
    /// Well-known zone abbreviation ("UTC", "PST", ...).
    TzName,
    /// Seconds since the Unix epoch.
    UnixSecs,
}

impl DateToken {
    fn kind(self) -> &'static str {
        match self {
            DateToken::MonthName => "month name",
            DateToken::MonthNum => "month number",
            DateToken::DayOfMonth => "day of month",
            DateToken::Weekday => "weekday",
            DateToken::Year => "year",
            DateToken::Year2 => "two-digit year",
            DateToken::Hour => "hour",
            DateToken::Minute => "minute",
            DateToken::Second => "second",
            DateToken::Subsecond => "subsecond",
            DateToken::AmPm => "AM/PM marker",
            DateToken::TzOffset => "timezone offset",
            DateToken::TzName => "timezone name",
            DateToken::UnixSecs => "unix seconds",
        }
    }
}

/// Configured interpretation defaults for composition.
///
/// These are rule-set level configuration, not per-call state: the spec that
/// omits a timezone token is interpreted in `timezone`, and year-less specs
/// only work when `assume_current_year` is opted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampDefaults {
    pub timezone: FixedOffset,
    pub assume_current_year: bool,
    /// With `assume_current_year`: instants further than this many seconds in
    /// the future roll the year back by one.
    pub max_future_skew_secs: i64,
}

impl Default for TimestampDefaults {
    fn default() -> Self {
        TimestampDefaults {
            timezone: FixedOffset::east_opt(0).unwrap(),
            assume_current_year: false,
            max_future_skew_secs: 2 * 24 * 60 * 60,
        }
    }
}

const MONTHS: [&str; 12] = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Accumulated components, combined only once the whole spec has parsed.
#[derive(Debug, Default, Clone)]
struct DateParts {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
    nanos: u32,
    pm: Option<bool>,
    tz: Option<FixedOffset>,
    unix: Option<i64>,
}

fn bad(token: DateToken, value: &str) -> TimestampError {
    TimestampError::BadComponent { kind: token.kind(), value: value.to_string() }
}

fn int_component(token: DateToken, value: &str, min: u32, max: u32) -> Result<u32, TimestampError> {
    value.trim().parse::<u32>().ok().filter(|v| (min..=max).contains(v)).ok_or_else(|| bad(token, value))
}

fn month_name(value: &str) -> Option<u32> {
    let lower = value.trim().to_ascii_lowercase();
    let head = lower.get(..3)?;
    MONTHS.iter().position(|m| *m == head).map(|i| i as u32 + 1)
}

/// Parse a numeric offset ("+02:00", "-0530", "Z"). Also used by the rule-set
/// compiler for the configured default timezone.
pub(crate) fn parse_offset(value: &str) -> Option<FixedOffset> {
    let v = value.trim();
    if v.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let caps = regex!(r"^([+-])(\d{2}):?(\d{2})$").captures(v)?;
    let hours: i32 = caps[2].parse().ok()?;
    let minutes: i32 = caps[3].parse().ok()?;
    let mut secs = hours * 3600 + minutes * 60;
    if &caps[1] == "-" {
        secs = -secs;
    }
    FixedOffset::east_opt(secs)
}

fn tz_name(value: &str) -> Option<FixedOffset> {
    let hours = |h: i32| FixedOffset::east_opt(h * 3600);
    match value.trim().to_ascii_uppercase().as_str() {
        "UTC" | "GMT" | "UT" => hours(0),
        "EST" => hours(-5),
        "EDT" => hours(-4),
        "CST" => hours(-6),
        "CDT" => hours(-5),
        "MST" => hours(-7),
        "MDT" => hours(-6),
        "PST" => hours(-8),
        "PDT" => hours(-7),
        "CET" => hours(1),
        "CEST" => hours(2),
        _ => None,
    }
}

fn apply_token(parts: &mut DateParts, token: DateToken, value: &str) -> Result<(), TimestampError> {
    match token {
        DateToken::MonthName => parts.month = Some(month_name(value).ok_or_else(|| bad(token, value))?),
        DateToken::MonthNum => parts.month = Some(int_component(token, value, 1, 12)?),
        DateToken::DayOfMonth => parts.day = Some(int_component(token, value, 1, 31)?),
        DateToken::Weekday => {
            let lower = value.trim().to_ascii_lowercase();
            let head = lower.get(..3).ok_or_else(|| bad(token, value))?;
            if !WEEKDAYS.contains(&head) {
                return Err(bad(token, value));
            }
        }
        DateToken::Year => parts.year = Some(int_component(token, value, 1000, 9999)? as i32),
        DateToken::Year2 => {
            let v = int_component(token, value, 0, 99)? as i32;
            parts.year = Some(if v < 70 { 2000 + v } else { 1900 + v });
        }
        DateToken::Hour => parts.hour = Some(int_component(token, value, 0, 23)?),
        DateToken::Minute => parts.minute = Some(int_component(token, value, 0, 59)?),
        DateToken::Second => {
            // 60 shows up in leap-second stamps; fold it rather than reject.
            parts.second = Some(int_component(token, value, 0, 60)?.min(59));
        }
        DateToken::Subsecond => {
            let digits = value.trim();
            if digits.is_empty() || digits.len() > 9 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad(token, value));
            }
            let scale = 10u32.pow(9 - digits.len() as u32);
            parts.nanos = digits.parse::<u32>().map_err(|_| bad(token, value))? * scale;
        }
        DateToken::AmPm => {
            let norm: String = value.trim().chars().filter(|c| *c != '.').collect();
            parts.pm = Some(match norm.to_ascii_uppercase().as_str() {
                "AM" => false,
                "PM" => true,
                _ => return Err(bad(token, value)),
            });
        }
        DateToken::TzOffset => parts.tz = Some(parse_offset(value).ok_or_else(|| bad(token, value))?),
        DateToken::TzName => parts.tz = Some(tz_name(value).ok_or_else(|| bad(token, value))?),
        DateToken::UnixSecs => {
            parts.unix = Some(value.trim().parse::<i64>().ok().filter(|v| *v >= 0).ok_or_else(|| bad(token, value))?)
        }
    }
    Ok(())
}

fn finalize(parts: DateParts, defaults: &TimestampDefaults) -> Result<DateTime<FixedOffset>, TimestampError> {
    let tz = parts.tz.unwrap_or(defaults.timezone);

    if let Some(unix) = parts.unix {
        let utc = DateTime::<Utc>::from_timestamp(unix, parts.nanos).ok_or(TimestampError::InvalidDate)?;
        return Ok(utc.with_timezone(&tz));
    }

    let (Some(month), Some(day)) = (parts.month, parts.day) else {
        return Err(TimestampError::IncompleteDate);
    };

    let mut hour = parts.hour.unwrap_or(0);
    match parts.pm {
        Some(true) if hour < 12 => hour += 12,
        Some(false) if hour == 12 => hour = 0,
        _ => {}
    }

    let build = |year: i32| -> Result<DateTime<FixedOffset>, TimestampError> {
        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_nano_opt(hour, parts.minute.unwrap_or(0), parts.second.unwrap_or(0), parts.nanos))
            .ok_or(TimestampError::InvalidDate)?;
        tz.from_local_datetime(&naive).single().ok_or(TimestampError::InvalidDate)
    };

    match parts.year {
        Some(year) => build(year),
        None if defaults.assume_current_year => {
            let now = Utc::now();
            let candidate = build(now.year())?;
            if candidate.with_timezone(&Utc) - now > chrono::Duration::seconds(defaults.max_future_skew_secs) {
                build(now.year() - 1)
            } else {
                Ok(candidate)
            }
        }
        None => Err(TimestampError::MissingYear),
    }
}

/// Parse `values` against one spec.
fn try_spec(
    values: &[&str],
    spec: &[DateToken],
    defaults: &TimestampDefaults,
) -> Result<DateTime<FixedOffset>, TimestampError> {
    if spec.len() != values.len() {
        return Err(TimestampError::TokenCountMismatch { tokens: spec.len(), values: values.len() });
    }
    let mut parts = DateParts::default();
    for (token, value) in spec.iter().zip(values) {
        apply_token(&mut parts, *token, value)?;
    }
    finalize(parts, defaults)
}

/// Compose an absolute instant from captured values.
///
/// `specs` is an ordered list of alternative component lists for the same
/// destination; the first fully parsing alternative wins. With a single
/// alternative its precise error is surfaced, with several the aggregate
/// outcome is [`TimestampError::NoAlternative`].
pub fn compose(
    values: &[&str],
    specs: &[Vec<DateToken>],
    defaults: &TimestampDefaults,
) -> Result<DateTime<FixedOffset>, TimestampError> {
    match specs {
        [] => Err(TimestampError::NoAlternative),
        [only] => try_spec(values, only, defaults),
        many => many
            .iter()
            .find_map(|spec| try_spec(values, spec, defaults).ok())
            .ok_or(TimestampError::NoAlternative),
    }
}
