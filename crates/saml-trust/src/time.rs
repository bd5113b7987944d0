//! SAML2 timestamp conversion and ISO 8601 duration arithmetic.
//!
//! Validity windows in SAML metadata and assertions are expressed either as
//! an absolute `validUntil` timestamp or as a relative `cacheDuration`
//! (ISO 8601 duration). Both grammars are parsed strictly; anything that
//! does not match fails instead of being guessed at.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use regex::Regex;

use crate::error::{TrustError, TrustResult};

const SAML_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

static SAML_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})(?:\.\d+)?Z$")
        .expect("timestamp pattern compiles")
});

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?)P(?:(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?|(\d+)W)$")
        .expect("duration pattern compiles")
});

/// Converts a unix timestamp to the SAML2 form `yyyy-mm-ddThh:mm:ssZ`,
/// always in UTC.
pub fn unix_to_saml_time(timestamp: i64) -> TrustResult<String> {
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| TrustError::InvalidTimestamp(format!("unix time {timestamp} out of range")))?;
    Ok(datetime.format(SAML_TIME_FORMAT).to_string())
}

/// Converts a SAML2 timestamp `yyyy-mm-ddThh:mm:ss(.s+)?Z` to a unix
/// timestamp. The sub-second part is parsed and discarded.
pub fn saml_time_to_unix(time: &str) -> TrustResult<i64> {
    let invalid = || TrustError::InvalidTimestamp(time.to_string());
    let captures = SAML_TIME_RE.captures(time).ok_or_else(invalid)?;

    let field = |i: usize| -> TrustResult<u32> {
        captures
            .get(i)
            .map(|m| m.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)
    };

    let year = i32::try_from(field(1)?).map_err(|_| invalid())?;
    let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?).ok_or_else(invalid)?;
    let datetime = date
        .and_hms_opt(field(4)?, field(5)?, field(6)?)
        .ok_or_else(invalid)?;
    Ok(datetime.and_utc().timestamp())
}

/// A parsed ISO 8601 duration.
///
/// Immutable once parsed; applying it never mutates the base timestamp.
/// Year and month components are calendar-relative: they move the UTC
/// calendar date, clamping the day-of-month to the target month's length
/// (one year after 2024-02-29 is 2025-02-28). The remaining components are
/// fixed-length elapsed seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationExpression {
    years: i64,
    months: i64,
    days: i64,
    hours: i64,
    minutes: i64,
    seconds: i64,
    weeks: i64,
}

impl DurationExpression {
    /// Parses `[-]P(nY)?(nM)?(nD)?(T(nH)?(nM)?(nS)?)?` or `[-]PnW`.
    /// A leading `-` negates every component.
    pub fn parse(duration: &str) -> TrustResult<Self> {
        let captures = DURATION_RE
            .captures(duration)
            .ok_or_else(|| TrustError::InvalidDuration(duration.to_string()))?;

        let component = |i: usize| -> TrustResult<i64> {
            match captures.get(i) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| TrustError::InvalidDuration(duration.to_string())),
                None => Ok(0),
            }
        };

        let sign = if captures.get(1).is_some_and(|m| !m.as_str().is_empty()) {
            -1
        } else {
            1
        };

        Ok(Self {
            years: sign * component(2)?,
            months: sign * component(3)?,
            days: sign * component(4)?,
            hours: sign * component(5)?,
            minutes: sign * component(6)?,
            seconds: sign * component(7)?,
            weeks: sign * component(8)?,
        })
    }

    /// Applies the duration to a unix timestamp, returning the derived
    /// timestamp.
    pub fn apply_to(&self, base: i64) -> TrustResult<i64> {
        let mut timestamp = base;

        if self.years != 0 || self.months != 0 {
            // Months and years are not fixed intervals; shift the calendar
            // date and normalize month overflow into year carries.
            let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).ok_or_else(|| {
                TrustError::InvalidTimestamp(format!("unix time {timestamp} out of range"))
            })?;

            let mut year = i64::from(datetime.year()) + self.years;
            let mut month = i64::from(datetime.month()) + self.months;
            while month > 12 {
                year += 1;
                month -= 12;
            }
            while month < 1 {
                year -= 1;
                month += 12;
            }

            let year = i32::try_from(year)
                .map_err(|_| TrustError::InvalidTimestamp(format!("year {year} out of range")))?;
            let month = month as u32;
            let day = datetime.day().min(days_in_month(year, month)?);

            let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                TrustError::InvalidTimestamp(format!("{year}-{month:02}-{day:02} out of range"))
            })?;
            timestamp = date
                .and_hms_opt(datetime.hour(), datetime.minute(), datetime.second())
                .ok_or_else(|| TrustError::InvalidTimestamp("time of day out of range".into()))?
                .and_utc()
                .timestamp();
        }

        timestamp += self.weeks * 7 * 86_400;
        timestamp += self.days * 86_400;
        timestamp += self.hours * 3_600;
        timestamp += self.minutes * 60;
        timestamp += self.seconds;
        Ok(timestamp)
    }
}

fn days_in_month(year: i32, month: u32) -> TrustResult<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .ok_or_else(|| TrustError::InvalidTimestamp(format!("{year}-{month:02} out of range")))
}

/// Interprets an ISO 8601 duration relative to `base` (the current time
/// when omitted) and returns the derived unix timestamp.
pub fn apply_duration(duration: &str, base: Option<i64>) -> TrustResult<i64> {
    let base = base.unwrap_or_else(|| Utc::now().timestamp());
    DurationExpression::parse(duration)?.apply_to(base)
}

/// An absolute expiry, either already resolved or as SAML2 timestamp text.
#[derive(Debug, Clone, Copy)]
pub enum ValidUntil<'a> {
    Timestamp(i64),
    SamlTime(&'a str),
}

impl From<i64> for ValidUntil<'_> {
    fn from(timestamp: i64) -> Self {
        ValidUntil::Timestamp(timestamp)
    }
}

impl<'a> From<&'a str> for ValidUntil<'a> {
    fn from(time: &'a str) -> Self {
        ValidUntil::SamlTime(time)
    }
}

/// Computes the expiry of cached material: the earlier of the
/// `cache_duration`-derived expiry (relative to now) and the resolved
/// `valid_until`, whichever inputs are present.
pub fn expire_time(
    cache_duration: Option<&str>,
    valid_until: Option<ValidUntil<'_>>,
) -> TrustResult<Option<i64>> {
    expire_time_at(Utc::now().timestamp(), cache_duration, valid_until)
}

/// Same as [`expire_time`], against an explicit reference time.
pub fn expire_time_at(
    now: i64,
    cache_duration: Option<&str>,
    valid_until: Option<ValidUntil<'_>>,
) -> TrustResult<Option<i64>> {
    let mut expire = match cache_duration {
        Some(duration) => Some(DurationExpression::parse(duration)?.apply_to(now)?),
        None => None,
    };

    if let Some(valid_until) = valid_until {
        let valid_until = match valid_until {
            ValidUntil::Timestamp(timestamp) => timestamp,
            ValidUntil::SamlTime(time) => saml_time_to_unix(time)?,
        };
        expire = Some(match expire {
            Some(expire) if expire <= valid_until => expire,
            _ => valid_until,
        });
    }

    Ok(expire)
}
