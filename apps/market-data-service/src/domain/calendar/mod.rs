//! Market Clock
//!
//! Pure business-hours calendar for the US equities session. Given an
//! instant, decides whether the regular session is open and, if not, why.
//!
//! # Rules
//!
//! - Evaluated in `America/New_York` local time
//! - Closed on Saturday and Sunday
//! - Closed on observed holidays (see [`holidays`])
//! - Otherwise open from 09:30 (inclusive) to 16:00 (exclusive)
//!
//! Nothing here reads the system clock; callers pass `now` so the calendar
//! can be tested against fixed instants.

pub mod holidays;

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub use holidays::{Holiday, HolidayRule, US_MARKET_HOLIDAYS, observed_holiday};

/// Exchange timezone for the equities session.
pub const EXCHANGE_TZ: Tz = New_York;

/// Regular session open, local time.
const SESSION_OPEN: (u32, u32) = (9, 30);

/// Regular session close, local time.
const SESSION_CLOSE: (u32, u32) = (16, 0);

// =============================================================================
// Status Types
// =============================================================================

/// Headline market status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusMessage {
    /// Regular session in progress.
    Open,
    /// Outside the regular session.
    #[default]
    Closed,
}

impl StatusMessage {
    /// Wire/storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    /// Parse a stored value. Anything other than `OPEN` is treated as closed.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        if s.eq_ignore_ascii_case("open") {
            Self::Open
        } else {
            Self::Closed
        }
    }
}

/// Why the market is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureReason {
    /// Saturday or Sunday.
    Weekend(Weekday),
    /// Observed holiday, by name.
    Holiday(&'static str),
    /// Weekday before 09:30.
    PreMarket,
    /// Weekday at or after 16:00.
    AfterMarket,
}

impl fmt::Display for ClosureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weekend(Weekday::Sun) => write!(f, "Weekend (Sunday)"),
            Self::Weekend(_) => write!(f, "Weekend (Saturday)"),
            Self::Holiday(name) => write!(f, "Holiday: {name}"),
            Self::PreMarket => write!(f, "Pre-market hours"),
            Self::AfterMarket => write!(f, "After-market hours"),
        }
    }
}

/// Session state at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Regular session open.
    Open,
    /// Closed, with reason.
    Closed(ClosureReason),
}

impl SessionState {
    /// Whether the regular session is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Market status as published to the store and to query clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStatus {
    /// Whether the regular session is open.
    pub is_open: bool,
    /// `OPEN` or `CLOSED`.
    pub status_message: StatusMessage,
    /// Closure reason; empty while open.
    pub reason: String,
}

impl From<SessionState> for MarketStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Open => Self {
                is_open: true,
                status_message: StatusMessage::Open,
                reason: String::new(),
            },
            SessionState::Closed(reason) => Self {
                is_open: false,
                status_message: StatusMessage::Closed,
                reason: reason.to_string(),
            },
        }
    }
}

// =============================================================================
// Calendar
// =============================================================================

/// Exchange calendar: holiday table plus session window.
#[derive(Debug, Clone, Copy)]
pub struct MarketCalendar {
    holidays: &'static [Holiday],
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::us_equities()
    }
}

impl MarketCalendar {
    /// Calendar for the US equities regular session.
    #[must_use]
    pub const fn us_equities() -> Self {
        Self {
            holidays: US_MARKET_HOLIDAYS,
        }
    }

    /// Session state at `now`.
    #[must_use]
    pub fn session_at(&self, now: DateTime<Utc>) -> SessionState {
        let local = now.with_timezone(&EXCHANGE_TZ);

        let weekday = local.weekday();
        if matches!(weekday, Weekday::Sat | Weekday::Sun) {
            return SessionState::Closed(ClosureReason::Weekend(weekday));
        }

        if let Some(holiday) = observed_holiday(self.holidays, local.date_naive()) {
            return SessionState::Closed(ClosureReason::Holiday(holiday.name));
        }

        let time = local.time();
        if time < session_time(SESSION_OPEN) {
            SessionState::Closed(ClosureReason::PreMarket)
        } else if time >= session_time(SESSION_CLOSE) {
            SessionState::Closed(ClosureReason::AfterMarket)
        } else {
            SessionState::Open
        }
    }

    /// Market status at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> MarketStatus {
        self.session_at(now).into()
    }
}

/// Market status at `now` using the US equities calendar.
#[must_use]
pub fn is_market_open(now: DateTime<Utc>) -> MarketStatus {
    MarketCalendar::us_equities().status_at(now)
}

/// Exchange-local calendar date of `now`.
#[must_use]
pub fn exchange_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&EXCHANGE_TZ).date_naive()
}

fn session_time((hour, minute): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
