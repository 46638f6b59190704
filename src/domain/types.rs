//! Shared types for the presence gateway

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wire and storage format for all timestamps (second resolution, no timezone)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of trailing id characters used for auto-enrolled names
const PLACEHOLDER_SUFFIX_LEN: usize = 4;

/// Newtype wrapper for token identities
///
/// Readers report ids either as numbers or strings; both deserialize to the
/// same textual id so `12345` and `"12345"` name the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Display name given to tokens enrolled without an operator-supplied name
    pub fn placeholder_name(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let start = chars.len().saturating_sub(PLACEHOLDER_SUFFIX_LEN);
        let suffix: String = chars[start..].iter().collect();
        format!("Unknown Card {}", suffix)
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for IdentityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct IdentityVisitor;

        impl<'de> Visitor<'de> for IdentityVisitor {
            type Value = IdentityId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer token id")
            }

            fn visit_str<E>(self, value: &str) -> Result<IdentityId, E>
            where
                E: de::Error,
            {
                Ok(IdentityId::new(value))
            }

            fn visit_string<E>(self, value: String) -> Result<IdentityId, E>
            where
                E: de::Error,
            {
                Ok(IdentityId::new(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<IdentityId, E>
            where
                E: de::Error,
            {
                Ok(IdentityId(value.to_string()))
            }

            fn visit_i64<E>(self, value: i64) -> Result<IdentityId, E>
            where
                E: de::Error,
            {
                Ok(IdentityId(value.to_string()))
            }
        }

        deserializer.deserialize_any(IdentityVisitor)
    }
}

/// Wall-clock time with one-second resolution and no timezone marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Current local time of this host
    pub fn now_local() -> Self {
        Self::from_naive(Local::now().naive_local())
    }

    /// Truncate sub-second precision
    pub fn from_naive(value: NaiveDateTime) -> Self {
        Self(value.with_nanosecond(0).unwrap_or(value))
    }

    pub fn parse(value: &str) -> Result<Self, chrono::ParseError> {
        NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map(Self)
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Signed time elapsed from `earlier` to `self`
    pub fn since(&self, earlier: Timestamp) -> TimeDelta {
        self.0 - earlier.0
    }

    pub fn checked_add(&self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(delta).map(Self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).map_err(|e| {
            serde::de::Error::custom(format!("invalid timestamp {:?}: {}", raw, e))
        })
    }
}

/// Render a duration the way session history displays it: `H:MM:SS`,
/// prefixed with `N day(s), ` once it spans a day.
///
/// Negative values borrow from the day count, so minus thirty seconds
/// renders as `-1 day, 23:59:30`.
pub fn format_duration(delta: TimeDelta) -> String {
    let total = delta.num_seconds();
    let days = total.div_euclid(86_400);
    let rem = total.rem_euclid(86_400);
    let (hours, minutes, seconds) = (rem / 3600, rem % 3600 / 60, rem % 60);

    if days == 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        let plural = if days.abs() == 1 { "" } else { "s" };
        format!("{} day{}, {}:{:02}:{:02}", days, plural, hours, minutes, seconds)
    }
}

/// Whole minutes left to wait, rounded up
pub fn ceil_minutes(delta: &TimeDelta) -> i64 {
    let secs = delta.num_seconds().max(0);
    (secs + 59) / 60
}

/// Coordinator-wide operating policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Idle,
    Enroll,
    Attendance,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid mode {0:?} (expected idle, enroll or attendance)")]
pub struct InvalidMode(pub String);

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Enroll => "enroll",
            Mode::Attendance => "attendance",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Mode::Idle),
            "enroll" => Ok(Mode::Enroll),
            "attendance" => Ok(Mode::Attendance),
            other => Err(InvalidMode(other.to_string())),
        }
    }
}

/// Explicit action on a scan; absent means "toggle"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAction {
    Checkin,
    Checkout,
}

impl ScanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanAction::Checkin => "checkin",
            ScanAction::Checkout => "checkout",
        }
    }
}

/// Classified outcome of a scan as reported to devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Success,
    Checkin,
    Checkout,
    Warning,
    Unknown,
    Enrolled,
    Error,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Success => "success",
            ScanStatus::Checkin => "checkin",
            ScanStatus::Checkout => "checkout",
            ScanStatus::Warning => "warning",
            ScanStatus::Unknown => "unknown",
            ScanStatus::Enrolled => "enrolled",
            ScanStatus::Error => "error",
        }
    }
}

/// Enrolled person/token pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
}

/// One check-in/check-out interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: i64,
    pub identity_id: IdentityId,
    pub check_in: Timestamp,
    pub check_out: Option<Timestamp>,
    pub duration: Option<String>,
}

impl Session {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.check_out.is_none()
    }
}
