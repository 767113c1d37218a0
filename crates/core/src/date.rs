//! Report dates.
//!
//! Every caller-facing date uses the fixed-width `YYYY/MM/DD` form: the submit
//! and listing endpoints accept it and the date picker is fed with it.

use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

const WIRE_FORMAT: &str = "%Y/%m/%d";

/// A calendar day (no time component) that campaigns and report jobs are keyed by.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportDate(NaiveDate);

impl ReportDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Build from year/month/day, rejecting impossible dates.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, DomainError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| DomainError::validation(format!("invalid date {year}/{month}/{day}")))
    }

    /// Parse the `YYYY/MM/DD` wire form.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let s = s.trim();
        // chrono accepts unpadded fields; the contract is fixed width.
        if s.len() != 10 {
            return Err(DomainError::validation(format!(
                "invalid date '{s}': expected YYYY/MM/DD"
            )));
        }
        NaiveDate::parse_from_str(s, WIRE_FORMAT)
            .map(Self)
            .map_err(|_| DomainError::validation(format!("invalid date '{s}': expected YYYY/MM/DD")))
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// `YYYYMMDD`, used in artifact names.
    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    /// `YYYY-MM-DD`, used inside CSV bodies.
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl core::fmt::Display for ReportDate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.format(WIRE_FORMAT))
    }
}

impl FromStr for ReportDate {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<NaiveDate> for ReportDate {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

impl From<ReportDate> for NaiveDate {
    fn from(value: ReportDate) -> Self {
        value.0
    }
}

impl Serialize for ReportDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReportDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
