//! Core data models used throughout Loss Ledger.
//!
//! These types represent the loss records that flow from the report
//! extractor through reconciliation and date resolution into the
//! persisted store.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::classify::classify_link;

/// Stored value meaning "every applicable resolver ran and none found a date".
pub const EXHAUSTED_SENTINEL: &str = "NO_DATE_FOUND";

static STORED_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").expect("static regex"));

/// Evidence host family, derived from the link's hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkType {
    Twitter,
    Postimg,
    Postlmg,
    Imgur,
    Other,
}

impl LinkType {
    pub const ALL: [LinkType; 5] = [
        LinkType::Twitter,
        LinkType::Postimg,
        LinkType::Postlmg,
        LinkType::Imgur,
        LinkType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Twitter => "twitter",
            LinkType::Postimg => "postimg",
            LinkType::Postlmg => "postlmg",
            LinkType::Imgur => "imgur",
            LinkType::Other => "other",
        }
    }

    /// Hosts that serve (or link to) a single image we can fetch and read.
    pub fn is_image_host(&self) -> bool {
        matches!(
            self,
            LinkType::Postimg | LinkType::Postlmg | LinkType::Imgur
        )
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" => Ok(LinkType::Twitter),
            "postimg" => Ok(LinkType::Postimg),
            "postlmg" => Ok(LinkType::Postlmg),
            "imgur" => Ok(LinkType::Imgur),
            "other" => Ok(LinkType::Other),
            other => Err(format!("unknown link type: '{}'", other)),
        }
    }
}

/// Inclusive range of years a resolved date may fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearBand {
    pub min: i32,
    pub max: i32,
}

impl YearBand {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

impl Default for YearBand {
    fn default() -> Self {
        Self {
            min: 2022,
            max: 2026,
        }
    }
}

/// An event date in `dd-mm-yyyy` form.
///
/// Resolvers can only build one through [`EventDate::from_ymd`], which
/// runs calendar and year-band validation. Values read back from the
/// store are only checked for shape, since a human may have typed them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventDate(String);

impl EventDate {
    /// Validate a calendar date against `band`. Returns `None` on month 13,
    /// day 32, February 30th, or a year outside the band.
    pub fn from_ymd(year: i32, month: u32, day: u32, band: &YearBand) -> Option<Self> {
        if !band.contains(year) {
            return None;
        }
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Self::from_naive(date))
    }

    fn from_naive(date: NaiveDate) -> Self {
        Self(format!(
            "{:02}-{:02}-{:04}",
            date.day(),
            date.month(),
            date.year()
        ))
    }

    /// Accept a stored cell that has the `dd-mm-yyyy` shape.
    pub fn parse_stored(s: &str) -> Option<Self> {
        let s = s.trim();
        if STORED_DATE_RE.is_match(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `(day, month, year)` as written; not calendar-checked.
    pub fn parts(&self) -> (u32, u32, i32) {
        let mut it = self.0.split('-');
        let day = it.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let month = it.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let year = it.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        (day, month, year)
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolution state of a record's `date` cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateState {
    /// No resolver has run for this record yet.
    #[default]
    Unresolved,
    Resolved(EventDate),
    /// Every applicable resolver ran and none produced a credible date.
    Exhausted,
}

impl DateState {
    /// Parse a store cell: empty, the sentinel, or `dd-mm-yyyy`.
    pub fn from_cell(cell: &str) -> Result<Self, String> {
        let cell = cell.trim();
        if cell.is_empty() {
            return Ok(DateState::Unresolved);
        }
        if cell.eq_ignore_ascii_case(EXHAUSTED_SENTINEL) {
            return Ok(DateState::Exhausted);
        }
        EventDate::parse_stored(cell)
            .map(DateState::Resolved)
            .ok_or_else(|| format!("unrecognized date value: '{}'", cell))
    }

    pub fn as_cell(&self) -> &str {
        match self {
            DateState::Unresolved => "",
            DateState::Resolved(d) => d.as_str(),
            DateState::Exhausted => EXHAUSTED_SENTINEL,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, DateState::Unresolved)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, DateState::Exhausted)
    }

    pub fn resolved(&self) -> Option<&EventDate> {
        match self {
            DateState::Resolved(d) => Some(d),
            _ => None,
        }
    }
}

/// One observed loss/damage event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossRecord {
    pub equipment_type: String,
    pub category: String,
    pub loss_type: String,
    pub link_type: LinkType,
    /// Stable identity key for reconciliation.
    pub link: String,
    pub date: DateState,
    /// Once set, automated resolvers never touch `date` again.
    pub manually_changed: bool,
}

impl LossRecord {
    /// A fresh, undated record; the link type is derived from `link`.
    pub fn new(
        equipment_type: impl Into<String>,
        category: impl Into<String>,
        loss_type: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        let link = link.into();
        Self {
            equipment_type: equipment_type.into(),
            category: category.into(),
            loss_type: loss_type.into(),
            link_type: classify_link(&link),
            link,
            date: DateState::Unresolved,
            manually_changed: false,
        }
    }
}
