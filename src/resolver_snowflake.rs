//! Date recovery from post identifiers (Snowflake IDs).
//!
//! A Snowflake carries its creation time in the top 42 bits as
//! milliseconds since the platform epoch.

use chrono::{DateTime, Datelike};
use reqwest::Url;

use crate::models::{EventDate, LinkType, YearBand};
use crate::resolver::{DateResolver, ResolveInput};

/// 2010-11-04T01:42:54.657Z in milliseconds since the Unix epoch.
pub const PLATFORM_EPOCH_MS: i64 = 1_288_834_974_657;

const TIMESTAMP_SHIFT: u32 = 22;

pub struct SnowflakeResolver {
    band: YearBand,
}

impl SnowflakeResolver {
    pub fn new(band: YearBand) -> Self {
        Self { band }
    }
}

impl DateResolver for SnowflakeResolver {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn applies_to(&self, link_type: LinkType) -> bool {
        link_type == LinkType::Twitter
    }

    fn resolve(&self, input: &ResolveInput<'_>) -> Option<EventDate> {
        let id = status_id(&input.record.link)?;
        snowflake_date(id, &self.band)
    }
}

/// Decode a Snowflake into a UTC calendar date inside `band`.
pub fn snowflake_date(id: u64, band: &YearBand) -> Option<EventDate> {
    let ms = i64::try_from(id >> TIMESTAMP_SHIFT).ok()? + PLATFORM_EPOCH_MS;
    let instant = DateTime::from_timestamp_millis(ms)?;
    EventDate::from_ymd(instant.year(), instant.month(), instant.day(), band)
}

/// Trailing numeric path segment of a status link.
fn status_id(link: &str) -> Option<u64> {
    let path = Url::parse(link).map(|u| u.path().to_string()).ok()?;
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    segment.parse::<u64>().ok()
}
