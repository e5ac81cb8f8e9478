//! Date recovery from the filename embedded in an evidence link.
//!
//! Uploaders commonly name files like `1002-unkn-destr-18-11-24.jpg`; the
//! last dash-separated digit triple is the date, in one of three orders.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::models::{EventDate, LinkType, YearBand};
use crate::resolver::{DateResolver, ResolveInput};

static DIGIT_TRIPLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{2,4}-\d{2}-\d{2,4}").expect("static regex"));

pub struct FilenameResolver {
    band: YearBand,
}

impl FilenameResolver {
    pub fn new(band: YearBand) -> Self {
        Self { band }
    }
}

impl DateResolver for FilenameResolver {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn applies_to(&self, link_type: LinkType) -> bool {
        link_type != LinkType::Twitter
    }

    fn resolve(&self, input: &ResolveInput<'_>) -> Option<EventDate> {
        date_from_link(&input.record.link, &self.band)
    }
}

/// Recover a date from the last digit triple in the link's filename.
pub fn date_from_link(link: &str, band: &YearBand) -> Option<EventDate> {
    let stem = filename_stem(link);
    let triple = DIGIT_TRIPLE.find_iter(&stem).last()?;

    let mut parts = triple.as_str().split('-').map(|p| p.parse::<i32>().ok());
    let a = parts.next()??;
    let b = parts.next()??;
    let c = parts.next()??;
    let month = u32::try_from(b).ok()?;

    // dd-mm-yyyy, then yyyy-mm-dd, then dd-mm-yy
    let day_first = u32::try_from(a).ok();
    let day_last = u32::try_from(c).ok();
    day_first
        .and_then(|day| EventDate::from_ymd(c, month, day, band))
        .or_else(|| day_last.and_then(|day| EventDate::from_ymd(a, month, day, band)))
        .or_else(|| {
            if (0..=99).contains(&c) {
                day_first.and_then(|day| EventDate::from_ymd(2000 + c, month, day, band))
            } else {
                None
            }
        })
}

/// Last path segment of `link` without its extension.
fn filename_stem(link: &str) -> String {
    let path = Url::parse(link)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| link.split(['?', '#']).next().unwrap_or_default().to_string());
    let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[..dot].to_string(),
        _ => name.to_string(),
    }
}
