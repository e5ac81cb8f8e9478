//! Stored-date validation.
//!
//! Hand corrections and older tooling can leave dates in the store that no
//! resolver would have produced. `ledger validate` reads the raw date cells
//! (so it works even on a store that no longer loads) and reports the first
//! failing check per row.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::config::Config;
use crate::models::{YearBand, EXHAUSTED_SENTINEL};
use crate::store;

static SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").expect("static regex"));

/// Why a stored date was rejected. Checks run in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    InvalidFormat,
    Day(u32),
    Month(u32),
    Year(i32),
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::InvalidFormat => write!(f, "invalid format"),
            Problem::Day(d) => write!(f, "day {} out of range", d),
            Problem::Month(m) => write!(f, "month {} out of range", m),
            Problem::Year(y) => write!(f, "year {} outside accepted band", y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub line: usize,
    pub link: String,
    pub value: String,
    pub problem: Problem,
}

/// Check one date cell. Empty cells and the sentinel are always fine.
pub fn check_cell(cell: &str, band: &YearBand) -> Option<Problem> {
    let cell = cell.trim();
    if cell.is_empty() || cell == EXHAUSTED_SENTINEL {
        return None;
    }
    if !SHAPE.is_match(cell) {
        return Some(Problem::InvalidFormat);
    }

    // Shape guarantees three numeric parts.
    let mut parts = cell.split('-');
    let day: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;

    if !(1..=31).contains(&day) {
        return Some(Problem::Day(day));
    }
    if !(1..=12).contains(&month) {
        return Some(Problem::Month(month));
    }
    if !band.contains(year) {
        return Some(Problem::Year(year));
    }
    None
}

pub fn validate_cells(cells: &[(usize, String, String)], band: &YearBand) -> Vec<Finding> {
    cells
        .iter()
        .filter_map(|(line, link, value)| {
            check_cell(value, band).map(|problem| Finding {
                line: *line,
                link: link.clone(),
                value: value.clone(),
                problem,
            })
        })
        .collect()
}

/// Print every finding. Returns `true` when the store is clean.
pub fn run_validate(config: &Config) -> Result<bool> {
    let path = &config.store.path;
    if !path.exists() {
        println!("validate");
        println!("  store: {} (missing)", path.display());
        println!("ok");
        return Ok(true);
    }

    let cells = store::read_date_cells(path)?;
    let findings = validate_cells(&cells, &config.resolve.year_band());

    println!("validate");
    println!("  rows checked: {}", cells.len());
    println!("  invalid dates: {}", findings.len());
    for f in &findings {
        println!("  line {}: '{}' {} ({})", f.line, f.value, f.problem, f.link);
    }
    if findings.is_empty() {
        println!("ok");
    }
    Ok(findings.is_empty())
}
