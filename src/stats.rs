//! Record store statistics.
//!
//! Provides a quick summary of what's in the store: how many rows are
//! dated, exhausted, still waiting, or manually locked, broken down per
//! link type, plus the year distribution of resolved dates. Used by
//! `ledger stats` to judge how far resolution has progressed.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::models::{DateState, LinkType, LossRecord};
use crate::progress::format_number;
use crate::store;

/// Date-state counts for one slice of the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StateCounts {
    pub resolved: usize,
    pub exhausted: usize,
    pub unresolved: usize,
    pub locked: usize,
}

impl StateCounts {
    fn add(&mut self, record: &LossRecord) {
        match record.date {
            DateState::Resolved(_) => self.resolved += 1,
            DateState::Exhausted => self.exhausted += 1,
            DateState::Unresolved => self.unresolved += 1,
        }
        if record.manually_changed {
            self.locked += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.resolved + self.exhausted + self.unresolved
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub totals: StateCounts,
    pub by_link_type: BTreeMap<LinkType, StateCounts>,
    /// Resolved dates per year.
    pub years: BTreeMap<i32, usize>,
}

impl StoreStats {
    pub fn collect(records: &[LossRecord]) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.totals.add(record);
            stats
                .by_link_type
                .entry(record.link_type)
                .or_default()
                .add(record);
            if let Some(date) = record.date.resolved() {
                *stats.years.entry(date.parts().2).or_insert(0) += 1;
            }
        }
        stats
    }
}

/// Run the stats command: load the store and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let records = store::load_records(&config.store.path)?;
    let stats = StoreStats::collect(&records);

    println!("Loss Ledger Store Stats");
    println!("=======================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    println!("  Records:     {}", format_number(stats.totals.total() as u64));
    println!(
        "  Dated:       {} ({})",
        format_number(stats.totals.resolved as u64),
        percent(stats.totals.resolved, stats.totals.total())
    );
    println!("  Exhausted:   {}", format_number(stats.totals.exhausted as u64));
    println!("  Unresolved:  {}", format_number(stats.totals.unresolved as u64));
    println!("  Locked:      {}", format_number(stats.totals.locked as u64));

    if !stats.by_link_type.is_empty() {
        println!();
        println!("  By link type:");
        println!(
            "  {:<10} {:>8} {:>8} {:>10} {:>11} {:>7}",
            "TYPE", "TOTAL", "DATED", "EXHAUSTED", "UNRESOLVED", "LOCKED"
        );
        println!("  {}", "-".repeat(59));
        for (link_type, c) in &stats.by_link_type {
            println!(
                "  {:<10} {:>8} {:>8} {:>10} {:>11} {:>7}",
                link_type.as_str(),
                c.total(),
                c.resolved,
                c.exhausted,
                c.unresolved,
                c.locked
            );
        }
    }

    if !stats.years.is_empty() {
        println!();
        println!("  Dated by year:");
        for (year, count) in &stats.years {
            println!(
                "  {:<10} {:>8} {:>8}",
                year,
                count,
                percent(*count, stats.totals.resolved)
            );
        }
    }

    println!();
    Ok(())
}

fn percent(part: usize, whole: usize) -> String {
    if whole == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / whole as f64)
}
