//! Reconciliation of a fresh extraction with the persisted store.
//!
//! Identity is the evidence link. Merging runs each [`MergeStep`] over
//! every freshly extracted row that already has a persisted counterpart,
//! then concatenates persisted rows ahead of extracted rows and keeps the
//! first row per link. Rows that vanished from the report stay in the
//! store; nothing is ever dropped here.
//!
//! The same module owns the write side of resolution: which rows a run
//! may touch ([`pending_indices`]) and how an outcome lands on a row
//! ([`apply_outcome`]). Both refuse to touch manually locked rows.

use std::collections::{HashMap, HashSet};

use crate::models::{DateState, LossRecord};
use crate::resolver::Outcome;

/// One reconciliation policy applied to an extracted row that matches a
/// persisted row by link.
pub trait MergeStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Update `fresh` from `prior`. Returns whether anything changed.
    fn apply(&self, prior: &LossRecord, fresh: &mut LossRecord) -> bool;
}

/// Previously found dates (and exhaustion marks) survive re-extraction.
pub struct CarryForwardDate;

impl MergeStep for CarryForwardDate {
    fn name(&self) -> &'static str {
        "carry_date"
    }

    fn apply(&self, prior: &LossRecord, fresh: &mut LossRecord) -> bool {
        if prior.date.is_unresolved() || fresh.date == prior.date {
            return false;
        }
        fresh.date = prior.date.clone();
        true
    }
}

/// A manual lock, once set, is never cleared by re-extraction.
pub struct CarryForwardLock;

impl MergeStep for CarryForwardLock {
    fn name(&self) -> &'static str {
        "carry_lock"
    }

    fn apply(&self, prior: &LossRecord, fresh: &mut LossRecord) -> bool {
        if !prior.manually_changed || fresh.manually_changed {
            return false;
        }
        fresh.manually_changed = true;
        true
    }
}

/// The standard policy set, in application order.
pub fn default_steps() -> Vec<Box<dyn MergeStep>> {
    vec![Box::new(CarryForwardDate), Box::new(CarryForwardLock)]
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub prior: usize,
    pub extracted: usize,
    /// Links not present in the store before this merge.
    pub added: usize,
    /// Persisted links missing from this extraction, kept anyway.
    pub retained: usize,
    /// Extra rows dropped because their link was already present.
    pub duplicates: usize,
    /// Per-step count of rows the step changed.
    pub step_changes: Vec<(&'static str, usize)>,
    pub total: usize,
}

/// Merge with [`default_steps`].
pub fn merge(prior: Vec<LossRecord>, extracted: Vec<LossRecord>) -> (Vec<LossRecord>, MergeSummary) {
    merge_with(&default_steps(), prior, extracted)
}

pub fn merge_with(
    steps: &[Box<dyn MergeStep>],
    prior: Vec<LossRecord>,
    mut extracted: Vec<LossRecord>,
) -> (Vec<LossRecord>, MergeSummary) {
    let mut summary = MergeSummary {
        prior: prior.len(),
        extracted: extracted.len(),
        step_changes: steps.iter().map(|s| (s.name(), 0)).collect(),
        ..Default::default()
    };

    {
        let mut by_link: HashMap<&str, &LossRecord> = HashMap::new();
        for record in &prior {
            by_link.entry(record.link.as_str()).or_insert(record);
        }

        for fresh in extracted.iter_mut() {
            let Some(old) = by_link.get(fresh.link.as_str()) else {
                continue;
            };
            for (i, step) in steps.iter().enumerate() {
                if step.apply(old, fresh) {
                    summary.step_changes[i].1 += 1;
                }
            }
        }
    }

    {
        let extracted_links: HashSet<&str> = extracted.iter().map(|r| r.link.as_str()).collect();
        let prior_links: HashSet<&str> = prior.iter().map(|r| r.link.as_str()).collect();
        summary.retained = prior_links.difference(&extracted_links).count();
        summary.added = extracted_links.difference(&prior_links).count();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(prior.len() + extracted.len());
    for record in prior.into_iter().chain(extracted) {
        if seen.insert(record.link.clone()) {
            merged.push(record);
        } else {
            summary.duplicates += 1;
        }
    }

    summary.total = merged.len();
    (merged, summary)
}

/// Which rows a resolution run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryScope {
    /// Rows never attempted.
    Unresolved,
    /// Only rows a previous run marked exhausted.
    Exhausted,
    /// Rows never attempted plus rows a previous run marked exhausted.
    UnresolvedAndExhausted,
}

impl RetryScope {
    /// An explicit `--retry-exhausted` narrows the run to exhausted rows.
    /// The `resolve.retry_exhausted` config key widens every run to include
    /// them, so freshly extracted rows still get attempted.
    pub fn select(flag: bool, config_key: bool) -> Self {
        match (flag, config_key) {
            (true, _) => RetryScope::Exhausted,
            (false, true) => RetryScope::UnresolvedAndExhausted,
            (false, false) => RetryScope::Unresolved,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RetryScope::Unresolved => "unresolved",
            RetryScope::Exhausted => "exhausted",
            RetryScope::UnresolvedAndExhausted => "unresolved+exhausted",
        }
    }

    fn targets(&self, date: &DateState) -> bool {
        match self {
            RetryScope::Unresolved => date.is_unresolved(),
            RetryScope::Exhausted => date.is_exhausted(),
            RetryScope::UnresolvedAndExhausted => date.is_unresolved() || date.is_exhausted(),
        }
    }
}

/// Indices of unlocked rows in `scope`, in store order.
pub fn pending_indices(records: &[LossRecord], scope: RetryScope) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.manually_changed && scope.targets(&r.date))
        .map(|(i, _)| i)
        .collect()
}

/// Write a resolution outcome onto `record`. Locked rows are left as they
/// are; returns whether the row changed.
pub fn apply_outcome(record: &mut LossRecord, outcome: &Outcome) -> bool {
    if record.manually_changed {
        return false;
    }
    let next = match outcome {
        Outcome::Resolved(hit) => DateState::Resolved(hit.date.clone()),
        Outcome::Exhausted { .. } => DateState::Exhausted,
    };
    if record.date == next {
        return false;
    }
    record.date = next;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventDate;
    use crate::resolver::Hit;

    fn rec(link: &str) -> LossRecord {
        LossRecord::new("T-72B", "Tanks", "destroyed", link)
    }

    fn dated(link: &str, date: &str) -> LossRecord {
        let mut r = rec(link);
        r.date = DateState::Resolved(EventDate::parse_stored(date).unwrap());
        r
    }

    fn hit(date: &str) -> Outcome {
        Outcome::Resolved(Hit {
            date: EventDate::parse_stored(date).unwrap(),
            resolver: "test",
        })
    }

    #[test]
    fn test_empty_store_takes_extraction() {
        let (merged, summary) = merge(vec![], vec![rec("a"), rec("b")]);
        assert_eq!(merged.len(), 2);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.retained, 0);
    }

    #[test]
    fn test_carries_date_and_lock() {
        let mut locked = dated("b", "02-03-2023");
        locked.manually_changed = true;
        let prior = vec![dated("a", "01-03-2023"), locked];

        let mut steps_only = vec![rec("a"), rec("b")];
        let by_link: Vec<LossRecord> = prior.clone();
        for (old, fresh) in by_link.iter().zip(steps_only.iter_mut()) {
            CarryForwardDate.apply(old, fresh);
            CarryForwardLock.apply(old, fresh);
        }
        assert_eq!(steps_only, prior);

        let (merged, summary) = merge(prior.clone(), vec![rec("a"), rec("b"), rec("c")]);
        assert_eq!(&merged[..2], &prior[..]);
        assert!(merged[2].date.is_unresolved());
        assert_eq!(summary.step_changes, vec![("carry_date", 2), ("carry_lock", 1)]);
    }

    #[test]
    fn test_unresolved_prior_does_not_clear_fresh() {
        let mut fresh = rec("a");
        fresh.date = DateState::Exhausted;
        assert!(!CarryForwardDate.apply(&rec("a"), &mut fresh));
        assert!(fresh.date.is_exhausted());
    }

    #[test]
    fn test_prior_only_rows_are_retained() {
        let (merged, summary) = merge(vec![dated("gone", "05-05-2022"), rec("a")], vec![rec("a")]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].link, "gone");
        assert_eq!(summary.retained, 1);
        assert_eq!(summary.duplicates, 1);
    }

    #[test]
    fn test_expansion_rows_collapse_to_one_per_link() {
        let extracted = vec![rec("x"), rec("x"), rec("x"), rec("y")];
        let (merged, summary) = merge(vec![], extracted);
        let links: Vec<&str> = merged.iter().map(|r| r.link.as_str()).collect();
        assert_eq!(links, vec!["x", "y"]);
        assert_eq!(summary.duplicates, 2);
        assert_eq!(summary.added, 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let prior = vec![dated("a", "01-01-2023"), rec("z")];
        let batch = vec![rec("a"), rec("b"), rec("b")];
        let (once, _) = merge(prior, batch.clone());
        let (twice, summary) = merge(once.clone(), batch);
        assert_eq!(once, twice);
        assert_eq!(summary.added, 0);
    }

    #[test]
    fn test_pending_respects_scope_and_lock() {
        let mut locked = rec("c");
        locked.manually_changed = true;
        let mut exhausted = rec("d");
        exhausted.date = DateState::Exhausted;
        let mut locked_exhausted = rec("e");
        locked_exhausted.date = DateState::Exhausted;
        locked_exhausted.manually_changed = true;

        let records = vec![
            rec("a"),
            dated("b", "01-01-2023"),
            locked,
            exhausted,
            locked_exhausted,
        ];
        assert_eq!(pending_indices(&records, RetryScope::Unresolved), vec![0]);
        assert_eq!(pending_indices(&records, RetryScope::Exhausted), vec![3]);
        assert_eq!(
            pending_indices(&records, RetryScope::UnresolvedAndExhausted),
            vec![0, 3]
        );
    }

    #[test]
    fn test_scope_selection() {
        assert_eq!(RetryScope::select(false, false), RetryScope::Unresolved);
        assert_eq!(RetryScope::select(true, false), RetryScope::Exhausted);
        assert_eq!(RetryScope::select(true, true), RetryScope::Exhausted);
        assert_eq!(
            RetryScope::select(false, true),
            RetryScope::UnresolvedAndExhausted
        );
    }

    #[test]
    fn test_apply_outcome_never_touches_locked_rows() {
        let mut locked = dated("a", "01-01-2023");
        locked.manually_changed = true;
        assert!(!apply_outcome(&mut locked, &hit("09-09-2024")));
        assert!(!apply_outcome(&mut locked, &Outcome::Exhausted { fetch_failed: true }));
        assert_eq!(locked.date.as_cell(), "01-01-2023");

        let mut open = dated("b", "01-01-2023");
        assert!(apply_outcome(&mut open, &hit("09-09-2024")));
        assert_eq!(open.date.as_cell(), "09-09-2024");
        assert!(apply_outcome(&mut open, &Outcome::Exhausted { fetch_failed: false }));
        assert!(open.date.is_exhausted());
    }
}
