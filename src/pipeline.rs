//! Pipeline orchestration.
//!
//! Coordinates the full flow: report snapshot → extraction → merge with
//! the persisted store → date resolution with incremental saves.
//!
//! Resolution fans out over a bounded pool of tokio tasks, one per
//! pending record, in fixed-size batches. Tasks only compute outcomes; the
//! calling task is the single writer that applies them to the record set
//! and checkpoints the store after each whole batch, so an interruption
//! loses at most one batch of work and never leaves a half-written store.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::extract::{parse_report_file, Extraction};
use crate::fetch::{HttpImageProvider, ImageProvider};
use crate::merge::{apply_outcome, merge, pending_indices, MergeSummary, RetryScope};
use crate::models::LossRecord;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::resolver::{resolve_record, Outcome, ResolverChain};
use crate::store;

/// Knobs for one resolution run.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub scope: RetryScope,
    /// Attempt at most this many records.
    pub limit: Option<usize>,
    pub batch_size: usize,
    pub concurrency: usize,
}

impl ResolveOptions {
    pub fn from_config(config: &Config, retry_exhausted: bool, limit: Option<usize>) -> Self {
        Self {
            scope: RetryScope::select(retry_exhausted, config.resolve.retry_exhausted),
            limit,
            batch_size: config.resolve.batch_size.max(1),
            concurrency: config.resolve.concurrency.max(1),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Records eligible under the scope before `limit` was applied.
    pub eligible: usize,
    pub attempted: usize,
    /// Dates found, per resolver name.
    pub resolved: BTreeMap<&'static str, usize>,
    pub exhausted: usize,
    /// Exhausted because the evidence image could not be retrieved.
    pub fetch_failures: usize,
    /// Tasks that died before producing an outcome; their rows are untouched.
    pub failed_tasks: usize,
    pub checkpoints: usize,
    /// Records still eligible under the scope after the run.
    pub remaining: usize,
}

impl ResolveSummary {
    pub fn resolved_total(&self) -> usize {
        self.resolved.values().sum()
    }
}

/// Resolve the pending rows of `records` in place.
///
/// `checkpoint` is called with the full record set after every batch.
/// Rows outside `opts.scope` and manually locked rows are never touched.
pub async fn resolve_records<F>(
    records: &mut [LossRecord],
    chain: Arc<ResolverChain>,
    images: Arc<dyn ImageProvider>,
    opts: ResolveOptions,
    progress: &dyn ProgressReporter,
    mut checkpoint: F,
) -> Result<ResolveSummary>
where
    F: FnMut(&[LossRecord]) -> Result<()>,
{
    let mut pending = pending_indices(records, opts.scope);
    let mut summary = ResolveSummary {
        eligible: pending.len(),
        resolved: chain.names().into_iter().map(|n| (n, 0)).collect(),
        ..Default::default()
    };
    if let Some(limit) = opts.limit {
        pending.truncate(limit);
    }

    let total = pending.len() as u64;
    let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let mut done = 0u64;

    for batch in pending.chunks(opts.batch_size.max(1)) {
        let mut tasks = JoinSet::new();
        for &idx in batch {
            let permit = semaphore.clone().acquire_owned().await?;
            let chain = chain.clone();
            let images = images.clone();
            let record = records[idx].clone();
            tasks.spawn(async move {
                let _permit = permit;
                (idx, resolve_record(chain, images, record).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            done += 1;
            summary.attempted += 1;
            let (idx, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(error = %e, "resolution task failed");
                    summary.failed_tasks += 1;
                    continue;
                }
            };

            match &outcome {
                Outcome::Resolved(hit) => {
                    tracing::debug!(link = %records[idx].link, resolver = hit.resolver, date = %hit.date, "resolved");
                    *summary.resolved.entry(hit.resolver).or_insert(0) += 1;
                }
                Outcome::Exhausted { fetch_failed } => {
                    tracing::debug!(link = %records[idx].link, "exhausted");
                    summary.exhausted += 1;
                    if *fetch_failed {
                        summary.fetch_failures += 1;
                    }
                }
            }
            apply_outcome(&mut records[idx], &outcome);
            progress.report(ProgressEvent::Resolving { n: done, total });
        }

        checkpoint(records).context("Failed to save checkpoint")?;
        summary.checkpoints += 1;
        progress.report(ProgressEvent::Checkpoint { n: done, total });
    }

    summary.remaining = pending_indices(records, opts.scope).len();
    progress.report(ProgressEvent::Done {
        resolved: summary.resolved_total() as u64,
        exhausted: summary.exhausted as u64,
    });
    Ok(summary)
}

/// Parse the configured report and merge it into `prior`.
fn extract_and_merge(
    config: &Config,
    prior: Vec<LossRecord>,
    progress: &dyn ProgressReporter,
) -> Result<(Extraction, Vec<LossRecord>, MergeSummary)> {
    let extraction = parse_report_file(&config.report.path, &config.report.start_category)?;
    progress.report(ProgressEvent::Extracted {
        records: extraction.records.len() as u64,
        categories: extraction.categories as u64,
    });

    let (merged, summary) = merge(prior, extraction.records.clone());
    progress.report(ProgressEvent::Merged {
        total: summary.total as u64,
        added: summary.added as u64,
    });
    Ok((extraction, merged, summary))
}

pub async fn run_extract(
    config: &Config,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let prior = store::load_records(&config.store.path)?;
    let (extraction, merged, summary) = extract_and_merge(config, prior, progress)?;

    if dry_run {
        println!("extract (dry-run)");
        print_extraction(&extraction);
        println!("  new links: {}", summary.added);
        return Ok(());
    }

    store::save_records(&config.store.path, &merged)?;

    println!("extract");
    print_extraction(&extraction);
    print_merge(&summary);
    println!("  store: {}", config.store.path.display());
    println!("ok");
    Ok(())
}

pub async fn run_resolve(
    config: &Config,
    retry_exhausted: bool,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let mut records = store::load_records(&config.store.path)?;
    resolve_and_report(config, &mut records, retry_exhausted, limit, progress).await
}

pub async fn run_pipeline(
    config: &Config,
    retry_exhausted: bool,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let prior = store::load_records(&config.store.path)?;
    let (extraction, mut records, summary) = extract_and_merge(config, prior, progress)?;
    store::save_records(&config.store.path, &records)?;

    println!("extract");
    print_extraction(&extraction);
    print_merge(&summary);

    resolve_and_report(config, &mut records, retry_exhausted, limit, progress).await
}

async fn resolve_and_report(
    config: &Config,
    records: &mut [LossRecord],
    retry_exhausted: bool,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let opts = ResolveOptions::from_config(config, retry_exhausted, limit);
    let chain = Arc::new(ResolverChain::from_config(config)?);
    let images: Arc<dyn ImageProvider> = Arc::new(HttpImageProvider::new(&config.fetch)?);
    let store_path = config.store.path.clone();

    let summary = resolve_records(records, chain, images, opts, progress, |rows| {
        store::save_records(&store_path, rows)
    })
    .await?;

    let missing = records.iter().filter(|r| r.date.is_unresolved()).count();

    println!("resolve");
    println!("  scope: {}", opts.scope.label());
    println!("  eligible: {}", summary.eligible);
    println!("  attempted: {}", summary.attempted);
    for (name, count) in &summary.resolved {
        println!("  resolved by {}: {}", name, count);
    }
    println!("  exhausted: {}", summary.exhausted);
    println!("  fetch failures: {}", summary.fetch_failures);
    if summary.failed_tasks > 0 {
        println!("  failed tasks: {}", summary.failed_tasks);
    }
    println!("  remaining: {}", summary.remaining);
    println!("  missing dates: {}", missing);
    println!("  checkpoints: {}", summary.checkpoints);
    println!("ok");
    Ok(())
}

fn print_extraction(extraction: &Extraction) {
    println!("  categories: {}", extraction.categories);
    println!("  records extracted: {}", extraction.records.len());
    println!("  items skipped: {}", extraction.items_skipped);
}

fn print_merge(summary: &MergeSummary) {
    println!("  store rows: {}", summary.total);
    println!("  new links: {}", summary.added);
    println!("  retained: {}", summary.retained);
    for (name, count) in &summary.step_changes {
        println!("  {}: {}", name, count);
    }
}
