//! Reconciliation and resolution properties, end to end through the library.
//!
//! The image host and the text recognizer are replaced by in-memory fakes,
//! so these tests exercise the real merge engine, resolver chain, batched
//! pipeline, and CSV store without network access or Tesseract.

use async_trait::async_trait;
use image::{DynamicImage, GrayImage};
use loss_ledger::fetch::{FetchError, ImageProvider};
use loss_ledger::merge::{merge, RetryScope};
use loss_ledger::models::{DateState, EventDate, LossRecord, YearBand};
use loss_ledger::ocr::{OcrError, TextRecognizer};
use loss_ledger::pipeline::{resolve_records, ResolveOptions, ResolveSummary};
use loss_ledger::progress::NoProgress;
use loss_ledger::resolver::ResolverChain;
use loss_ledger::resolver_filename::FilenameResolver;
use loss_ledger::resolver_ocr::{OcrResolver, OcrStrategy};
use loss_ledger::resolver_snowflake::SnowflakeResolver;
use loss_ledger::store;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Serves a blank image per known link; its width identifies the link to
/// the recognizer. Unknown links are 404s.
struct FakeImages {
    widths: HashMap<String, u32>,
    calls: AtomicUsize,
    delay: Duration,
}

impl FakeImages {
    fn new(widths: &[(&str, u32)]) -> Self {
        Self {
            widths: widths.iter().map(|(l, w)| (l.to_string(), *w)).collect(),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for FakeImages {
    async fn fetch(&self, link: &str) -> Result<DynamicImage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.widths.get(link) {
            Some(w) => Ok(DynamicImage::new_luma8(*w, 20)),
            None => Err(FetchError::Status {
                status: 404,
                url: link.to_string(),
            }),
        }
    }
}

/// Reads back text keyed by image width.
struct FakeText {
    by_width: HashMap<u32, &'static str>,
}

impl TextRecognizer for FakeText {
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
        Ok(self
            .by_width
            .get(&image.width())
            .copied()
            .unwrap_or_default()
            .to_string())
    }
}

fn chain(texts: &[(u32, &'static str)]) -> Arc<ResolverChain> {
    let band = YearBand::default();
    let recognizer = FakeText {
        by_width: texts.iter().copied().collect(),
    };
    Arc::new(
        ResolverChain::new()
            .with(FilenameResolver::new(band))
            .with(SnowflakeResolver::new(band))
            .with(OcrResolver::new(
                Arc::new(recognizer),
                OcrStrategy::Reconstruct,
                band,
            )),
    )
}

fn opts(scope: RetryScope) -> ResolveOptions {
    ResolveOptions {
        scope,
        limit: None,
        batch_size: 3,
        concurrency: 4,
    }
}

fn rec(link: &str) -> LossRecord {
    LossRecord::new("BMP-2", "Infantry Fighting Vehicles", "destroyed", link)
}

async fn resolve(
    records: &mut [LossRecord],
    chain: Arc<ResolverChain>,
    images: Arc<FakeImages>,
    opts: ResolveOptions,
) -> ResolveSummary {
    resolve_records(records, chain, images, opts, &NoProgress, |_| Ok(()))
        .await
        .unwrap()
}

const DATED_FILE: &str = "https://i.postimg.cc/Zq/1002-bmp2-destr-18-11-24.jpg";
const TWEET: &str = "https://twitter.com/someone/status/1533130637393416192";
const IMGUR: &str = "https://imgur.com/gallery/AbCdE";
const GONE: &str = "https://i.postimg.cc/Yy/photo.jpg";
const OTHER: &str = "https://t.me/channel/123";

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_each_evidence_source_in_one_run() {
    let images = Arc::new(FakeImages::new(&[(IMGUR, 64)]));
    let mut records = vec![rec(DATED_FILE), rec(TWEET), rec(IMGUR), rec(GONE), rec(OTHER)];

    let summary = resolve(
        &mut records,
        chain(&[(64, "Bakhmut direction\nfilmed 12.07.2023")]),
        images.clone(),
        opts(RetryScope::Unresolved),
    )
    .await;

    let dates: Vec<&str> = records.iter().map(|r| r.date.as_cell()).collect();
    assert_eq!(
        dates,
        vec!["18-11-2024", "04-06-2022", "12-07-2023", "NO_DATE_FOUND", "NO_DATE_FOUND"]
    );
    assert_eq!(summary.resolved["filename"], 1);
    assert_eq!(summary.resolved["snowflake"], 1);
    assert_eq!(summary.resolved["ocr"], 1);
    assert_eq!(summary.exhausted, 2);
    assert_eq!(summary.fetch_failures, 1);
    // Only the two image-host rows that missed on their link were fetched.
    assert_eq!(images.calls(), 2);
}

#[tokio::test]
async fn test_manual_lock_is_never_overwritten() {
    let images = Arc::new(FakeImages::new(&[(IMGUR, 64)]));
    let texts = [(64, "01-01-2024")];

    let mut locked_empty = rec(IMGUR);
    locked_empty.manually_changed = true;
    let mut locked_exhausted = rec(TWEET);
    locked_exhausted.manually_changed = true;
    locked_exhausted.date = DateState::Exhausted;
    let mut locked_dated = rec(DATED_FILE);
    locked_dated.manually_changed = true;
    locked_dated.date = DateState::Resolved(EventDate::parse_stored("30-06-2023").unwrap());

    let before = vec![locked_empty, locked_exhausted, locked_dated];
    let mut records = before.clone();

    for scope in [RetryScope::Unresolved, RetryScope::Exhausted] {
        let summary = resolve(&mut records, chain(&texts), images.clone(), opts(scope)).await;
        assert_eq!(summary.attempted, 0);
    }
    assert_eq!(records, before);
    assert_eq!(images.calls(), 0);

    // A fresh extraction of the same links does not unlock or clear them.
    let (merged, _) = merge(records.clone(), vec![rec(IMGUR), rec(TWEET), rec(DATED_FILE)]);
    assert_eq!(merged, before);
}

#[tokio::test]
async fn test_checkpoints_always_leave_a_loadable_store() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("losses.csv");

    let links: Vec<String> = (0..10)
        .map(|i| format!("https://i.postimg.cc/k{}/photo.jpg", i))
        .collect();
    let widths: Vec<(&str, u32)> = links
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), 100 + i as u32))
        .collect();
    let mut images = FakeImages::new(&widths);
    images.delay = Duration::from_millis(5);
    let images = Arc::new(images);

    let mut records: Vec<LossRecord> = links.iter().map(|l| rec(l)).collect();
    // Even widths carry a date, odd ones do not.
    let texts: Vec<(u32, &'static str)> = (0..10)
        .filter(|i| i % 2 == 0)
        .map(|i| (100 + i as u32, "02.03.2023"))
        .collect();

    let mut snapshots = Vec::new();
    let summary = resolve_records(
        &mut records,
        chain(&texts),
        images,
        opts(RetryScope::Unresolved),
        &NoProgress,
        |rows| {
            store::save_records(&path, rows)?;
            let back = store::load_records(&path)?;
            assert_eq!(back, rows);
            snapshots.push(back.iter().filter(|r| !r.date.is_unresolved()).count());
            Ok(())
        },
    )
    .await
    .unwrap();

    assert_eq!(snapshots, vec![3, 6, 9, 10]);
    assert_eq!(summary.resolved["ocr"], 5);
    assert_eq!(summary.exhausted, 5);
    assert_eq!(store::load_records(&path).unwrap(), records);
}

#[tokio::test]
async fn test_interrupted_run_resumes_without_loss_or_duplicates() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("losses.csv");
    let images = Arc::new(FakeImages::new(&[(IMGUR, 64)]));
    let texts = [(64, "14-06-2022")];
    let extraction = vec![rec(DATED_FILE), rec(DATED_FILE), rec(TWEET), rec(IMGUR), rec(OTHER)];

    // First run stops after two attempts.
    let (mut records, _) = merge(store::load_records(&path).unwrap(), extraction.clone());
    let mut partial = opts(RetryScope::Unresolved);
    partial.limit = Some(2);
    resolve(&mut records, chain(&texts), images.clone(), partial).await;
    store::save_records(&path, &records).unwrap();
    let after_first = store::load_records(&path).unwrap();

    // Second run re-extracts the same report and finishes.
    let (mut records, summary) = merge(after_first.clone(), extraction);
    assert_eq!(summary.added, 0);
    resolve(&mut records, chain(&texts), images, opts(RetryScope::Unresolved)).await;

    let links: HashSet<&str> = records.iter().map(|r| r.link.as_str()).collect();
    assert_eq!(links.len(), records.len());
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| !r.date.is_unresolved()));
    for (first, last) in after_first.iter().zip(&records) {
        if first.date.resolved().is_some() {
            assert_eq!(first.date, last.date);
        }
    }
    assert_eq!(records[2].date.as_cell(), "14-06-2022");
}

#[tokio::test]
async fn test_retry_scope_reaches_exhausted_rows_only_on_request() {
    let mut records = vec![rec(GONE), rec(IMGUR)];
    let texts = [(64, "20-08-2023"), (80, "21-08-2023")];

    // Nothing reachable yet.
    let offline = Arc::new(FakeImages::new(&[]));
    resolve(&mut records, chain(&texts), offline, opts(RetryScope::Unresolved)).await;
    assert!(records.iter().all(|r| r.date.is_exhausted()));

    // Evidence comes back online; a normal run leaves exhausted rows alone.
    let online = Arc::new(FakeImages::new(&[(IMGUR, 64), (GONE, 80)]));
    let summary = resolve(&mut records, chain(&texts), online.clone(), opts(RetryScope::Unresolved)).await;
    assert_eq!(summary.attempted, 0);
    assert_eq!(online.calls(), 0);

    let summary = resolve(&mut records, chain(&texts), online.clone(), opts(RetryScope::Exhausted)).await;
    assert_eq!(summary.attempted, 2);
    assert_eq!(records[0].date.as_cell(), "21-08-2023");
    assert_eq!(records[1].date.as_cell(), "20-08-2023");
}
