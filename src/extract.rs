//! Report extraction: HTML snapshot → undated [`LossRecord`]s.
//!
//! The report is a flat run of `<h3>` category headings, each followed by
//! sibling lists whose `<li>` items read like
//! `2 T-54-3M: <a href="...">(1, destroyed)</a> <a href="...">(2, captured)</a>`.
//!
//! A single linear pass over the headings is driven by [`ScanState`]:
//! headings are skipped until one starts with the requested category, then
//! every heading is collected until one no longer carries a
//! `(<digit>...` totals marker, which means the scan ran past the loss
//! report into unrelated page content.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;

use crate::models::LossRecord;

static H3: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").expect("static selector"));
static LI: Lazy<Selector> = Lazy::new(|| Selector::parse("li").expect("static selector"));
static A: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("static selector"));

static CATEGORY_TOTALS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\d").expect("static regex"));
static EQUIPMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d*\s*(.*?):").expect("static regex"));
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));
static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\s*,?\s*").expect("static regex"));

/// Heading scan state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Looking for the starting category heading.
    Seeking,
    /// Inside the loss report; each heading is a category.
    Collecting,
}

/// What to do with one heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingAction {
    Skip,
    Collect,
    Stop,
}

impl ScanState {
    /// Advance on one heading's text.
    pub fn step(self, heading: &str, start_category: &str) -> (ScanState, HeadingAction) {
        let state = match self {
            ScanState::Seeking if starts_with_ci(heading, start_category) => ScanState::Collecting,
            other => other,
        };
        match state {
            ScanState::Seeking => (state, HeadingAction::Skip),
            ScanState::Collecting if CATEGORY_TOTALS.is_match(heading) => {
                (state, HeadingAction::Collect)
            }
            ScanState::Collecting => (state, HeadingAction::Stop),
        }
    }
}

/// Result of one extraction pass.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<LossRecord>,
    pub categories: usize,
    /// List items dropped because they had no `label:` prefix.
    pub items_skipped: usize,
}

/// Read and parse a report snapshot from disk.
pub fn parse_report_file(path: &Path, start_category: &str) -> Result<Extraction> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report snapshot: {}", path.display()))?;
    Ok(parse_report(&html, start_category))
}

/// Parse a report document starting at `start_category`.
pub fn parse_report(html: &str, start_category: &str) -> Extraction {
    let document = Html::parse_document(html);
    let mut out = Extraction::default();
    let mut state = ScanState::Seeking;

    for heading in document.select(&H3) {
        let text = element_text(&heading);
        let (next, action) = state.step(&text, start_category);
        state = next;
        match action {
            HeadingAction::Skip => continue,
            HeadingAction::Stop => break,
            HeadingAction::Collect => {}
        }

        let category = category_label(&text);
        let naval = is_naval(&category);
        out.categories += 1;

        for li in category_items(heading) {
            let links: Vec<(String, String)> = li
                .select(&A)
                .filter_map(|a| {
                    let href = a.value().attr("href")?.trim();
                    if href.is_empty() {
                        return None;
                    }
                    Some((href.to_string(), a.text().map(str::trim).collect::<String>()))
                })
                .collect();

            match parse_item(&element_text(&li), &links, &category, naval) {
                Some(mut records) => out.records.append(&mut records),
                None => out.items_skipped += 1,
            }
        }
    }

    out
}

/// All `<li>` elements between `heading` and the next `<h3>` sibling.
fn category_items(heading: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut items = Vec::new();
    for sibling in heading.next_siblings() {
        let Some(el) = ElementRef::wrap(sibling) else {
            continue;
        };
        match el.value().name() {
            "h3" => break,
            "li" => items.push(el),
            _ => {}
        }
        items.extend(el.select(&LI));
    }
    items
}

/// Turn one list item into records, or `None` if it has no `label:` prefix.
///
/// `links` pairs each evidence href with its anchor text, e.g.
/// `("https://i.postimg.cc/x.jpg", "(2, 3, 4 and 5, damaged)")`.
pub fn parse_item(
    item_text: &str,
    links: &[(String, String)],
    category: &str,
    naval: bool,
) -> Option<Vec<LossRecord>> {
    let equipment_type = EQUIPMENT.captures(item_text)?.get(1)?.as_str().trim();

    let mut records = Vec::new();
    for (href, anchor_text) in links {
        let annotation = anchor_text.trim().trim_matches(|c| c == '(' || c == ')');
        let (loss_type, copies) = if naval {
            (naval_loss_type(annotation), 1)
        } else {
            split_annotation(annotation)
        };
        for _ in 0..copies {
            records.push(LossRecord::new(equipment_type, category, loss_type.clone(), href));
        }
    }
    Some(records)
}

/// Split `"2, 3, 4 and 5, damaged"` into `("damaged", 4)`.
///
/// The loss type is whatever follows the last number; every number up to
/// and including it is one record copy.
pub fn split_annotation(annotation: &str) -> (String, usize) {
    let numbers: Vec<_> = NUMBER.find_iter(annotation).collect();
    match numbers.last() {
        Some(last) => {
            let loss_type = annotation[last.end()..].trim_matches(|c| c == ' ' || c == ',');
            (loss_type.to_string(), numbers.len())
        }
        None => (annotation.trim().to_string(), 1),
    }
}

/// Naval annotations lead with a single entry number; the rest (hull
/// numbers included) is the loss type.
pub fn naval_loss_type(annotation: &str) -> String {
    LEADING_NUMBER.replace(annotation, "").trim().to_string()
}

/// `"Tanks (3045, of which destroyed: 2180)"` → `"Tanks"`.
fn category_label(heading: &str) -> String {
    heading.split('(').next().unwrap_or_default().trim().to_string()
}

fn is_naval(category: &str) -> bool {
    starts_with_ci(category, "naval")
}

fn starts_with_ci(text: &str, prefix: &str) -> bool {
    text.trim_start()
        .to_lowercase()
        .starts_with(&prefix.trim().to_lowercase())
}

/// Text content with each text node trimmed and joined by single spaces.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
