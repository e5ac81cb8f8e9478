//! Date recovery from text rendered inside the evidence image.
//!
//! Two strategies share the same contract (earliest valid date in the
//! strategy's search order, or nothing):
//!
//! - **Sweep**: for each (region, binarization) pair of
//!   [`sweep_plan`](crate::ocr::sweep_plan), recognize the processed crop
//!   and scan it for an explicit date.
//! - **Reconstruct**: recognize the full image once, scan every line for an
//!   explicit date, then fall back to rebuilding one around bare year tokens.

use image::GrayImage;
use std::sync::Arc;

use crate::models::{EventDate, LinkType, YearBand};
use crate::ocr::{find_date, reconstruct_date, sweep_plan, Region, TextRecognizer};
use crate::resolver::{DateResolver, Evidence, ResolveInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrStrategy {
    Sweep,
    Reconstruct,
}

pub struct OcrResolver {
    recognizer: Arc<dyn TextRecognizer>,
    strategy: OcrStrategy,
    band: YearBand,
}

impl OcrResolver {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, strategy: OcrStrategy, band: YearBand) -> Self {
        Self {
            recognizer,
            strategy,
            band,
        }
    }
}

impl DateResolver for OcrResolver {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn applies_to(&self, link_type: LinkType) -> bool {
        link_type.is_image_host()
    }

    fn evidence(&self) -> Evidence {
        Evidence::Image
    }

    fn resolve(&self, input: &ResolveInput<'_>) -> Option<EventDate> {
        let gray = input.image?.to_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return None;
        }
        let found = match self.strategy {
            OcrStrategy::Sweep => sweep(self.recognizer.as_ref(), &gray, &self.band),
            OcrStrategy::Reconstruct => reconstruct(self.recognizer.as_ref(), &gray, &self.band),
        };
        if found.is_none() {
            tracing::debug!(link = %input.record.link, "no date in image text");
        }
        found
    }
}

/// Region × binarization sweep; the first validating date wins.
pub fn sweep(recognizer: &dyn TextRecognizer, gray: &GrayImage, band: &YearBand) -> Option<EventDate> {
    let mut cropped: Option<(Region, GrayImage)> = None;

    for (region, method) in sweep_plan() {
        if cropped.as_ref().map(|(r, _)| *r) != Some(region) {
            cropped = Some((region, region.crop(gray)));
        }
        let Some((_, crop)) = cropped.as_ref() else {
            continue;
        };

        match recognizer.recognize(&method.apply(crop)) {
            Ok(text) => {
                if let Some(date) = find_date(&text, band) {
                    tracing::debug!(?region, ?method, date = %date, "date found");
                    return Some(date);
                }
            }
            Err(e) => tracing::debug!(?region, ?method, error = %e, "recognition failed"),
        }
    }
    None
}

/// Whole-image recognition, explicit dates first, reconstruction second.
pub fn reconstruct(
    recognizer: &dyn TextRecognizer,
    gray: &GrayImage,
    band: &YearBand,
) -> Option<EventDate> {
    let text = match recognizer.recognize(gray) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, "recognition failed");
            return None;
        }
    };
    let fragments: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    fragments
        .iter()
        .find_map(|f| find_date(f, band))
        .or_else(|| fragments.iter().find_map(|f| reconstruct_date(f, band)))
}
