//! Image preprocessing and text recognition for on-image dates.
//!
//! Provides:
//! - [`Region`] - the six sub-images searched for a date stamp
//! - [`Binarization`] - the four thresholding variants applied per region
//! - [`sweep_plan`] - the flat, priority-ordered (region, method) list
//! - [`TextRecognizer`] - the recognition seam, with [`TesseractCli`]
//!   shelling out to the `tesseract` binary
//! - [`find_date`] / [`reconstruct_date`] - text-level date scanning

use image::{imageops, DynamicImage, GrayImage, ImageFormat, Luma};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::models::{EventDate, YearBand};

/// Percentage of each side that counts as an edge strip or corner.
const EDGE_PERCENT: u64 = 15;

/// Gaussian sigma matching an 11x11 adaptive-threshold window.
const ADAPTIVE_SIGMA: f32 = 2.0;
/// Constant subtracted from the local mean.
const ADAPTIVE_C: i16 = 2;

/// How many characters before a year token the reconstruction looks at.
const RECONSTRUCT_WINDOW: usize = 10;

static EXPLICIT_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:(\d{1,2})[-/.](\d{1,2})[-/.](\d{2,4})|(\d{4})[-/.](\d{1,2})[-/.](\d{1,2}))\b",
    )
    .expect("static regex")
});
static YEAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"20\d{2}").expect("static regex"));

// ============ Regions ============

/// Sub-image searched for a date, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    TopStrip,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Full,
}

impl Region {
    pub const ALL: [Region; 6] = [
        Region::TopStrip,
        Region::TopLeft,
        Region::TopRight,
        Region::BottomLeft,
        Region::BottomRight,
        Region::Full,
    ];

    /// `(x, y, width, height)` of this region inside a `width` x `height` image.
    pub fn bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let pct = |side: u32, p: u64| (side as u64 * p / 100) as u32;
        let edge_w = pct(width, EDGE_PERCENT).max(1).min(width);
        let edge_h = pct(height, EDGE_PERCENT).max(1).min(height);
        let far_x = pct(width, 100 - EDGE_PERCENT).min(width.saturating_sub(1));
        let far_y = pct(height, 100 - EDGE_PERCENT).min(height.saturating_sub(1));

        match self {
            Region::TopStrip => (0, 0, width, edge_h),
            Region::TopLeft => (0, 0, edge_w, edge_h),
            Region::TopRight => (far_x, 0, width - far_x, edge_h),
            Region::BottomLeft => (0, far_y, edge_w, height - far_y),
            Region::BottomRight => (far_x, far_y, width - far_x, height - far_y),
            Region::Full => (0, 0, width, height),
        }
    }

    pub fn crop(&self, image: &GrayImage) -> GrayImage {
        let (x, y, w, h) = self.bounds(image.width(), image.height());
        imageops::crop_imm(image, x, y, w, h).to_image()
    }
}

// ============ Binarization ============

/// Thresholding variant applied before recognition, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binarization {
    AdaptiveInverted,
    Adaptive,
    Otsu,
    OtsuInverted,
}

impl Binarization {
    pub const ALL: [Binarization; 4] = [
        Binarization::AdaptiveInverted,
        Binarization::Adaptive,
        Binarization::Otsu,
        Binarization::OtsuInverted,
    ];

    pub fn apply(&self, gray: &GrayImage) -> GrayImage {
        match self {
            Binarization::Adaptive => adaptive_threshold(gray, false),
            Binarization::AdaptiveInverted => adaptive_threshold(gray, true),
            Binarization::Otsu => global_threshold(gray, otsu_level(gray), false),
            Binarization::OtsuInverted => global_threshold(gray, otsu_level(gray), true),
        }
    }
}

/// Every (region, method) pair in search order: regions outer, methods inner.
pub fn sweep_plan() -> Vec<(Region, Binarization)> {
    Region::ALL
        .iter()
        .flat_map(|r| Binarization::ALL.iter().map(move |m| (*r, *m)))
        .collect()
}

/// Gaussian-weighted local mean threshold.
fn adaptive_threshold(gray: &GrayImage, invert: bool) -> GrayImage {
    let local_mean = imageops::blur(gray, ADAPTIVE_SIGMA);
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, px) in gray.enumerate_pixels() {
        let threshold = local_mean.get_pixel(x, y)[0] as i16 - ADAPTIVE_C;
        let above = px[0] as i16 > threshold;
        out.put_pixel(x, y, Luma([binary(above, invert)]));
    }
    out
}

fn global_threshold(gray: &GrayImage, level: u8, invert: bool) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, px) in gray.enumerate_pixels() {
        out.put_pixel(x, y, Luma([binary(px[0] > level, invert)]));
    }
    out
}

fn binary(above: bool, invert: bool) -> u8 {
    if above != invert {
        255
    } else {
        0
    }
}

/// Otsu's method: the level maximizing between-class variance.
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for px in gray.pixels() {
        histogram[px[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &n)| i as f64 * n as f64)
        .sum();

    let mut best_level = 0u8;
    let mut best_variance = -1.0f64;
    let mut background = 0u64;
    let mut background_sum = 0.0f64;

    for (level, &count) in histogram.iter().enumerate() {
        background += count;
        if background == 0 {
            continue;
        }
        let foreground = total - background;
        if foreground == 0 {
            break;
        }
        background_sum += level as f64 * count as f64;
        let mean_bg = background_sum / background as f64;
        let mean_fg = (weighted_total - background_sum) / foreground as f64;
        let variance = background as f64 * foreground as f64 * (mean_bg - mean_fg).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }
    best_level
}

// ============ Recognition ============

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("failed to run recognizer: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode image for recognizer: {0}")]
    Encode(#[from] image::ImageError),
    #[error("recognizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Turns a (preprocessed) grayscale image into text.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError>;
}

/// Recognizer backed by the `tesseract` command-line tool.
///
/// The image is piped in as PNG and the text read back from stdout.
pub struct TesseractCli {
    binary: PathBuf,
    language: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(image.clone())
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ============ Date scanning ============

/// First explicit `dd-mm-yy(yy)` or `yyyy-mm-dd` date in `text` that
/// survives calendar validation. `-`, `/` and `.` are all separators.
pub fn find_date(text: &str, band: &YearBand) -> Option<EventDate> {
    EXPLICIT_DATE.captures_iter(text).find_map(|caps| {
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        if let (Some(day), Some(month), Some(year)) = (num(1), num(2), caps.get(3)) {
            let year = expand_year(year.as_str())?;
            EventDate::from_ymd(year, month, day, band)
        } else {
            let year = caps.get(4)?.as_str().parse::<i32>().ok()?;
            EventDate::from_ymd(year, num(5)?, num(6)?, band)
        }
    })
}

/// Two-digit years are taken as 20yy.
fn expand_year(raw: &str) -> Option<i32> {
    let year = raw.parse::<i32>().ok()?;
    Some(if raw.len() == 2 { 2000 + year } else { year })
}

/// Rebuild a date around a bare `20xx` year token whose day and month were
/// recognized without (or with broken) separators, e.g. `1406 2022` or
/// `14.6,2022`.
pub fn reconstruct_date(fragment: &str, band: &YearBand) -> Option<EventDate> {
    for token in YEAR_TOKEN.find_iter(fragment) {
        if fragment[token.end()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
        {
            continue;
        }
        let Ok(year) = token.as_str().parse::<i32>() else {
            continue;
        };

        let before = &fragment[..token.start()];
        let window: String = {
            let chars: Vec<char> = before.chars().collect();
            chars[chars.len().saturating_sub(RECONSTRUCT_WINDOW)..]
                .iter()
                .collect()
        };

        let found = day_month_candidates(&window)
            .into_iter()
            .find_map(|(day, month)| EventDate::from_ymd(year, month, day, band));
        if found.is_some() {
            return found;
        }
    }
    None
}

/// `(day, month)` guesses for the text preceding a year, most likely first.
fn day_month_candidates(window: &str) -> Vec<(u32, u32)> {
    let digits: String = window.chars().filter(|c| c.is_ascii_digit()).collect();
    let tail = &digits[digits.len().saturating_sub(4)..];
    let mut out = Vec::new();
    let mut push = |day: &str, month: &str| {
        if let (Ok(d), Ok(m)) = (day.parse::<u32>(), month.parse::<u32>()) {
            if !out.contains(&(d, m)) {
                out.push((d, m));
            }
        }
    };

    // last two digits are the month
    if tail.len() >= 3 {
        push(&tail[..tail.len() - 2], &tail[tail.len() - 2..]);
    }
    // first digit is the day
    if (2..=3).contains(&tail.len()) {
        push(&tail[..1], &tail[1..]);
    }
    // first two digits are the day, single-digit month
    if tail.len() == 3 {
        push(&tail[..2], &tail[2..]);
    }
    // separator-delimited groups
    let groups: Vec<&str> = window
        .split(|c: char| !c.is_ascii_digit())
        .filter(|g| !g.is_empty())
        .collect();
    if groups.len() >= 2 {
        push(groups[groups.len() - 2], groups[groups.len() - 1]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band() -> YearBand {
        YearBand::default()
    }

    fn date(s: Option<EventDate>) -> Option<String> {
        s.map(|d| d.as_str().to_string())
    }

    #[test]
    fn test_sweep_plan_order() {
        let plan = sweep_plan();
        assert_eq!(plan.len(), 24);
        assert_eq!(plan[0], (Region::TopStrip, Binarization::AdaptiveInverted));
        assert_eq!(plan[1], (Region::TopStrip, Binarization::Adaptive));
        assert_eq!(plan[3], (Region::TopStrip, Binarization::OtsuInverted));
        assert_eq!(plan[4], (Region::TopLeft, Binarization::AdaptiveInverted));
        assert_eq!(plan[23], (Region::Full, Binarization::OtsuInverted));
    }

    #[test]
    fn test_region_bounds() {
        assert_eq!(Region::TopStrip.bounds(200, 100), (0, 0, 200, 15));
        assert_eq!(Region::TopLeft.bounds(200, 100), (0, 0, 30, 15));
        assert_eq!(Region::TopRight.bounds(200, 100), (170, 0, 30, 15));
        assert_eq!(Region::BottomLeft.bounds(200, 100), (0, 85, 30, 15));
        assert_eq!(Region::BottomRight.bounds(200, 100), (170, 85, 30, 15));
        assert_eq!(Region::Full.bounds(200, 100), (0, 0, 200, 100));
    }

    #[test]
    fn test_region_bounds_never_empty() {
        for region in Region::ALL {
            let (x, y, w, h) = region.bounds(3, 2);
            assert!(w >= 1 && h >= 1, "{:?}", region);
            assert!(x + w <= 3 && y + h <= 2, "{:?}", region);
        }
    }

    #[test]
    fn test_otsu_splits_bimodal_image() {
        let mut img = GrayImage::new(10, 1);
        for x in 0..10 {
            img.put_pixel(x, 0, Luma([if x < 5 { 20 } else { 220 }]));
        }
        let level = otsu_level(&img);
        assert!((20..220).contains(&level));

        let bin = Binarization::Otsu.apply(&img);
        assert_eq!(bin.get_pixel(0, 0)[0], 0);
        assert_eq!(bin.get_pixel(9, 0)[0], 255);
        let inv = Binarization::OtsuInverted.apply(&img);
        assert_eq!(inv.get_pixel(0, 0)[0], 255);
        assert_eq!(inv.get_pixel(9, 0)[0], 0);
    }

    #[test]
    fn test_adaptive_output_is_binary() {
        let mut img = GrayImage::new(16, 16);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Luma([((x * 13 + y * 7) % 256) as u8]);
        }
        for method in [Binarization::Adaptive, Binarization::AdaptiveInverted] {
            let out = method.apply(&img);
            assert_eq!(out.dimensions(), img.dimensions());
            assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        }
    }

    #[test]
    fn test_find_date_separators() {
        assert_eq!(date(find_date("14-06-2022", &band())).as_deref(), Some("14-06-2022"));
        assert_eq!(date(find_date("at 24/02/2022 05:00", &band())).as_deref(), Some("24-02-2022"));
        assert_eq!(date(find_date("3.7.23", &band())).as_deref(), Some("03-07-2023"));
        assert_eq!(date(find_date("2023/07/14", &band())).as_deref(), Some("14-07-2023"));
    }

    #[test]
    fn test_find_date_skips_invalid_candidates() {
        let text = "serial 31-02-2023 then 32-01-2023 then 05-01-2021 finally 06-01-2024";
        assert_eq!(date(find_date(text, &band())).as_deref(), Some("06-01-2024"));
        assert_eq!(find_date("13/13/2023", &band()), None);
        assert_eq!(find_date("no digits here", &band()), None);
    }

    #[test]
    fn test_reconstruct_glued_digits() {
        assert_eq!(date(reconstruct_date("1406 2022", &band())).as_deref(), Some("14-06-2022"));
        assert_eq!(date(reconstruct_date("x 46 2023", &band())).as_deref(), Some("04-06-2023"));
        assert_eq!(date(reconstruct_date("146 2022", &band())).as_deref(), Some("14-06-2022"));
        assert_eq!(day_month_candidates("146 "), vec![(1, 46), (14, 6)]);
        assert_eq!(date(reconstruct_date("14,6,2022", &band())).as_deref(), Some("14-06-2022"));
    }

    #[test]
    fn test_reconstruct_ignores_long_numbers_and_bad_years() {
        assert_eq!(reconstruct_date("id 1406 20221", &band()), None);
        assert_eq!(reconstruct_date("1406 2099", &band()), None);
        assert_eq!(reconstruct_date("2022", &band()), None);
    }
}
