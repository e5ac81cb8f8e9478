use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::YearBand;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_report_path")]
    pub path: PathBuf,
    #[serde(default = "default_start_category")]
    pub start_category: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
            start_category: default_start_category(),
        }
    }
}

fn default_report_path() -> PathBuf {
    PathBuf::from("data/oryx.html")
}
fn default_start_category() -> String {
    "Tanks".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/losses.csv")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolveConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Include exhausted rows alongside unresolved ones on every run.
    #[serde(default)]
    pub retry_exhausted: bool,
    #[serde(default = "default_min_year")]
    pub min_year: i32,
    #[serde(default = "default_max_year")]
    pub max_year: i32,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            retry_exhausted: false,
            min_year: default_min_year(),
            max_year: default_max_year(),
        }
    }
}

impl ResolveConfig {
    pub fn year_band(&self) -> YearBand {
        YearBand::new(self.min_year, self.max_year)
    }
}

fn default_batch_size() -> usize {
    10
}
fn default_concurrency() -> usize {
    4
}
fn default_min_year() -> i32 {
    2022
}
fn default_max_year() -> i32 {
    2026
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_enabled")]
    pub enabled: bool,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: default_ocr_enabled(),
            strategy: default_strategy(),
            tesseract: default_tesseract(),
            language: default_language(),
        }
    }
}

fn default_ocr_enabled() -> bool {
    true
}
fn default_strategy() -> String {
    "sweep".to_string()
}
fn default_tesseract() -> String {
    "tesseract".to_string()
}
fn default_language() -> String {
    "eng".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.resolve.batch_size == 0 {
        anyhow::bail!("resolve.batch_size must be > 0");
    }

    if config.resolve.concurrency == 0 {
        anyhow::bail!("resolve.concurrency must be > 0");
    }

    if config.resolve.min_year > config.resolve.max_year {
        anyhow::bail!(
            "resolve.min_year ({}) must not exceed resolve.max_year ({})",
            config.resolve.min_year,
            config.resolve.max_year
        );
    }

    if config.report.start_category.trim().is_empty() {
        anyhow::bail!("report.start_category must not be empty");
    }

    match config.ocr.strategy.as_str() {
        "sweep" | "reconstruct" => {}
        other => anyhow::bail!(
            "Unknown OCR strategy: '{}'. Must be sweep or reconstruct.",
            other
        ),
    }

    Ok(())
}
