//! Date resolution: the resolver trait and the ordered resolver chain.
//!
//! Every strategy implements [`DateResolver`] with one signature (record
//! plus optionally fetched evidence in, validated date out). A
//! [`ResolverChain`] evaluates them left to right and stops at the first
//! hit. Cheap link-only resolvers run first; an image is fetched only when
//! they all miss and an image resolver applies to the link type.
//!
//! ```text
//! record ──▶ [filename] ──▶ [snowflake] ──miss──▶ fetch image ──▶ [ocr]
//!              hit ▼           hit ▼                                hit ▼
//!             Resolved        Resolved                            Resolved
//!                                          anything else ──▶ Exhausted
//! ```

use anyhow::{bail, Result};
use image::DynamicImage;
use std::sync::Arc;

use crate::config::Config;
use crate::fetch::ImageProvider;
use crate::models::{EventDate, LinkType, LossRecord};
use crate::ocr::TesseractCli;
use crate::resolver_filename::FilenameResolver;
use crate::resolver_ocr::{OcrResolver, OcrStrategy};
use crate::resolver_snowflake::SnowflakeResolver;

/// What a resolver reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence {
    /// The link string alone.
    Link,
    /// The decoded image behind the link.
    Image,
}

/// Input to one resolver call.
pub struct ResolveInput<'a> {
    pub record: &'a LossRecord,
    pub image: Option<&'a DynamicImage>,
}

/// A single date resolution strategy.
pub trait DateResolver: Send + Sync {
    /// Short stable name used in counts and logs.
    fn name(&self) -> &'static str;

    fn applies_to(&self, link_type: LinkType) -> bool;

    fn evidence(&self) -> Evidence {
        Evidence::Link
    }

    /// Return a validated date, or `None` on a miss. Never an error.
    fn resolve(&self, input: &ResolveInput<'_>) -> Option<EventDate>;
}

/// A date found by a named resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub date: EventDate,
    pub resolver: &'static str,
}

/// Result of running the whole chain for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Resolved(Hit),
    Exhausted {
        /// The image could not be fetched or decoded.
        fetch_failed: bool,
    },
}

/// Resolvers in priority order.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn DateResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver at the lowest priority.
    pub fn with(mut self, resolver: impl DateResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// The standard chain: filename, snowflake, then OCR when enabled.
    pub fn from_config(config: &Config) -> Result<Self> {
        let band = config.resolve.year_band();
        let mut chain = Self::new()
            .with(FilenameResolver::new(band))
            .with(SnowflakeResolver::new(band));

        if config.ocr.enabled {
            let strategy = match config.ocr.strategy.as_str() {
                "sweep" => OcrStrategy::Sweep,
                "reconstruct" => OcrStrategy::Reconstruct,
                other => bail!("Unknown OCR strategy: '{}'", other),
            };
            let recognizer = TesseractCli::new(&config.ocr.tesseract, &config.ocr.language);
            chain = chain.with(OcrResolver::new(Arc::new(recognizer), strategy, band));
        }

        Ok(chain)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Whether any image resolver applies to `link_type`.
    pub fn wants_image(&self, link_type: LinkType) -> bool {
        self.resolvers
            .iter()
            .any(|r| r.evidence() == Evidence::Image && r.applies_to(link_type))
    }

    /// Run, in order, the applicable resolvers that read `evidence`. Image
    /// resolvers are skipped when no image is supplied.
    pub fn resolve_stage(&self, input: &ResolveInput<'_>, evidence: Evidence) -> Option<Hit> {
        let link_type = input.record.link_type;
        self.resolvers
            .iter()
            .filter(|r| r.evidence() == evidence && r.applies_to(link_type))
            .filter(|r| r.evidence() == Evidence::Link || input.image.is_some())
            .find_map(|r| {
                r.resolve(input).map(|date| Hit {
                    date,
                    resolver: r.name(),
                })
            })
    }
}

/// Resolve one record: link-only resolvers first, then the image stage.
///
/// Fetch and recognition failures degrade to [`Outcome::Exhausted`]; they
/// never abort the caller's batch.
pub async fn resolve_record(
    chain: Arc<ResolverChain>,
    images: Arc<dyn ImageProvider>,
    record: LossRecord,
) -> Outcome {
    let link_hit = chain.resolve_stage(
        &ResolveInput {
            record: &record,
            image: None,
        },
        Evidence::Link,
    );
    if let Some(hit) = link_hit {
        return Outcome::Resolved(hit);
    }

    if !chain.wants_image(record.link_type) {
        return Outcome::Exhausted {
            fetch_failed: false,
        };
    }

    let image = match images.fetch(&record.link).await {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!(link = %record.link, error = %e, "image unavailable");
            return Outcome::Exhausted { fetch_failed: true };
        }
    };

    let link = record.link.clone();
    let joined = tokio::task::spawn_blocking(move || {
        chain.resolve_stage(
            &ResolveInput {
                record: &record,
                image: Some(&image),
            },
            Evidence::Image,
        )
    })
    .await;

    match joined {
        Ok(Some(hit)) => Outcome::Resolved(hit),
        Ok(None) => Outcome::Exhausted {
            fetch_failed: false,
        },
        Err(e) => {
            tracing::warn!(link = %link, error = %e, "image resolution task failed");
            Outcome::Exhausted {
                fetch_failed: false,
            }
        }
    }
}
