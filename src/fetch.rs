//! Evidence image retrieval.
//!
//! Image hosts answer either with the image itself or with an HTML viewer
//! page that points at it. [`HttpImageProvider`] handles both: an `image/*`
//! response is decoded directly, anything else is parsed for the first of
//! `a#download`, `img#main-image`, or an `og:image` meta tag, which is then
//! fetched and decoded.

use async_trait::async_trait;
use image::DynamicImage;
use once_cell::sync::Lazy;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Url;
use scraper::{Html, Selector};
use std::time::Duration;

use crate::config::FetchConfig;

static IMAGE_LINKS: Lazy<[(Selector, &'static str); 3]> = Lazy::new(|| {
    [
        (Selector::parse("a#download").expect("static selector"), "href"),
        (Selector::parse("img#main-image").expect("static selector"), "src"),
        (
            Selector::parse(r#"meta[property="og:image"]"#).expect("static selector"),
            "content",
        ),
    ]
});

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("no image link on page {0}")]
    NoImage(String),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("invalid link: {0}")]
    InvalidLink(String),
}

/// Supplies the decoded image behind an evidence link.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn fetch(&self, link: &str) -> Result<DynamicImage, FetchError>;
}

pub struct HttpImageProvider {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpImageProvider {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    async fn fetch(&self, link: &str) -> Result<DynamicImage, FetchError> {
        let url = Url::parse(link).map_err(|_| FetchError::InvalidLink(link.to_string()))?;
        let response = self.get(&url).await?;

        if is_image_response(&response) {
            let bytes = response.bytes().await?;
            return Ok(image::load_from_memory(&bytes)?);
        }

        let page = response.text().await?;
        let target = image_link_in_page(&page, &url)
            .ok_or_else(|| FetchError::NoImage(link.to_string()))?;
        tracing::debug!(page = %url, image = %target, "following viewer page");

        let bytes = self.get(&target).await?.bytes().await?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

fn is_image_response(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("image"))
}

/// The real image URL on a host's viewer page, resolved against `base`.
pub fn image_link_in_page(page: &str, base: &Url) -> Option<Url> {
    let document = Html::parse_document(page);
    IMAGE_LINKS.iter().find_map(|(selector, attr)| {
        document
            .select(selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .and_then(|v| base.join(v).ok())
    })
}
