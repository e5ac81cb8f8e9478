//! Link classification by evidence host.
//!
//! Only the hostname is inspected. Unparseable links and unknown hosts
//! classify as [`LinkType::Other`]; classification never fails.

use reqwest::Url;

use crate::models::LinkType;

/// Map an evidence URI to its [`LinkType`].
pub fn classify_link(link: &str) -> LinkType {
    let host = match link_host(link) {
        Some(h) => h,
        None => return LinkType::Other,
    };

    if host_matches(&host, "twitter.com") || host_matches(&host, "x.com") {
        LinkType::Twitter
    } else if host_matches(&host, "postimg.cc") {
        LinkType::Postimg
    } else if host_matches(&host, "postlmg.cc") {
        LinkType::Postlmg
    } else if host_matches(&host, "imgur.com") {
        LinkType::Imgur
    } else {
        LinkType::Other
    }
}

/// Lowercased hostname of `link`, tolerating scheme-relative URIs.
pub(crate) fn link_host(link: &str) -> Option<String> {
    let link = link.trim();
    let parsed = if link.starts_with("//") {
        Url::parse(&format!("https:{}", link))
    } else {
        Url::parse(link)
    };
    parsed
        .ok()?
        .host_str()
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
}

/// `host` is `domain` itself or any subdomain of it.
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}
