//! Robots.txt handling
//!
//! Fetching, parsing and caching of robots.txt per origin.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::{ParsedRobots, MAX_CRAWL_DELAY};

use url::Url;

/// Bytes of robots.txt read per origin; the rest of the file is ignored
pub const MAX_ROBOTS_BYTES: usize = 512 * 1024;

/// `scheme://host[:port]` key used for the robots cache
///
/// # Examples
///
/// ```
/// use url::Url;
/// use webrecon::robots::origin_of;
///
/// let url = Url::parse("https://Example.com:8443/a?b=c").unwrap();
/// assert_eq!(origin_of(&url), "https://example.com:8443");
/// ```
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Fetches and parses `{origin}/robots.txt`
///
/// Any failure (network error, non-2xx status, an HTML error page served in
/// place of robots.txt) yields an allow-all result.
///
/// # Arguments
///
/// * `client` - Shared HTTP client of the scan
/// * `origin` - `scheme://host[:port]`, without a trailing path
/// * `user_agent` - User-Agent whose product token selects the group
///
/// # Returns
///
/// The parsed file, read up to [`MAX_ROBOTS_BYTES`]. Anything past that
/// limit is dropped before parsing.
pub async fn fetch_robots(client: &reqwest::Client, origin: &str, user_agent: &str) -> ParsedRobots {
    let robots_url = format!("{}/robots.txt", origin.trim_end_matches('/'));

    let mut response = match client.get(&robots_url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("robots.txt fetch failed for {}: {}", origin, e);
            return ParsedRobots::allow_all();
        }
    };

    if !response.status().is_success() {
        tracing::debug!(
            "robots.txt for {} returned {}, allowing all",
            origin,
            response.status()
        );
        return ParsedRobots::allow_all();
    }

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false);

    let mut bytes: Vec<u8> = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = MAX_ROBOTS_BYTES - bytes.len();
                if chunk.len() >= room {
                    bytes.extend_from_slice(&chunk[..room]);
                    tracing::debug!(
                        "robots.txt for {} exceeds {} bytes, truncating",
                        origin,
                        MAX_ROBOTS_BYTES
                    );
                    break;
                }
                bytes.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("robots.txt body unreadable for {}: {}", origin, e);
                return ParsedRobots::allow_all();
            }
        }
    }
    let body = String::from_utf8_lossy(&bytes);

    let looks_like_html = body.trim_start().starts_with('<');
    if is_html || looks_like_html {
        tracing::debug!("robots.txt for {} is an HTML page, allowing all", origin);
        return ParsedRobots::allow_all();
    }

    ParsedRobots::from_content(&body, user_agent)
}
