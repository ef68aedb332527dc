//! HTTP fetch layer
//!
//! This module handles every page request of a scan:
//! - Building the shared HTTP client from the scan configuration
//! - robots.txt checks through a per-origin cache
//! - Body size cap and charset decoding
//! - Error classification (timeouts, connection failures, oversize bodies)
//!
//! HTTP error statuses are not errors here: a 404 or 500 is a valid
//! discovery and comes back as a populated [`FetchResult`].

use crate::config::ScanConfig;
use crate::crawler::parser::extract_title;
use crate::crawler::session::SessionManager;
use crate::robots::{fetch_robots, origin_of, ParsedRobots, RobotsCache};
use crate::url::Normalizer;
use encoding_rs::{Encoding, WINDOWS_1252};
use reqwest::{header, redirect::Policy, Client, Response};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

/// Idle pooled connections kept per host
const POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Bytes inspected for NUL when sniffing binary bodies
const BINARY_SNIFF_LEN: usize = 1024;

/// Per-URL fetch failures
///
/// None of these abort a scan; the engine counts them and moves on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Disallowed by robots.txt: {0}")]
    RobotsDisallowed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Response body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid or uncrawlable URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Everything learned from fetching one URL
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL as requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    /// Content-Length header, or the number of body bytes read
    pub content_length: Option<u64>,
    pub response_time_ms: u64,
    /// Lowercase header names; repeated headers joined with ", "
    pub headers: BTreeMap<String, String>,
    /// Decoded body; None for HEAD requests and undecodable content
    pub body: Option<String>,
    pub title: Option<String>,
}

impl FetchResult {
    /// True when the response declares an HTML content type
    pub fn is_html(&self) -> bool {
        self.content_type.as_deref().map_or(false, |ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml+xml")
        })
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Builds the HTTP client shared by every request of a scan
///
/// The cookie store keeps form-login sessions alive across requests.
pub fn build_http_client(config: &ScanConfig) -> Result<Client, reqwest::Error> {
    let redirect = if config.follow_redirects {
        Policy::limited(MAX_REDIRECTS)
    } else {
        Policy::none()
    };

    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(redirect)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Duration::from_secs(90))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Robots-aware, size-capped page fetcher
pub struct Spider {
    session: Arc<SessionManager>,
    robots: RobotsCache,
    normalizer: Normalizer,
    respect_robots: bool,
    user_agent: String,
    max_body_bytes: usize,
}

impl Spider {
    pub fn new(config: &ScanConfig, session: Arc<SessionManager>) -> Self {
        Self {
            session,
            robots: RobotsCache::new(),
            normalizer: Normalizer::from_config(config),
            respect_robots: config.respect_robots,
            user_agent: config.user_agent.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn client(&self) -> &Client {
        self.session.client()
    }

    /// robots.txt for the URL's origin; allow-all when robots are ignored
    pub async fn robots_for(&self, url: &Url) -> Arc<ParsedRobots> {
        if !self.respect_robots {
            return Arc::new(ParsedRobots::allow_all());
        }

        let origin = origin_of(url);
        let client = self.session.client();
        self.robots
            .get_or_fetch(&origin, || fetch_robots(client, &origin, &self.user_agent))
            .await
    }

    /// `Crawl-delay` declared for the URL's origin, if robots are respected
    pub async fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        if !self.respect_robots {
            return None;
        }
        self.robots_for(url).await.crawl_delay()
    }

    /// Fetches a URL
    ///
    /// # Request Flow
    ///
    /// 1. Reject URLs the normalizer considers uncrawlable
    /// 2. Check robots.txt (if enabled)
    /// 3. Send the GET with session credentials applied
    /// 4. Abort if Content-Length or the streamed body exceeds the size cap
    /// 5. Decode the body (declared charset, then utf-8, windows-1252, lossy)
    /// 6. Extract the page title from HTML
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let parsed = self.admit(url).await?;

        let start = Instant::now();
        let request = self.session.authorize(self.client().get(parsed.as_str()));
        let mut response = request.send().await.map_err(FetchError::from_reqwest)?;

        let mut result = response_metadata(url, &response);

        if let Some(length) = result.content_length {
            if length > self.max_body_bytes as u64 {
                tracing::debug!("{} declares {} bytes, over the cap", url, length);
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
        }

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(FetchError::from_reqwest)? {
            if bytes.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        result.response_time_ms = start.elapsed().as_millis() as u64;
        if result.content_length.is_none() {
            result.content_length = Some(bytes.len() as u64);
        }

        result.body = decode_body(&bytes, result.content_type.as_deref());
        if result.body.is_none() && !bytes.is_empty() {
            tracing::debug!("{}: body undecodable, keeping status and headers only", url);
        }

        if result.is_html() {
            result.title = result.body.as_deref().and_then(extract_title);
        }

        Ok(result)
    }

    /// Lightweight metadata request without a body
    pub async fn head(&self, url: &str) -> Result<FetchResult, FetchError> {
        let parsed = self.admit(url).await?;

        let start = Instant::now();
        let request = self.session.authorize(self.client().head(parsed.as_str()));
        let response = request.send().await.map_err(FetchError::from_reqwest)?;

        let mut result = response_metadata(url, &response);
        result.response_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn admit(&self, url: &str) -> Result<Url, FetchError> {
        if !self.normalizer.is_valid(url) {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        if self.respect_robots && !self.robots_for(&parsed).await.is_allowed(parsed.as_str()) {
            tracing::debug!("URL {} disallowed by robots.txt", url);
            return Err(FetchError::RobotsDisallowed(url.to_string()));
        }

        Ok(parsed)
    }
}

/// Collects status, headers and length from a response
fn response_metadata(url: &str, response: &Response) -> FetchResult {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    let content_length = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    FetchResult {
        url: url.to_string(),
        final_url: response.url().to_string(),
        status_code: response.status().as_u16(),
        content_type: headers.get("content-type").cloned(),
        content_length,
        response_time_ms: 0,
        headers,
        body: None,
        title: None,
    }
}

/// Decodes a response body, or returns None if it looks binary
///
/// A charset declared in Content-Type is tried first, then utf-8, then
/// windows-1252 (the WHATWG decoder for latin1 labels too), then a lossy
/// utf-8 pass.
fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Option<String> {
    if bytes.is_empty() {
        return Some(String::new());
    }

    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if sniff.contains(&0) {
        return None;
    }

    let declared = content_type
        .and_then(declared_charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()));
    if let Some(encoding) = declared {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return Some(text.into_owned());
        }
        tracing::trace!("body is not valid {}, falling back", encoding.name());
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.to_string());
    }

    Some(
        WINDOWS_1252
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned()),
    )
}

/// `text/html; charset="UTF-8"` becomes `utf-8`
fn declared_charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}
