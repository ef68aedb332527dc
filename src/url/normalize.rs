use crate::config::{ScanConfig, DEFAULT_EXCLUDED_EXTENSIONS, DEFAULT_TRACKING_PARAMS};
use crate::{UrlError, UrlResult};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use url::form_urlencoded;
use url::Url;

/// URLs longer than this are never crawled
pub const MAX_URL_LENGTH: usize = 2000;

static DEFAULT_NORMALIZER: Lazy<Normalizer> = Lazy::new(Normalizer::default);

/// URL canonicalization and validity rules for one scan
///
/// `normalize` is a pure function of its input and the two configured sets,
/// so the frontier can deduplicate on its output.
#[derive(Debug, Clone)]
pub struct Normalizer {
    tracking_params: HashSet<String>,
    excluded_extensions: HashSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_TRACKING_PARAMS.iter().copied(),
            DEFAULT_EXCLUDED_EXTENSIONS.iter().copied(),
        )
    }
}

impl Normalizer {
    pub fn new<'a>(
        tracking_params: impl IntoIterator<Item = &'a str>,
        excluded_extensions: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            tracking_params: tracking_params
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            excluded_extensions: excluded_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.tracking_params.iter().map(String::as_str),
            config.excluded_extensions.iter().map(String::as_str),
        )
    }

    /// Normalizes a URL into its canonical string form
    ///
    /// # Normalization Steps
    ///
    /// 1. Parse the URL; reject if malformed or not http(s)
    /// 2. Lowercase scheme and host, drop default ports
    /// 3. Normalize path:
    ///    - Decode percent-encoded unreserved characters, uppercase other escapes
    ///    - Remove dot segments and empty segments
    ///    - Remove trailing slash (except for root /)
    /// 4. Remove fragment
    /// 5. Remove tracking query parameters
    /// 6. Sort remaining query parameters by key, then value
    /// 7. Remove empty query string
    ///
    /// # Examples
    ///
    /// ```
    /// use webrecon::url::Normalizer;
    ///
    /// let n = Normalizer::default();
    /// let url = n.normalize("HTTP://Example.COM:80/a/./b/?utm_source=x&b=2&a=1#top").unwrap();
    /// assert_eq!(url, "http://example.com/a/b?a=1&b=2");
    /// ```
    pub fn normalize(&self, raw: &str) -> UrlResult<String> {
        let mut url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlError::InvalidScheme(url.scheme().to_string()));
        }

        // the parser already lowercases special-scheme hosts and drops default ports
        if url.host_str().is_none() {
            return Err(UrlError::MissingDomain);
        }

        let normalized_path = normalize_path(url.path());
        url.set_path(&normalized_path);

        url.set_fragment(None);

        if url.query().is_some() {
            let params = self.filter_and_sort_query_params(&url);
            if params.is_empty() {
                url.set_query(None);
            } else {
                let query = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    .finish();
                url.set_query(Some(&query));
            }
        }

        Ok(url.to_string())
    }

    /// Checks whether a URL is worth fetching at all
    ///
    /// Rejects non-http(s) schemes (`javascript:`, `mailto:`, `data:`, `tel:`,
    /// `ftp:` ...), URLs over [`MAX_URL_LENGTH`] characters, URLs without a
    /// host, and paths ending in an excluded binary/media extension.
    pub fn is_valid(&self, raw: &str) -> bool {
        if raw.len() > MAX_URL_LENGTH {
            return false;
        }

        let url = match Url::parse(raw.trim()) {
            Ok(url) => url,
            Err(_) => return false,
        };

        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        if url.host_str().is_none() {
            return false;
        }

        match path_extension(url.path()) {
            Some(ext) => !self.excluded_extensions.contains(&ext),
            None => true,
        }
    }

    /// Returns true when `key` is a tracking parameter
    fn is_tracking_param(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        key.starts_with("utm_") || self.tracking_params.contains(&key)
    }

    /// Filters out tracking parameters and sorts the rest
    fn filter_and_sort_query_params(&self, url: &Url) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !key.is_empty() && !self.is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        params.sort();
        params
    }
}

/// Normalizes a URL with the default tracking-parameter set
///
/// # Examples
///
/// ```
/// use webrecon::url::normalize_url;
///
/// assert_eq!(
///     normalize_url("https://x.com/p?utm_source=a&id=1").unwrap(),
///     normalize_url("https://x.com/p?id=1").unwrap()
/// );
/// assert!(normalize_url("mailto:a@b.com").is_err());
/// ```
pub fn normalize_url(raw: &str) -> UrlResult<String> {
    DEFAULT_NORMALIZER.normalize(raw)
}

/// Validity check with the default extension denylist
///
/// # Examples
///
/// ```
/// use webrecon::url::is_valid_url;
///
/// assert!(is_valid_url("https://example.com/docs"));
/// assert!(!is_valid_url("javascript:void(0)"));
/// assert!(!is_valid_url("https://example.com/file.pdf"));
/// ```
pub fn is_valid_url(raw: &str) -> bool {
    DEFAULT_NORMALIZER.is_valid(raw)
}

/// Lowercased extension of the last path segment, if it has one
fn path_extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Normalizes a URL path by re-encoding segments and removing dot segments
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<String> = Vec::new();

    for raw_segment in path.split('/') {
        let segment = normalize_percent_encoding(raw_segment);
        match segment.as_str() {
            // Skip empty segments (from multiple slashes) and current directory markers
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Decodes escapes of unreserved characters and uppercases the remaining ones
///
/// Reserved and non-ASCII bytes stay escaped, so the result never changes
/// the meaning of the segment.
fn normalize_percent_encoding(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                let value = hi << 4 | lo;
                if is_unreserved(value) {
                    out.push(value);
                } else {
                    out.push(b'%');
                    out.push(bytes[i + 1].to_ascii_uppercase());
                    out.push(bytes[i + 2].to_ascii_uppercase());
                }
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}
