use super::domain::{extract_domain, registrable_domain};
use crate::config::ScanConfig;
use url::Url;

/// Checks if a host matches a wildcard pattern
///
/// `*.example.com` matches `example.com` itself and any subdomain of it.
/// Patterns without the `*.` prefix require an exact match.
///
/// # Arguments
///
/// * `pattern` - Host pattern, lowercase, optionally starting with `*.`
/// * `candidate` - Lowercase host to test
///
/// # Examples
///
/// ```
/// use webrecon::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.example.com"));
/// assert!(!matches_wildcard("*.example.com", "notexample.com"));
/// assert!(!matches_wildcard("example.com", "www.example.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Decides whether a discovered URL belongs to the scan
///
/// Exclude patterns veto first. With no scope patterns the URL must share
/// the seed's registrable domain; otherwise any scope pattern may match.
/// A `*.domain` pattern is matched against the host, anything else is a
/// case-insensitive substring of the whole URL.
#[derive(Debug, Clone)]
pub struct ScopeMatcher {
    scope_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
    seed_domain: Option<String>,
}

impl ScopeMatcher {
    /// Builds a matcher for one scan
    ///
    /// # Arguments
    ///
    /// * `scope_patterns` - Substrings or `*.domain` patterns; empty means
    ///   "same registrable domain as `seed`"
    /// * `exclude_patterns` - Patterns that veto a URL even when in scope
    /// * `seed` - The scan target
    pub fn new(scope_patterns: &[String], exclude_patterns: &[String], seed: &Url) -> Self {
        let lower = |patterns: &[String]| -> Vec<String> {
            patterns.iter().map(|p| p.to_lowercase()).collect()
        };

        Self {
            scope_patterns: lower(scope_patterns),
            exclude_patterns: lower(exclude_patterns),
            seed_domain: extract_domain(seed).map(|h| registrable_domain(&h)),
        }
    }

    pub fn from_config(config: &ScanConfig, seed: &Url) -> Self {
        Self::new(&config.scope_patterns, &config.exclude_patterns, seed)
    }

    /// Decides whether a URL may be crawled
    ///
    /// # Returns
    ///
    /// `false` for unparseable or host-less URLs and for URLs matching an
    /// exclude pattern; otherwise `true` when any scope pattern matches (or,
    /// with no scope patterns, when the registrable domain equals the seed's).
    ///
    /// # Examples
    ///
    /// ```
    /// use url::Url;
    /// use webrecon::url::ScopeMatcher;
    ///
    /// let seed = Url::parse("https://www.example.com/").unwrap();
    /// let matcher = ScopeMatcher::new(&[], &["/logout".to_string()], &seed);
    ///
    /// assert!(matcher.in_scope("https://shop.example.com/cart"));
    /// assert!(!matcher.in_scope("https://example.com/logout"));
    /// assert!(!matcher.in_scope("https://other.org/"));
    /// ```
    pub fn in_scope(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
        let host = match extract_domain(&parsed) {
            Some(host) => host,
            None => return false,
        };
        let haystack = url.to_lowercase();

        if self
            .exclude_patterns
            .iter()
            .any(|p| pattern_matches(p, &haystack, &host))
        {
            return false;
        }

        if self.scope_patterns.is_empty() {
            return self.seed_domain.as_deref() == Some(registrable_domain(&host).as_str());
        }

        self.scope_patterns
            .iter()
            .any(|p| pattern_matches(p, &haystack, &host))
    }
}

fn pattern_matches(pattern: &str, url: &str, host: &str) -> bool {
    if pattern.starts_with("*.") {
        matches_wildcard(pattern, host)
    } else {
        url.contains(pattern)
    }
}
