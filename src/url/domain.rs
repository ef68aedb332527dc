use std::net::IpAddr;
use url::Url;

/// Second-level labels that sit under a country-code TLD as public suffixes
const MULTI_PART_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk", "com.au", "net.au", "org.au", "co.jp",
    "co.nz", "com.br", "co.in", "co.za", "com.cn", "com.mx",
];

/// Extracts the lowercase host of a URL
///
/// # Arguments
///
/// * `url` - The URL to extract the host from
///
/// # Returns
///
/// * `Some(String)` - The lowercase host
/// * `None` - If the URL has no host (`mailto:`, `data:` ...)
///
/// # Examples
///
/// ```
/// use url::Url;
/// use webrecon::url::extract_domain;
///
/// let url = Url::parse("https://API.Example.com/v1").unwrap();
/// assert_eq!(extract_domain(&url), Some("api.example.com".to_string()));
///
/// let url = Url::parse("mailto:admin@example.com").unwrap();
/// assert_eq!(extract_domain(&url), None);
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Reduces a host to its registrable domain
///
/// `blog.example.com` and `api.v2.example.com` both become `example.com`;
/// `shop.example.co.uk` becomes `example.co.uk`. IP addresses, `localhost`
/// and single-label hosts are returned unchanged.
///
/// The suffix table is a short fixed list, not the full public suffix list.
///
/// # Examples
///
/// ```
/// use webrecon::url::registrable_domain;
///
/// assert_eq!(registrable_domain("blog.Example.com"), "example.com");
/// assert_eq!(registrable_domain("www.bbc.co.uk"), "bbc.co.uk");
/// assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
/// ```
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let last_two = labels[labels.len() - 2..].join(".");
    if MULTI_PART_SUFFIXES.contains(&last_two.as_str()) {
        labels[labels.len() - 3..].join(".")
    } else {
        last_two
    }
}

/// Registrable domain of a URL's host, if it has one
///
/// This is the key the per-host limiter groups requests by.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use webrecon::url::url_registrable_domain;
///
/// let url = Url::parse("https://cdn.static.example.org/app.js").unwrap();
/// assert_eq!(url_registrable_domain(&url), Some("example.org".to_string()));
/// ```
pub fn url_registrable_domain(url: &Url) -> Option<String> {
    extract_domain(url).map(|host| registrable_domain(&host))
}
