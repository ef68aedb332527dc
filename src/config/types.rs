use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query parameters stripped during normalization (any `utm_*` key is also dropped)
pub const DEFAULT_TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "_ga", "_gl", "yclid", "dclid", "igshid",
];

/// File extensions never fetched by the crawler
pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "rtf",
    // images
    "jpg", "jpeg", "png", "gif", "bmp", "svg", "ico", "webp", "tif", "tiff",
    // audio / video
    "mp3", "mp4", "avi", "mov", "wmv", "flv", "webm", "wav", "ogg", "m4a", "mkv",
    // archives and binaries
    "zip", "rar", "7z", "tar", "gz", "bz2", "xz", "exe", "dmg", "iso", "msi", "bin", "apk",
    // fonts
    "woff", "woff2", "ttf", "eot", "otf",
    // static assets
    "css", "js", "map",
];

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scan: ScanConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Immutable configuration for one scan
///
/// Built once (from TOML or in code) and injected into the engine, spider
/// and session manager. Nothing inside the crawler reads global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScanConfig {
    /// URL the scan starts from
    pub target_url: String,

    /// Maximum link depth from the target (target is depth 0)
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Soft cap on the number of distinct URLs discovered
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Aggregate request rate across all hosts
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Global cap on in-flight requests
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Total request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connect timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    #[serde(default = "default_true")]
    pub respect_robots: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Substring (or `*.domain`) patterns; empty means "same registrable domain as the target"
    #[serde(default)]
    pub scope_patterns: Vec<String>,

    /// Substring patterns that veto a URL even when it is in scope
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Concurrent requests allowed against one registrable domain
    #[serde(default = "default_max_requests_per_host")]
    pub max_requests_per_host: usize,

    /// Response bodies larger than this abort the fetch
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_tracking_params")]
    pub tracking_params: Vec<String>,

    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,

    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl ScanConfig {
    /// Creates a configuration for `target_url` with every other field at its default
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            requests_per_second: default_requests_per_second(),
            max_concurrent_requests: default_max_concurrent_requests(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            follow_redirects: true,
            respect_robots: true,
            user_agent: default_user_agent(),
            scope_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_requests_per_host: default_max_requests_per_host(),
            max_body_bytes: default_max_body_bytes(),
            tracking_params: default_tracking_params(),
            excluded_extensions: default_excluded_extensions(),
            auth: None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// Authentication flow used before crawling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    /// Submit the login form found at `login-url`
    Form,
    /// HTTP Basic credentials on every request
    Basic,
    /// Static `Authorization: Bearer <token>` header
    Bearer,
}

/// Authentication descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub kind: AuthKind,

    /// Login page for form auth; defaults to the target URL
    #[serde(default)]
    pub login_url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_username_field")]
    pub username_field: String,

    #[serde(default = "default_password_field")]
    pub password_field: String,

    #[serde(default)]
    pub token: Option<String>,

    /// Page checked by session refresh; defaults to the base URL
    #[serde(default)]
    pub check_url: Option<String>,

    #[serde(default = "default_logged_in_indicators")]
    pub logged_in_indicators: Vec<String>,

    #[serde(default = "default_logged_out_indicators")]
    pub logged_out_indicators: Vec<String>,
}

impl AuthConfig {
    fn with_kind(kind: AuthKind) -> Self {
        Self {
            kind,
            login_url: None,
            username: None,
            password: None,
            username_field: default_username_field(),
            password_field: default_password_field(),
            token: None,
            check_url: None,
            logged_in_indicators: default_logged_in_indicators(),
            logged_out_indicators: default_logged_out_indicators(),
        }
    }

    pub fn form(login_url: impl Into<String>, username: &str, password: &str) -> Self {
        let mut auth = Self::with_kind(AuthKind::Form);
        auth.login_url = Some(login_url.into());
        auth.username = Some(username.to_string());
        auth.password = Some(password.to_string());
        auth
    }

    pub fn basic(username: &str, password: &str) -> Self {
        let mut auth = Self::with_kind(AuthKind::Basic);
        auth.username = Some(username.to_string());
        auth.password = Some(password.to_string());
        auth
    }

    pub fn bearer(token: &str) -> Self {
        let mut auth = Self::with_kind(AuthKind::Bearer);
        auth.token = Some(token.to_string());
        auth
    }
}

/// Output configuration used by the CLI
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// SQLite file receiving scan events; events stay in memory when unset
    #[serde(default)]
    pub database_path: Option<String>,
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_pages() -> usize {
    500
}

fn default_requests_per_second() -> f64 {
    10.0
}

fn default_max_concurrent_requests() -> usize {
    10
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("webrecon/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_requests_per_host() -> usize {
    5
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_tracking_params() -> Vec<String> {
    DEFAULT_TRACKING_PARAMS.iter().map(|p| p.to_string()).collect()
}

fn default_excluded_extensions() -> Vec<String> {
    DEFAULT_EXCLUDED_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_username_field() -> String {
    "username".to_string()
}

fn default_password_field() -> String {
    "password".to_string()
}

fn default_logged_in_indicators() -> Vec<String> {
    ["logout", "log out", "sign out", "my account"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_logged_out_indicators() -> Vec<String> {
    ["login", "log in", "sign in", "forgot password"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
