use crate::config::types::{AuthConfig, AuthKind, Config, ScanConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration file
///
/// # Returns
///
/// * `Ok(())` - Every table passed validation
/// * `Err(ConfigError)` - The first rule that failed
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scan_config(&config.scan)?;

    if let Some(path) = &config.output.database_path {
        if path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database_path cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates a scan configuration
///
/// The engine calls this as well, so configurations built in code get the
/// same checks as ones loaded from TOML.
///
/// # Rules
///
/// - `target-url` parses as http(s)
/// - `max-pages`, `max-requests-per-host`, `timeout`, `connect-timeout` are at least 1
/// - `requests-per-second` is in (0, 1000]
/// - `max-concurrent-requests` is in 1..=100
/// - `max-body-bytes` is at least 1024
/// - `user-agent` and every scope/exclude pattern are non-empty
/// - the auth block carries the credentials its type needs
///
/// # Examples
///
/// ```
/// use webrecon::config::{validate_scan_config, ScanConfig};
///
/// let mut config = ScanConfig::new("https://example.com/");
/// assert!(validate_scan_config(&config).is_ok());
///
/// config.requests_per_second = 0.0;
/// assert!(validate_scan_config(&config).is_err());
/// ```
pub fn validate_scan_config(config: &ScanConfig) -> Result<(), ConfigError> {
    validate_http_url("target_url", &config.target_url)?;
    validate_limits(config)?;

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    validate_patterns("scope_patterns", &config.scope_patterns)?;
    validate_patterns("exclude_patterns", &config.exclude_patterns)?;

    if let Some(auth) = &config.auth {
        validate_auth(auth)?;
    }

    Ok(())
}

/// Validates numeric limits
fn validate_limits(config: &ScanConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1".to_string(),
        ));
    }

    if !(config.requests_per_second > 0.0 && config.requests_per_second <= 1000.0) {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be in (0, 1000], got {}",
            config.requests_per_second
        )));
    }

    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.max_requests_per_host < 1 {
        return Err(ConfigError::Validation(
            "max_requests_per_host must be >= 1".to_string(),
        ));
    }

    if config.timeout < 1 || config.connect_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "timeouts must be >= 1s, got timeout={} connect_timeout={}",
            config.timeout, config.connect_timeout
        )));
    }

    if config.max_body_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "max_body_bytes must be >= 1024, got {}",
            config.max_body_bytes
        )));
    }

    Ok(())
}

/// Validates authentication settings for the selected flow
fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    match auth.kind {
        AuthKind::Form | AuthKind::Basic => {
            let has_username = auth.username.as_deref().is_some_and(|u| !u.is_empty());
            if !has_username || auth.password.is_none() {
                return Err(ConfigError::Validation(format!(
                    "{:?} auth requires username and password",
                    auth.kind
                )));
            }
        }
        AuthKind::Bearer => {
            if auth.token.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Validation(
                    "bearer auth requires a token".to_string(),
                ));
            }
        }
    }

    if auth.kind == AuthKind::Form {
        if let Some(login_url) = &auth.login_url {
            validate_http_url("login_url", login_url)?;
        }
        if auth.username_field.is_empty() || auth.password_field.is_empty() {
            return Err(ConfigError::Validation(
                "form auth field names cannot be empty".to_string(),
            ));
        }
    }

    if let Some(check_url) = &auth.check_url {
        validate_http_url("check_url", check_url)?;
    }

    Ok(())
}

/// Validates that every pattern in a list is non-empty
fn validate_patterns(field: &str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidPattern(format!(
                "{} cannot contain empty patterns",
                field
            )));
        }
        if pattern.starts_with("*.") && pattern.len() == 2 {
            return Err(ConfigError::InvalidPattern(format!(
                "{} wildcard '{}' has no domain",
                field, pattern
            )));
        }
    }
    Ok(())
}

/// Validates that a URL parses and uses http(s)
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            field, value
        )));
    }

    Ok(())
}
