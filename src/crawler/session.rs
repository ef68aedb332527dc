//! Authentication and CSRF token handling
//!
//! The session manager owns the shared HTTP client. Form logins ride on the
//! client's cookie store; Basic and Bearer credentials are attached to each
//! request through [`SessionManager::authorize`].

use crate::config::{AuthConfig, AuthKind};
use crate::crawler::parser::{extract_csrf_tokens, first_form, CsrfToken};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::Mutex;

/// Authentication failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Authentication request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("No login form found at {0}")]
    LoginFormNotFound(String),

    #[error("Login rejected with HTTP status {0}")]
    LoginRejected(u16),

    #[error("Missing credentials for {0} authentication")]
    MissingCredentials(&'static str),

    #[error("Invalid authentication URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Default)]
enum Credentials {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer(String),
}

/// Authentication state of one scan
#[derive(Debug, Default)]
pub struct SessionState {
    pub authenticated: bool,
    pub csrf_tokens: HashMap<String, String>,
    pub auth: Option<AuthConfig>,
    pub base_url: Option<String>,
    credentials: Credentials,
}

/// Authentication flows and the CSRF token store
pub struct SessionManager {
    client: Client,
    state: RwLock<SessionState>,
    /// Serializes refreshes so concurrent 401s trigger one login
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            state: RwLock::new(SessionState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies stored Basic/Bearer credentials to a request
    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.read().credentials {
            Credentials::None => request,
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::Bearer(token) => request.bearer_auth(token),
        }
    }

    /// Runs the configured authentication flow
    ///
    /// # Flows
    ///
    /// | Type | Action |
    /// |------|--------|
    /// | form | GET the login page, fill the first form, POST it; 200/302/303 is success |
    /// | basic | Store HTTP Basic credentials for every request |
    /// | bearer | Store a static `Authorization: Bearer` token |
    pub async fn configure(&self, auth: &AuthConfig, base_url: &str) -> Result<(), SessionError> {
        {
            let mut state = self.write();
            state.auth = Some(auth.clone());
            state.base_url = Some(base_url.to_string());
            state.authenticated = false;
        }

        match auth.kind {
            AuthKind::Form => self.form_login(auth, base_url).await?,
            AuthKind::Basic => {
                let (Some(username), Some(password)) = (&auth.username, &auth.password) else {
                    return Err(SessionError::MissingCredentials("basic"));
                };
                self.write().credentials = Credentials::Basic {
                    username: username.clone(),
                    password: password.clone(),
                };
            }
            AuthKind::Bearer => {
                let Some(token) = auth.token.as_ref().filter(|t| !t.is_empty()) else {
                    return Err(SessionError::MissingCredentials("bearer"));
                };
                self.write().credentials = Credentials::Bearer(token.clone());
            }
        }

        self.write().authenticated = true;
        tracing::info!("Authenticated using {:?} auth", auth.kind);
        Ok(())
    }

    async fn form_login(&self, auth: &AuthConfig, base_url: &str) -> Result<(), SessionError> {
        let (Some(username), Some(password)) = (&auth.username, &auth.password) else {
            return Err(SessionError::MissingCredentials("form"));
        };
        let login_url = auth.login_url.as_deref().unwrap_or(base_url);
        url::Url::parse(login_url).map_err(|e| SessionError::InvalidUrl(e.to_string()))?;

        let response = self.client.get(login_url).send().await?;
        let page_url = response.url().to_string();
        let html = response.text().await?;

        // scraper documents are !Send, so extraction stays in sync helpers
        let form = first_form(&html, &page_url)
            .ok_or_else(|| SessionError::LoginFormNotFound(login_url.to_string()))?;
        self.store_csrf_tokens(&extract_csrf_tokens(&html));

        let mut data: Vec<(String, String)> = form
            .hidden_fields
            .iter()
            .filter_map(|field| {
                let name = field.name.clone()?;
                Some((name, field.value.clone().unwrap_or_default()))
            })
            .filter(|(name, _)| *name != auth.username_field && *name != auth.password_field)
            .collect();
        data.push((auth.username_field.clone(), username.clone()));
        data.push((auth.password_field.clone(), password.clone()));

        tracing::debug!("Submitting login form to {}", form.action);
        let response = self.client.post(&form.action).form(&data).send().await?;
        let status = response.status();

        if !matches!(
            status,
            StatusCode::OK | StatusCode::FOUND | StatusCode::SEE_OTHER
        ) {
            tracing::warn!("Login to {} rejected with {}", form.action, status);
            return Err(SessionError::LoginRejected(status.as_u16()));
        }

        if let Ok(body) = response.text().await {
            self.store_csrf_tokens(&extract_csrf_tokens(&body));
        }

        Ok(())
    }

    /// Adds tokens to the store, replacing older values for the same name
    pub fn store_csrf_tokens(&self, tokens: &[CsrfToken]) {
        if tokens.is_empty() {
            return;
        }
        let mut state = self.write();
        for token in tokens {
            state
                .csrf_tokens
                .insert(token.name.clone(), token.value.clone());
        }
    }

    pub fn csrf_tokens(&self) -> HashMap<String, String> {
        self.read().csrf_tokens.clone()
    }

    /// Merges stored CSRF tokens into outgoing form data
    ///
    /// Values already present in `data` are left untouched.
    pub fn prepare_request_data(
        &self,
        mut data: HashMap<String, String>,
    ) -> HashMap<String, String> {
        for (name, value) in self.read().csrf_tokens.iter() {
            data.entry(name.clone()).or_insert_with(|| value.clone());
        }
        data
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().authenticated
    }

    pub fn has_auth(&self) -> bool {
        self.read().auth.is_some()
    }

    /// Fetches the check page and logs in again if the session looks expired
    ///
    /// Returns true when a new login was performed. Expiry means a 401, or
    /// more logged-out indicators than logged-in ones in the page body.
    pub async fn refresh(&self) -> Result<bool, SessionError> {
        let _guard = self.refresh_lock.lock().await;

        let (auth, base_url) = {
            let state = self.read();
            match (&state.auth, &state.base_url) {
                (Some(auth), Some(base)) => (auth.clone(), base.clone()),
                _ => return Ok(false),
            }
        };

        let check_url = auth.check_url.as_deref().unwrap_or(&base_url);
        let response = self.authorize(self.client.get(check_url)).send().await?;
        let unauthorized = response.status() == StatusCode::UNAUTHORIZED;
        let body = response.text().await.unwrap_or_default();

        let (logged_in, logged_out) = count_indicators(&body, &auth);
        tracing::debug!(
            "Session check {}: {} logged-in / {} logged-out indicators",
            check_url,
            logged_in,
            logged_out
        );

        if !unauthorized && logged_out <= logged_in {
            return Ok(false);
        }

        tracing::info!("Session appears expired, re-authenticating");
        {
            let mut state = self.write();
            state.csrf_tokens.clear();
            state.authenticated = false;
        }
        self.configure(&auth, &base_url).await?;
        Ok(true)
    }
}

/// Case-insensitive occurrence counts of logged-in and logged-out phrases
fn count_indicators(body: &str, auth: &AuthConfig) -> (usize, usize) {
    let body = body.to_lowercase();
    let count = |indicators: &[String]| -> usize {
        indicators
            .iter()
            .filter(|i| !i.is_empty())
            .map(|i| body.matches(&i.to_lowercase()).count())
            .sum()
    };
    (
        count(&auth.logged_in_indicators),
        count(&auth.logged_out_indicators),
    )
}
