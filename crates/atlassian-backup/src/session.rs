//! Authenticated session for the Atlassian REST api.
//!

use core::{fmt, time::Duration};

use reqwest::{
    blocking::{Client, RequestBuilder},
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use thiserror::Error;

use crate::config::{AtlassianConfig, REDACTED};

/// A reusable HTTP client bound to a site and its credentials.
///
/// Credentials are not checked here, a bad token shows up as an error status on the first
/// request.
#[derive(Clone)]
pub struct Session {
    client: Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl Session {
    /// Build a session that exchanges JSON and authenticates with HTTP basic auth.
    pub fn new(config: &AtlassianConfig) -> Result<Self, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // The blocking client times out after 30 seconds unless told otherwise.
        let timeout = config.timeout_seconds.map(Duration::from_secs);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(SessionError::BuildClient)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            api_token: config.api_token.clone(),
        })
    }

    /// The site url, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The absolute url for a path on the site.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// An authenticated GET request for a path on the site.
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.get_url(&self.url(path))
    }

    /// An authenticated GET request for an absolute url.
    pub fn get_url(&self, url: &str) -> RequestBuilder {
        self.authenticate(self.client.get(url))
    }

    /// An authenticated POST request for a path on the site.
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.authenticate(self.client.post(self.url(path)))
    }

    fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.email, Some(&self.api_token))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &REDACTED)
            .finish_non_exhaustive()
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to build the HTTP client: {0}")]
    BuildClient(#[source] reqwest::Error),
}
