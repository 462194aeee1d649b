//! Bearer tokens for Google Cloud REST APIs.
//!
//! Tokens come from an explicit `GOOGLE_OAUTH_ACCESS_TOKEN`, or from the
//! GCE metadata server when running on Google infrastructure. Emulators take
//! no token at all.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("Metadata server request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Metadata server returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: i64,
}

/// A fetched token and the moment it stops being reused.
#[derive(Debug, Clone)]
pub struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

#[derive(Debug, Clone)]
pub enum TokenSource {
    Anonymous,
    Static(String),
    Metadata {
        http: reqwest::Client,
        url: String,
        cached: Arc<RwLock<Option<CachedToken>>>,
    },
}

impl TokenSource {
    pub fn metadata(http: reqwest::Client) -> Self {
        Self::metadata_at(http, METADATA_TOKEN_URL)
    }

    pub fn metadata_at(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self::Metadata {
            http,
            url: url.into(),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Static token when given, otherwise the metadata server.
    pub fn from_access_token(http: reqwest::Client, access_token: Option<String>) -> Self {
        match access_token.filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                info!("Using access token from environment");
                Self::Static(token)
            }
            None => {
                info!("Using GCE metadata server for access tokens");
                Self::metadata(http)
            }
        }
    }

    /// Expiry of the cached metadata token, if one has been fetched.
    pub async fn cached_expiry(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Metadata { cached, .. } => {
                cached.read().await.as_ref().map(CachedToken::expires_at)
            }
            _ => None,
        }
    }

    pub async fn token(&self) -> Result<Option<String>, CredentialsError> {
        match self {
            Self::Anonymous => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::Metadata { http, url, cached } => {
                {
                    let token = cached.read().await;
                    if let Some(t) = token.as_ref() {
                        if t.expires_at > Utc::now() {
                            return Ok(Some(t.value.clone()));
                        }
                    }
                }

                debug!("Fetching access token from {}", url);
                let response = http
                    .get(url.as_str())
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(CredentialsError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                let fetched: MetadataToken = response.json().await?;
                let lifetime = (fetched.expires_in - REFRESH_MARGIN_SECS).max(0);

                let mut token = cached.write().await;
                *token = Some(CachedToken {
                    value: fetched.access_token.clone(),
                    expires_at: Utc::now() + Duration::seconds(lifetime),
                });
                Ok(Some(fetched.access_token))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_and_anonymous() {
        assert_eq!(TokenSource::Anonymous.token().await.unwrap(), None);
        assert_eq!(
            TokenSource::Static("abc".to_string()).token().await.unwrap(),
            Some("abc".to_string())
        );
    }

    #[tokio::test]
    async fn test_blank_access_token_falls_back_to_metadata() {
        let source = TokenSource::from_access_token(reqwest::Client::new(), Some("  ".to_string()));
        assert!(matches!(source, TokenSource::Metadata { .. }));
    }

    #[tokio::test]
    async fn test_metadata_token_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/token")
            .match_header("metadata-flavor", "Google")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.test","expires_in":3599,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let source =
            TokenSource::metadata_at(reqwest::Client::new(), format!("{}/token", server.url()));
        assert_eq!(source.cached_expiry().await, None);
        assert_eq!(source.token().await.unwrap().as_deref(), Some("ya29.test"));
        assert_eq!(source.token().await.unwrap().as_deref(), Some("ya29.test"));
        mock.assert_async().await;

        // Reuse stops a minute before the server-side expiry.
        let expiry = source.cached_expiry().await.unwrap();
        let remaining = (expiry - Utc::now()).num_seconds();
        assert!((3500..=3539).contains(&remaining), "remaining {}", remaining);
    }

    #[tokio::test]
    async fn test_static_source_has_no_cache() {
        let source = TokenSource::Static("abc".to_string());
        assert_eq!(source.cached_expiry().await, None);
    }

    #[tokio::test]
    async fn test_metadata_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/token")
            .with_status(404)
            .with_body("no service account")
            .create_async()
            .await;

        let source =
            TokenSource::metadata_at(reqwest::Client::new(), format!("{}/token", server.url()));
        match source.token().await {
            Err(CredentialsError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "no service account");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
