//! Zoho Inventory REST client.
//!
//! Provides read-only access to the Zoho Inventory API with OAuth token
//! management and envelope error handling.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tracing::instrument;
use url::Url;

use super::ZohoError;
use super::auth::{ZohoToken, refresh_access_token};
use crate::config::ZohoConfig;

/// Refresh the access token when it expires within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 300;

/// Zoho Inventory API client.
///
/// # Authentication
///
/// Uses the OAuth refresh-token grant. Access tokens are cached in memory and
/// refreshed automatically when they are about to expire. A `401` response
/// drops the cached token and the request is retried once.
#[derive(Clone)]
pub struct ZohoClient {
    inner: Arc<ZohoClientInner>,
}

struct ZohoClientInner {
    client: reqwest::Client,
    config: ZohoConfig,
    /// In-memory token cache
    token: RwLock<Option<ZohoToken>>,
}

/// Longest slice of a non-JSON error body kept in `UnexpectedStatus`.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Common fields of every Zoho response body.
#[derive(Debug, Deserialize)]
struct ZohoEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Outcome of a single authenticated request.
enum Attempt<T> {
    Done(T),
    Unauthorized,
}

impl ZohoClient {
    /// Create a new Zoho API client.
    ///
    /// No token is fetched until the first request.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::Http` if the HTTP client cannot be created.
    pub fn new(config: &ZohoConfig) -> Result<Self, ZohoError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(ZohoClientInner {
                client,
                config: config.clone(),
                token: RwLock::new(None),
            }),
        })
    }

    /// Number of records requested per list page.
    #[must_use]
    pub fn per_page(&self) -> u32 {
        self.inner.config.per_page
    }

    /// Check if we have a cached, non-expired access token.
    pub async fn has_valid_token(&self) -> bool {
        self.inner
            .token
            .read()
            .await
            .as_ref()
            .is_some_and(|token| !token.is_expired())
    }

    /// Clear the cached token.
    pub async fn clear_token(&self) {
        *self.inner.token.write().await = None;
    }

    /// Return a usable access token, refreshing it if needed.
    async fn access_token(&self) -> Result<SecretString, ZohoError> {
        if let Some(token) = self.inner.token.read().await.as_ref()
            && !token.expires_within(REFRESH_MARGIN_SECS)
        {
            return Ok(token.access_token.clone());
        }

        let mut cached = self.inner.token.write().await;

        // Another request may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref()
            && !token.expires_within(REFRESH_MARGIN_SECS)
        {
            return Ok(token.access_token.clone());
        }

        let token = refresh_access_token(&self.inner.client, &self.inner.config).await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Build `{api_base}/inventory/v1/{path}?organization_id=...&{params}`.
    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url, ZohoError> {
        let mut url = Url::parse(&format!(
            "{}/inventory/v1/{path}",
            self.inner.config.api_base_url.as_str().trim_end_matches('/')
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("organization_id", &self.inner.config.organization_id);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Execute a GET request against the Inventory API.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::RateLimited` if Zoho answers `429`.
    /// Returns `ZohoError::NotFound` if the resource does not exist.
    /// Returns `ZohoError::Api` if the envelope carries a non-zero `code`.
    /// Returns `ZohoError::TokenRejected` if a freshly minted token is refused.
    /// Returns `ZohoError::Http` on network failures.
    #[instrument(skip(self, params))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ZohoError> {
        let url = self.endpoint(path, params)?;

        if let Attempt::Done(value) = self.send_get(&url, path).await? {
            return Ok(value);
        }

        tracing::info!("Zoho rejected cached access token, refreshing");
        self.clear_token().await;

        match self.send_get(&url, path).await? {
            Attempt::Done(value) => Ok(value),
            Attempt::Unauthorized => Err(ZohoError::TokenRejected),
        }
    }

    async fn send_get<T: DeserializeOwned>(
        &self,
        url: &Url,
        path: &str,
    ) -> Result<Attempt<T>, ZohoError> {
        let access_token = self.access_token().await?;

        let response = self
            .inner
            .client
            .get(url.clone())
            .header(
                "Authorization",
                format!("Zoho-oauthtoken {}", access_token.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();

        // Check for rate limiting
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(ZohoError::RateLimited(retry_after));
        }

        // Check for unauthorized
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(Attempt::Unauthorized);
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ZohoError::NotFound(path.to_string()));
        }

        let body = response.text().await?;

        // Gateway error pages may not be JSON
        if !status.is_success() {
            return Err(match serde_json::from_str::<ZohoEnvelope>(&body) {
                Ok(envelope) if envelope.code != 0 => ZohoError::Api {
                    code: envelope.code,
                    message: envelope.message,
                },
                Ok(envelope) => ZohoError::UnexpectedStatus {
                    status: status.as_u16(),
                    message: envelope.message,
                },
                Err(_) => ZohoError::UnexpectedStatus {
                    status: status.as_u16(),
                    message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
                },
            });
        }

        let envelope: ZohoEnvelope = serde_json::from_str(&body)?;
        if envelope.code != 0 {
            return Err(ZohoError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }

        Ok(Attempt::Done(serde_json::from_str(&body)?))
    }
}
