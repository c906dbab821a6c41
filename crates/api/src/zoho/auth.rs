//! Zoho OAuth token refresh.
//!
//! Exchanges the long-lived refresh token for short-lived access tokens.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use super::ZohoError;
use crate::config::ZohoConfig;

/// Access tokens are treated as expired this many seconds early.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Short-lived access token minted from the refresh token.
#[derive(Debug, Clone)]
pub struct ZohoToken {
    /// OAuth access token for API requests.
    pub access_token: SecretString,
    /// Unix timestamp when the access token expires.
    pub expires_at: i64,
}

/// Response from the Zoho token endpoint.
///
/// Zoho reports some failures (e.g. `invalid_code`) with HTTP 200 and an
/// `error` field instead of a token.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

/// Build the token refresh URL for a Zoho accounts domain.
fn token_url(config: &ZohoConfig) -> Result<Url, ZohoError> {
    let mut url = Url::parse(&format!(
        "{}/oauth/v2/token",
        config.accounts_url.as_str().trim_end_matches('/')
    ))?;
    url.query_pairs_mut()
        .append_pair("refresh_token", config.refresh_token.expose_secret())
        .append_pair("client_id", &config.client_id)
        .append_pair("client_secret", config.client_secret.expose_secret())
        .append_pair("grant_type", "refresh_token");
    Ok(url)
}

/// Mint a new access token using the configured refresh token.
///
/// # Errors
///
/// Returns `ZohoError::AuthenticationFailed` if Zoho rejects the client or
/// refresh token, or `ZohoError::Http` on network failures.
#[instrument(skip_all, fields(client_id = %config.client_id))]
pub async fn refresh_access_token(
    client: &reqwest::Client,
    config: &ZohoConfig,
) -> Result<ZohoToken, ZohoError> {
    let now = chrono::Utc::now().timestamp();

    let response = client.post(token_url(config)?).send().await?;
    let status = response.status();

    if status.is_success() {
        let token_response: TokenResponse = response.json().await?;

        if let Some(error) = token_response.error {
            return Err(ZohoError::AuthenticationFailed(error));
        }

        let access_token = token_response.access_token.ok_or_else(|| {
            ZohoError::AuthenticationFailed("token response missing access_token".to_string())
        })?;

        tracing::debug!("Zoho access token refreshed");

        Ok(ZohoToken {
            access_token: SecretString::from(access_token),
            expires_at: now + token_response.expires_in.unwrap_or(3600),
        })
    } else {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(ZohoError::AuthenticationFailed(format!(
            "HTTP {status}: {error_text}"
        )))
    }
}

impl ZohoToken {
    /// Check if the access token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_within(EXPIRY_BUFFER_SECS)
    }

    /// Check if the access token will expire within the given number of seconds.
    #[must_use]
    pub fn expires_within(&self, seconds: i64) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - seconds
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> ZohoConfig {
        ZohoConfig {
            organization_id: "600123".to_string(),
            client_id: "1000.CLIENT".to_string(),
            client_secret: SecretString::from("client-secret-value"),
            refresh_token: SecretString::from("1000.refresh"),
            api_base_url: Url::parse("https://www.zohoapis.com").unwrap(),
            accounts_url: Url::parse("https://accounts.zoho.eu/").unwrap(),
            per_page: 200,
        }
    }

    #[test]
    fn test_token_is_expired() {
        let now = chrono::Utc::now().timestamp();

        let expired = ZohoToken {
            access_token: SecretString::from("test"),
            expires_at: now - 3600,
        };
        assert!(expired.is_expired());

        let valid = ZohoToken {
            access_token: SecretString::from("test"),
            expires_at: now + 3600,
        };
        assert!(!valid.is_expired());
        assert!(!valid.expires_within(300));

        // Inside the 60 second buffer counts as expired
        let almost_expired = ZohoToken {
            access_token: SecretString::from("test"),
            expires_at: now + 30,
        };
        assert!(almost_expired.is_expired());
    }

    #[test]
    fn test_token_url_carries_refresh_grant() {
        let url = token_url(&test_config()).unwrap();
        assert_eq!(url.host_str(), Some("accounts.zoho.eu"));
        assert_eq!(url.path(), "/oauth/v2/token");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("grant_type".to_string(), "refresh_token".to_string())));
        assert!(pairs.contains(&("client_id".to_string(), "1000.CLIENT".to_string())));
        assert!(pairs.contains(&("refresh_token".to_string(), "1000.refresh".to_string())));
    }
}
