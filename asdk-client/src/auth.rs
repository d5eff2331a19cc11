//! OAuth client-credentials token acquisition

use crate::error::{extract_error_message, AsdkError, AsdkResult, GENERIC_ERROR_MESSAGE};
use asdk_common::config::StoredToken;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Tokens are treated as expired this many seconds before their real expiry
pub const EXPIRY_MARGIN_SECS: i64 = 60 * 5;

/// Token endpoint response, stamped with an absolute expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Lifetime in seconds as returned by the server
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Unix timestamp (seconds); filled in on receipt
    #[serde(default)]
    pub expires: i64,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        is_expired_at(self.expires, Utc::now().timestamp())
    }
}

impl From<&AccessToken> for StoredToken {
    fn from(token: &AccessToken) -> Self {
        StoredToken {
            access_token: token.access_token.clone(),
            expires: token.expires,
        }
    }
}

/// Whether a token expiring at `expires` should no longer be used at `now`
pub fn is_expired_at(expires: i64, now: i64) -> bool {
    now >= expires - EXPIRY_MARGIN_SECS
}

/// Stored token value, if it is still usable
pub fn usable_token(stored: Option<&StoredToken>) -> Option<&str> {
    let token = stored?;
    if is_expired_at(token.expires, Utc::now().timestamp()) {
        debug!("Stored access token expired");
        None
    } else {
        Some(token.access_token.as_str())
    }
}

/// Request a new access token with client credentials
pub async fn request_access_token(
    http: &reqwest::Client,
    auth_url: &str,
    client_id: &str,
    client_secret: &str,
) -> AsdkResult<AccessToken> {
    if client_id.is_empty() {
        return Err(AsdkError::Validation("Empty client_id".to_string()));
    }
    if client_secret.is_empty() {
        return Err(AsdkError::Validation("Empty client_secret".to_string()));
    }

    let form = reqwest::multipart::Form::new().text("grant_type", "client_credentials");

    debug!(url = %auth_url, "Requesting access token");

    let response = http
        .post(auth_url)
        .basic_auth(client_id, Some(client_secret))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.json::<serde_json::Value>().await.ok();
        let message = match &body {
            Some(b) => extract_error_message(b, GENERIC_ERROR_MESSAGE),
            None => GENERIC_ERROR_MESSAGE.to_string(),
        };
        warn!(status = status.as_u16(), message = %message, "Token request rejected");
        return Err(AsdkError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let mut token: AccessToken = response
        .json()
        .await
        .map_err(|e| AsdkError::Parse(e.to_string()))?;
    token.expires = Utc::now().timestamp() + token.expires_in;

    info!(expires_in = token.expires_in, "Access token obtained");
    Ok(token)
}
