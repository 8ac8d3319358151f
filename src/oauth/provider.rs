use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::ProviderConfig;

const ACCOUNT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_ACCOUNT_RESPONSE_SIZE: usize = 64 * 1024;

/// Account details returned by a successful verification probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub display_name: String,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request timed out after 20s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Token rejected by provider (status {0})")]
    Rejected(u16),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid account response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("No access token in the authorization response")]
    MissingAccessToken,
}

/// OAuth provider as used by the handshake: where to log in, and who the token belongs to.
#[allow(async_fn_in_trait)]
pub trait ProviderClient {
    /// Human-readable provider name, shown on the login button.
    fn display_name(&self) -> &str;

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ProviderError>;

    async fn current_account(&self, access_token: &SecretString)
        -> Result<AccountInfo, ProviderError>;
}

// ============================================================================
// Dropbox
// ============================================================================

#[derive(Deserialize)]
struct AccountName {
    display_name: String,
}

#[derive(Deserialize)]
struct CurrentAccountResponse {
    name: AccountName,
    email: String,
}

/// Dropbox-style implicit-grant client.
///
/// The authorization tab is sent to `authorize_url` with
/// `response_type=token`; the token arrives in the redirect fragment and is
/// verified with `POST {api_base}/2/users/get_current_account`.
#[derive(Debug, Clone)]
pub struct DropboxClient {
    http: reqwest::Client,
    name: String,
    client_id: String,
    authorize_url: Url,
    api_base: Url,
}

impl DropboxClient {
    pub fn new(http: reqwest::Client, config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http,
            name: config.name.clone(),
            client_id: config.client_id.clone(),
            authorize_url: Url::parse(&config.authorize_url)?,
            api_base: Url::parse(&config.api_base)?,
        })
    }
}

impl ProviderClient for DropboxClient {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ProviderError> {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "token")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url)
    }

    async fn current_account(
        &self,
        access_token: &SecretString,
    ) -> Result<AccountInfo, ProviderError> {
        let endpoint = self.api_base.join("2/users/get_current_account")?;

        let request = self
            .http
            .post(endpoint)
            .bearer_auth(access_token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("null")
            .send();

        let response = tokio::time::timeout(ACCOUNT_PROBE_TIMEOUT, request)
            .await
            .map_err(|_| ProviderError::Timeout)??;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::Rejected(status.as_u16()));
        }
        if !status.is_success() {
            return Err(ProviderError::HttpStatus(status.as_u16()));
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_ACCOUNT_RESPONSE_SIZE {
                return Err(ProviderError::ResponseTooLarge(MAX_ACCOUNT_RESPONSE_SIZE));
            }
        }
        let bytes = response.bytes().await?;
        if bytes.len() > MAX_ACCOUNT_RESPONSE_SIZE {
            return Err(ProviderError::ResponseTooLarge(MAX_ACCOUNT_RESPONSE_SIZE));
        }

        let account: CurrentAccountResponse = serde_json::from_slice(&bytes)?;
        Ok(AccountInfo {
            display_name: account.name.display_name,
            email: account.email,
        })
    }
}
