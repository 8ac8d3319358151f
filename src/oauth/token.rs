use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

const ACCESS_TOKEN_PREFIX: &str = "#access_token=";
const ACCOUNT_ID_PREFIX: &str = "account_id=";

/// Fields extracted from a raw redirect fragment.
#[derive(Debug, Default)]
pub struct ParsedToken {
    pub access_token: Option<SecretString>,
    pub account_id: Option<String>,
}

/// Splits a raw token on `&` and picks the well-known fields.
///
/// A segment starting with `#access_token=` gives the access token, one
/// starting with `account_id=` gives the account id. Everything else
/// (`token_type`, `state`, ...) is ignored, as are empty values.
pub fn parse_token(raw: &str) -> ParsedToken {
    let mut parsed = ParsedToken::default();

    for segment in raw.split('&') {
        if let Some(value) = segment.strip_prefix(ACCESS_TOKEN_PREFIX) {
            if !value.is_empty() {
                parsed.access_token = Some(SecretString::from(value.to_owned()));
            }
        } else if let Some(value) = segment.strip_prefix(ACCOUNT_ID_PREFIX) {
            if !value.is_empty() {
                parsed.account_id = Some(value.to_owned());
            }
        }
    }

    parsed
}

/// Returns the `#...` fragment of a full redirect URL, or the input if it has none.
pub fn token_fragment(redirect_url: &str) -> &str {
    match redirect_url.find('#') {
        Some(idx) => &redirect_url[idx..],
        None => redirect_url,
    }
}

/// Token record persisted between background restarts.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredToken {
    pub raw: String,
    pub stored_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_owned(),
            stored_at: Utc::now(),
        }
    }
}
