use thiserror::Error;
use url::Url;

use crate::storage::FeedCandidate;

/// Errors that can occur while validating a detected feed URL.
#[derive(Error, Debug)]
pub enum FeedUrlError {
    /// The href could not be parsed, even relative to the page base.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Validates a feed candidate href detected on a page.
///
/// The href is resolved against `base` (the URL of the page that reported
/// it) so relative links such as `/feed.xml` are accepted. Only `http` and
/// `https` survive; extension-internal, `file:`, `javascript:` and every
/// other scheme are rejected.
///
/// # Errors
///
/// Returns [`FeedUrlError`] if:
/// - The href cannot be parsed ([`FeedUrlError::InvalidUrl`])
/// - The resolved scheme is not `http` or `https` ([`FeedUrlError::UnsupportedScheme`])
///
/// # Examples
///
/// ```
/// use feedbridge::util::validate_feed_href;
///
/// let url = validate_feed_href("https://example.com/feed.xml", None).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_href("javascript:alert(1)", None).is_err());
/// assert!(validate_feed_href("file:///etc/passwd", None).is_err());
/// ```
pub fn validate_feed_href(href: &str, base: Option<&Url>) -> Result<Url, FeedUrlError> {
    let url = Url::options().base_url(base).parse(href.trim())?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(FeedUrlError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Returns true if `href` may enter the feed index.
pub fn is_acceptable(href: &str, base: Option<&Url>) -> bool {
    validate_feed_href(href, base).is_ok()
}

/// Filters a detected batch, keeping acceptable candidates in detection order.
///
/// Each candidate is checked on its own; kept hrefs are stored in resolved
/// absolute form. An empty result means nothing usable was detected.
pub fn filter_candidates(candidates: Vec<FeedCandidate>, base: Option<&Url>) -> Vec<FeedCandidate> {
    candidates
        .into_iter()
        .filter_map(|candidate| match validate_feed_href(&candidate.href, base) {
            Ok(url) => Some(FeedCandidate::new(url)),
            Err(e) => {
                tracing::debug!(href = %candidate.href, error = %e, "Dropping feed candidate");
                None
            }
        })
        .collect()
}
