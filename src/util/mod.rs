//! Utility functions for common operations.
//!
//! - **Feed URL validation**: scheme filtering for feed candidates reported by pages
//! - **Nonces**: opaque state values for OAuth redirects
//!
//! # Examples
//!
//! ```
//! use feedbridge::util::is_acceptable;
//!
//! assert!(is_acceptable("https://example.com/feed.xml", None));
//! assert!(!is_acceptable("chrome-extension://other/x", None));
//! ```

mod nonce;
mod url_validator;

pub use nonce::oauth_state_nonce;
pub use url_validator::{filter_candidates, is_acceptable, validate_feed_href, FeedUrlError};
