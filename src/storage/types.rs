use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while writing to a [`StateStore`](super::StateStore).
///
/// Reads never fail: an unreadable value is reported as absent and the
/// registry heals it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be written
    #[error("State store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized
    #[error("State store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Tab Identity
// ============================================================================

/// Browser tab identifier as issued by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl TabId {
    /// Sentinel for "no tab activated yet".
    pub const NONE: TabId = TabId(0);
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TabId {
    fn from(id: i64) -> Self {
        TabId(id)
    }
}

// ============================================================================
// Persisted Records
// ============================================================================

/// Singleton record of which tab hosts the application.
///
/// Persisted as `{"applicationTabId": <int|null>, "lastActiveTabId": <int>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSession {
    /// The one tab running the application, `None` when not running.
    pub application_tab_id: Option<TabId>,
    /// Most recently activated tab that is not the application tab.
    pub last_active_tab_id: TabId,
}

impl Default for TabSession {
    fn default() -> Self {
        Self {
            application_tab_id: None,
            last_active_tab_id: TabId::NONE,
        }
    }
}

impl TabSession {
    /// True if `tab_id` is the tracked application tab.
    pub fn is_application_tab(&self, tab_id: TabId) -> bool {
        self.application_tab_id == Some(tab_id)
    }
}

/// A URL believed to reference a syndication feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCandidate {
    pub href: String,
}

impl FeedCandidate {
    pub fn new(url: Url) -> Self {
        Self {
            href: url.to_string(),
        }
    }
}

impl From<&str> for FeedCandidate {
    fn from(href: &str) -> Self {
        Self {
            href: href.to_string(),
        }
    }
}

/// Detected feeds keyed by the tab that detected them.
///
/// Candidate order is detection order. Serialized as a JSON object whose keys
/// are decimal tab ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedIndex(BTreeMap<TabId, Vec<FeedCandidate>>);

impl FeedIndex {
    pub fn get(&self, tab_id: TabId) -> Option<&Vec<FeedCandidate>> {
        self.0.get(&tab_id)
    }

    /// Replaces (never merges) the entry for `tab_id`.
    pub fn replace(&mut self, tab_id: TabId, candidates: Vec<FeedCandidate>) {
        self.0.insert(tab_id, candidates);
    }

    pub fn remove(&mut self, tab_id: TabId) -> Option<Vec<FeedCandidate>> {
        self.0.remove(&tab_id)
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.0.contains_key(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tab_ids(&self) -> impl Iterator<Item = TabId> + '_ {
        self.0.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_session_shape() {
        let json = serde_json::to_string(&TabSession::default()).unwrap();
        assert_eq!(json, r#"{"applicationTabId":null,"lastActiveTabId":0}"#);
    }

    #[test]
    fn test_feed_index_keys_are_decimal_strings() {
        let mut index = FeedIndex::default();
        index.replace(TabId(7), vec![FeedCandidate::from("https://example.com/feed")]);

        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, r#"{"7":[{"href":"https://example.com/feed"}]}"#);

        let parsed: FeedIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_replace_does_not_merge() {
        let mut index = FeedIndex::default();
        index.replace(TabId(3), vec![FeedCandidate::from("https://a.example/rss")]);
        index.replace(TabId(3), vec![FeedCandidate::from("https://b.example/atom")]);

        assert_eq!(
            index.get(TabId(3)),
            Some(&vec![FeedCandidate::from("https://b.example/atom")])
        );
    }
}
