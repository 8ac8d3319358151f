use serde::de::DeserializeOwned;
use serde::Serialize;

use super::store::StateStore;
use super::types::{FeedIndex, StoreError, TabSession};

/// Store key of the [`TabSession`] record.
pub const SESSION_KEY: &str = "tabSession";
/// Store key of the [`FeedIndex`] record.
pub const FEED_INDEX_KEY: &str = "feedIndex";

/// Owner of the two persisted tab records.
///
/// All access goes through the four accessors. Reads self-heal: when either
/// record is missing or unreadable, both are reset to their empty defaults
/// and written back, so callers never special-case an external wipe.
pub struct SessionRegistry<S> {
    store: S,
}

impl<S: StateStore> SessionRegistry<S> {
    /// Opens the registry for a fresh process start: both records are reset.
    pub fn new(store: S) -> Self {
        let registry = Self { store };
        registry.reset();
        registry
    }

    /// Opens the registry keeping whatever records the store already holds.
    ///
    /// Used when an unloaded background process is restarted and the tabs it
    /// tracked are still open.
    pub fn resume(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get_session(&self) -> TabSession {
        self.recover().0
    }

    pub fn put_session(&self, session: &TabSession) -> Result<(), StoreError> {
        self.write(SESSION_KEY, session)
    }

    pub fn get_feed_index(&self) -> FeedIndex {
        self.recover().1
    }

    pub fn put_feed_index(&self, index: &FeedIndex) -> Result<(), StoreError> {
        self.write(FEED_INDEX_KEY, index)
    }

    fn recover(&self) -> (TabSession, FeedIndex) {
        let session = self.read::<TabSession>(SESSION_KEY);
        let index = self.read::<FeedIndex>(FEED_INDEX_KEY);

        match (session, index) {
            (Some(session), Some(index)) => (session, index),
            (session, index) => {
                tracing::warn!(
                    session_missing = session.is_none(),
                    feed_index_missing = index.is_none(),
                    "Tab records missing or unreadable, resetting to defaults"
                );
                self.reset()
            }
        }
    }

    fn reset(&self) -> (TabSession, FeedIndex) {
        let session = TabSession::default();
        let index = FeedIndex::default();

        if let Err(e) = self.put_session(&session) {
            tracing::warn!(error = %e, "Failed to write default tab session");
        }
        if let Err(e) = self.put_feed_index(&index) {
            tracing::warn!(error = %e, "Failed to write default feed index");
        }

        (session, index)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "Stored record failed to parse");
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FeedCandidate, MemoryStore, TabId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_writes_defaults() {
        let store = MemoryStore::new();
        let _registry = SessionRegistry::new(&store);

        assert_eq!(
            store.get(SESSION_KEY).as_deref(),
            Some(r#"{"applicationTabId":null,"lastActiveTabId":0}"#)
        );
        assert_eq!(store.get(FEED_INDEX_KEY).as_deref(), Some("{}"));
    }

    #[test]
    fn test_new_discards_previous_records() {
        let store = MemoryStore::new();
        store
            .set(SESSION_KEY, r#"{"applicationTabId":4,"lastActiveTabId":2}"#)
            .unwrap();

        let registry = SessionRegistry::new(&store);
        assert_eq!(registry.get_session(), TabSession::default());
    }

    #[test]
    fn test_resume_keeps_previous_records() {
        let store = MemoryStore::new();
        store
            .set(SESSION_KEY, r#"{"applicationTabId":4,"lastActiveTabId":2}"#)
            .unwrap();
        store.set(FEED_INDEX_KEY, "{}").unwrap();

        let registry = SessionRegistry::resume(&store);
        assert_eq!(registry.get_session().application_tab_id, Some(TabId(4)));
        assert_eq!(registry.get_session().last_active_tab_id, TabId(2));
    }

    #[test]
    fn test_session_round_trip() {
        let store = MemoryStore::new();
        let registry = SessionRegistry::new(&store);

        let session = TabSession {
            application_tab_id: Some(TabId(12)),
            last_active_tab_id: TabId(5),
        };
        registry.put_session(&session).unwrap();
        assert_eq!(registry.get_session(), session);
    }

    #[test]
    fn test_feed_index_round_trip() {
        let store = MemoryStore::new();
        let registry = SessionRegistry::new(&store);

        let mut index = FeedIndex::default();
        index.replace(
            TabId(7),
            vec![
                FeedCandidate::from("https://example.com/atom.xml"),
                FeedCandidate::from("https://example.com/rss.xml"),
            ],
        );
        registry.put_feed_index(&index).unwrap();
        assert_eq!(registry.get_feed_index(), index);
    }

    #[test]
    fn test_wiped_store_yields_defaults() {
        let store = MemoryStore::new();
        let registry = SessionRegistry::new(&store);
        registry
            .put_session(&TabSession {
                application_tab_id: Some(TabId(3)),
                last_active_tab_id: TabId(9),
            })
            .unwrap();

        store.clear();

        assert_eq!(registry.get_session(), TabSession::default());
        assert_eq!(registry.get_feed_index(), FeedIndex::default());
        // Defaults were written back
        assert!(store.get(SESSION_KEY).is_some());
        assert!(store.get(FEED_INDEX_KEY).is_some());
    }

    #[test]
    fn test_corrupt_record_resets_both() {
        let store = MemoryStore::new();
        let registry = SessionRegistry::new(&store);

        let mut index = FeedIndex::default();
        index.replace(TabId(1), vec![FeedCandidate::from("https://example.com/feed")]);
        registry.put_feed_index(&index).unwrap();

        store.set(SESSION_KEY, "{not json").unwrap();

        assert_eq!(registry.get_session(), TabSession::default());
        assert!(registry.get_feed_index().is_empty());
    }

    #[test]
    fn test_missing_feed_index_resets_session_too() {
        let store = MemoryStore::new();
        let registry = SessionRegistry::new(&store);
        registry
            .put_session(&TabSession {
                application_tab_id: Some(TabId(3)),
                last_active_tab_id: TabId(9),
            })
            .unwrap();

        store.remove(FEED_INDEX_KEY).unwrap();

        assert_eq!(registry.get_feed_index(), FeedIndex::default());
        assert_eq!(registry.get_session(), TabSession::default());
    }
}
