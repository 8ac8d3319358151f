use url::Url;

use crate::messages::TabStatus;
use crate::storage::{FeedCandidate, SessionRegistry, StateStore, StoreError, TabId};
use crate::util::filter_candidates;

/// Exact-match allowlist of the application's own page URLs.
///
/// One entry per host identity the extension is packaged under
/// (e.g. `chrome-extension://<id>/reader.html`). Unlisted URLs never match,
/// including the same page with a query or fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationUrls(Vec<String>);

impl ApplicationUrls {
    pub fn new<I, U>(urls: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        Self(urls.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, url: &str) -> bool {
        self.0.iter().any(|known| known == url)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keeps the tab records in step with host tab events.
///
/// Each handler reads through the registry before mutating and writes the
/// whole record back afterwards.
#[derive(Debug, Clone)]
pub struct TabLifecycleMonitor {
    application_urls: ApplicationUrls,
}

impl TabLifecycleMonitor {
    pub fn new(application_urls: ApplicationUrls) -> Self {
        Self { application_urls }
    }

    pub fn application_urls(&self) -> &ApplicationUrls {
        &self.application_urls
    }

    /// Drops the tab's feeds and ends the application session if it was the app tab.
    pub fn on_tab_removed<S: StateStore>(
        &self,
        registry: &SessionRegistry<S>,
        tab_id: TabId,
    ) -> Result<(), StoreError> {
        let mut index = registry.get_feed_index();
        if index.remove(tab_id).is_some() {
            registry.put_feed_index(&index)?;
            tracing::debug!(tab_id = %tab_id, "Removed feeds of closed tab");
        }

        let mut session = registry.get_session();
        if session.is_application_tab(tab_id) {
            session.application_tab_id = None;
            registry.put_session(&session)?;
            tracing::info!(tab_id = %tab_id, "Application tab closed");
        }

        Ok(())
    }

    /// Records `tab_id` as the last active tab unless it is the application tab.
    pub fn on_tab_activated<S: StateStore>(
        &self,
        registry: &SessionRegistry<S>,
        tab_id: TabId,
    ) -> Result<(), StoreError> {
        let mut session = registry.get_session();
        if session.is_application_tab(tab_id) {
            return Ok(());
        }

        session.last_active_tab_id = tab_id;
        registry.put_session(&session)
    }

    /// Detects navigation into or out of the application inside a tab.
    pub fn on_tab_updated<S: StateStore>(
        &self,
        registry: &SessionRegistry<S>,
        tab_id: TabId,
        status: TabStatus,
        url: &str,
    ) -> Result<(), StoreError> {
        if !status.is_settled() {
            return Ok(());
        }

        let mut session = registry.get_session();
        let is_app_url = self.application_urls.matches(url);

        if session.is_application_tab(tab_id) {
            if !is_app_url {
                session.application_tab_id = None;
                registry.put_session(&session)?;
                tracing::info!(tab_id = %tab_id, "Application tab navigated away");
            }
        } else if is_app_url {
            if let Some(previous) = session.application_tab_id {
                tracing::debug!(
                    previous = %previous,
                    tab_id = %tab_id,
                    "Application opened in another tab, tracking the newest"
                );
            }
            session.application_tab_id = Some(tab_id);
            registry.put_session(&session)?;
            tracing::info!(tab_id = %tab_id, "Application reached by navigation");
        }

        Ok(())
    }

    /// Stores the acceptable candidates a page reported, replacing its entry.
    ///
    /// Returns `true` if anything was stored. A batch with no acceptable
    /// candidate leaves the index untouched.
    pub fn on_feed_icon<S: StateStore>(
        &self,
        registry: &SessionRegistry<S>,
        tab_id: TabId,
        candidates: Vec<FeedCandidate>,
        base: Option<&Url>,
    ) -> Result<bool, StoreError> {
        let detected = candidates.len();
        let accepted = filter_candidates(candidates, base);
        if accepted.is_empty() {
            tracing::debug!(tab_id = %tab_id, detected, "No acceptable feed candidates");
            return Ok(false);
        }

        let mut index = registry.get_feed_index();
        tracing::debug!(
            tab_id = %tab_id,
            detected,
            accepted = accepted.len(),
            "Feeds detected"
        );
        index.replace(tab_id, accepted);
        registry.put_feed_index(&index)?;
        Ok(true)
    }
}
