use std::cell::{Cell, RefCell};
use url::Url;

use crate::host::{BrowserHost, Continuation};
use crate::messages::OutboundMessage;
use crate::storage::{FeedCandidate, SessionRegistry, StateStore, StoreError, TabId};
use crate::util::validate_feed_href;

/// Brings the application tab to the foreground, creating it if needed.
pub struct ActivationController {
    /// URL opened when no application tab exists.
    application_page: String,
    /// True while a tab creation requested by [`activate`](Self::activate) is in flight.
    creating: Cell<bool>,
    /// Tabs removed while a creation was in flight.
    removed_while_creating: RefCell<Vec<TabId>>,
    /// Duplicate application tabs we closed, until their removal is reported.
    closing: RefCell<Vec<TabId>>,
}

impl ActivationController {
    pub fn new(application_page: impl Into<String>) -> Self {
        Self {
            application_page: application_page.into(),
            creating: Cell::new(false),
            removed_while_creating: RefCell::new(Vec::new()),
            closing: RefCell::new(Vec::new()),
        }
    }

    pub fn application_page(&self) -> &str {
        &self.application_page
    }

    pub fn is_creating(&self) -> bool {
        self.creating.get()
    }

    /// Shows the application.
    ///
    /// With an application tab recorded, focuses it and pushes
    /// `feedsActivated` with the last active tab's feeds (explicitly `null`
    /// when there are none). Without one, returns the continuation that
    /// creates the tab and records its id; the caller does not wait for it.
    pub fn activate<'a, S, H>(
        &'a self,
        registry: &'a SessionRegistry<S>,
        host: &'a H,
        requesting: Option<TabId>,
    ) -> Option<Continuation<'a>>
    where
        S: StateStore + 'a,
        H: BrowserHost + 'a,
    {
        let session = registry.get_session();

        let Some(app_tab) = session.application_tab_id else {
            if self.creating.get() {
                tracing::debug!("Application tab creation already pending");
                return None;
            }
            self.creating.set(true);
            self.removed_while_creating.borrow_mut().clear();
            tracing::debug!(requesting = ?requesting, "Creating application tab");

            return Some(Box::pin(async move {
                let created = host.create_tab(&self.application_page).await;
                self.creating.set(false);
                match created {
                    Ok(tab_id) => {
                        if let Err(e) = self.record_created(registry, host, tab_id) {
                            tracing::warn!(tab_id = %tab_id, error = %e, "Failed to record application tab");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to create application tab");
                    }
                }
            }));
        };

        if let Err(e) = host.focus_tab(app_tab) {
            // Session stays as is; the next lifecycle event reconciles it
            tracing::info!(tab_id = %app_tab, error = %e, "Failed to focus application tab");
        }

        let feed_data = registry
            .get_feed_index()
            .get(session.last_active_tab_id)
            .cloned();
        let message = OutboundMessage::FeedsActivated { feed_data };
        if let Err(e) = host.post_message(app_tab, &message) {
            tracing::debug!(tab_id = %app_tab, error = %e, "feedsActivated not delivered");
        }

        None
    }

    /// Records a freshly created application tab, re-reading the session first.
    ///
    /// If another application tab was recorded while the creation was in
    /// flight, that tab wins and the new one is closed.
    fn record_created<S: StateStore, H: BrowserHost>(
        &self,
        registry: &SessionRegistry<S>,
        host: &H,
        tab_id: TabId,
    ) -> Result<(), StoreError> {
        if self.removed_while_creating.borrow_mut().drain(..).any(|id| id == tab_id) {
            tracing::info!(tab_id = %tab_id, "Application tab closed before creation completed");
            return Ok(());
        }

        let mut session = registry.get_session();
        match session.application_tab_id {
            None => {
                session.application_tab_id = Some(tab_id);
                registry.put_session(&session)?;
                tracing::info!(tab_id = %tab_id, "Application tab created");
            }
            Some(current) if current == tab_id => {}
            Some(current) => {
                tracing::info!(
                    tab_id = %tab_id,
                    current = %current,
                    "Application tab opened elsewhere while creating, closing duplicate"
                );
                self.closing.borrow_mut().push(tab_id);
                if let Err(e) = host.remove_tab(tab_id) {
                    tracing::debug!(tab_id = %tab_id, error = %e, "Failed to close duplicate tab");
                }
            }
        }
        Ok(())
    }

    /// Notes a tab removal so an in-flight creation never records a dead tab.
    pub fn note_tab_removed(&self, tab_id: TabId) {
        if self.creating.get() {
            self.removed_while_creating.borrow_mut().push(tab_id);
        }
        self.closing.borrow_mut().retain(|&id| id != tab_id);
    }

    /// True for a duplicate application tab that was closed but not yet reported removed.
    ///
    /// Its late navigation events must not move the session onto it.
    pub fn is_closing(&self, tab_id: TabId) -> bool {
        self.closing.borrow().contains(&tab_id)
    }

    /// Handles a tab whose whole content is a feed document.
    ///
    /// The feed becomes the tab's only candidate and the tab becomes the last
    /// active one. The tab is sent back in its history (or closed) so the
    /// user does not land on the raw document again, and the application is
    /// activated on its subscribe view.
    pub fn handle_feed_document<'a, S, H>(
        &'a self,
        registry: &'a SessionRegistry<S>,
        host: &'a H,
        tab_id: TabId,
        href: &str,
        base: Option<&Url>,
    ) -> Result<Option<Continuation<'a>>, StoreError>
    where
        S: StateStore + 'a,
        H: BrowserHost + 'a,
    {
        let url = match validate_feed_href(href, base) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(tab_id = %tab_id, href, error = %e, "Ignoring feed document");
                return Ok(None);
            }
        };

        let mut index = registry.get_feed_index();
        index.replace(tab_id, vec![FeedCandidate::new(url)]);
        registry.put_feed_index(&index)?;

        let mut session = registry.get_session();
        session.last_active_tab_id = tab_id;
        registry.put_session(&session)?;

        if let Err(e) = host.go_back_or_close(tab_id) {
            tracing::info!(tab_id = %tab_id, error = %e, "Failed to leave feed document");
        }

        Ok(self.activate(registry, host, Some(tab_id)))
    }

    /// Feeds detected on the last active tab, pulled by the application on load.
    pub fn feeds_list<S: StateStore>(
        &self,
        registry: &SessionRegistry<S>,
    ) -> Option<Vec<FeedCandidate>> {
        let session = registry.get_session();
        registry
            .get_feed_index()
            .get(session.last_active_tab_id)
            .cloned()
    }
}
