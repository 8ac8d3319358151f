//! Minimal host and provider doubles for unit tests.

use secrecy::{ExposeSecret, SecretString};
use std::cell::{Cell, RefCell};
use url::Url;

use crate::host::{BrowserHost, HostError};
use crate::messages::{FeedsListReply, OutboundMessage};
use crate::oauth::{AccountInfo, ProviderClient, ProviderError};
use crate::storage::TabId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Create(String),
    Focus(TabId),
    Remove(TabId),
    Back(TabId),
    Post(TabId, OutboundMessage),
    Reply(u64, FeedsListReply),
}

/// Host that records calls and creates tabs 50, 51, ... immediately.
pub struct RecordingHost {
    calls: RefCell<Vec<Recorded>>,
    next_tab: Cell<i64>,
}

impl RecordingHost {
    pub const FIRST_TAB: TabId = TabId(50);

    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            next_tab: Cell::new(Self::FIRST_TAB.0),
        }
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Recorded) -> Result<(), HostError> {
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl BrowserHost for RecordingHost {
    async fn create_tab(&self, url: &str) -> Result<TabId, HostError> {
        self.record(Recorded::Create(url.to_string()))?;
        let id = TabId(self.next_tab.get());
        self.next_tab.set(id.0 + 1);
        Ok(id)
    }

    fn focus_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(Recorded::Focus(tab_id))
    }

    fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(Recorded::Remove(tab_id))
    }

    fn go_back_or_close(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(Recorded::Back(tab_id))
    }

    fn post_message(&self, tab_id: TabId, message: &OutboundMessage) -> Result<(), HostError> {
        self.record(Recorded::Post(tab_id, message.clone()))
    }

    fn reply(&self, request: u64, reply: &FeedsListReply) -> Result<(), HostError> {
        self.record(Recorded::Reply(request, reply.clone()))
    }
}

/// Provider named "Box" that accepts the token `good`.
pub struct StubProvider {
    authorize_url: &'static str,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            authorize_url: "https://auth.example/authorize",
        }
    }

    /// Provider whose login URL cannot be built.
    pub fn broken() -> Self {
        Self {
            authorize_url: "not a url",
        }
    }
}

impl ProviderClient for StubProvider {
    fn display_name(&self) -> &str {
        "Box"
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(self.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url)
    }

    async fn current_account(
        &self,
        access_token: &SecretString,
    ) -> Result<AccountInfo, ProviderError> {
        if access_token.expose_secret() == "good" {
            Ok(AccountInfo {
                display_name: "Grace Hopper".to_string(),
                email: "grace@example.com".to_string(),
            })
        } else {
            Err(ProviderError::Rejected(401))
        }
    }
}
