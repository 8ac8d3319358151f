//! In-process fakes for the browser host and the OAuth provider.
#![allow(dead_code)]

use secrecy::{ExposeSecret, SecretString};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::Notify;
use url::Url;

use feedbridge::background::Background;
use feedbridge::host::{BrowserHost, HostError};
use feedbridge::messages::{FeedsListReply, MessageSender, OutboundMessage};
use feedbridge::oauth::{AccountInfo, OAuthCoordinator, ProviderClient, ProviderError};
use feedbridge::storage::{MemoryStore, SessionRegistry, TabId};
use feedbridge::tabs::ApplicationUrls;

pub const APP_PAGE: &str = "chrome-extension://abcdef/reader.html";
pub const FIREFOX_APP_PAGE: &str = "moz-extension://0123-4567/reader.html";
pub const REDIRECT_URI: &str = "chrome-extension://abcdef/oauth_receiver.html";
pub const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";

/// First id handed out by [`FakeHost::create_tab`].
pub const FIRST_CREATED_TAB: TabId = TabId(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    CreateTab(String),
    Focus(TabId),
    Remove(TabId),
    GoBackOrClose(TabId),
    Post(TabId, OutboundMessage),
    Reply(u64, FeedsListReply),
}

/// Records every host call. Tab creation can be held until released.
pub struct FakeHost {
    calls: RefCell<Vec<HostCall>>,
    next_tab: Cell<i64>,
    gate: Option<Rc<Notify>>,
    fail_focus: Cell<bool>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            next_tab: Cell::new(FIRST_CREATED_TAB.0),
            gate: None,
            fail_focus: Cell::new(false),
        }
    }

    /// Tab creations wait until `gate` is notified.
    pub fn gated(gate: Rc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn fail_focus(&self) {
        self.fail_focus.set(true);
    }
}

impl BrowserHost for FakeHost {
    async fn create_tab(&self, url: &str) -> Result<TabId, HostError> {
        self.calls
            .borrow_mut()
            .push(HostCall::CreateTab(url.to_string()));
        let id = TabId(self.next_tab.get());
        self.next_tab.set(id.0 + 1);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(id)
    }

    fn focus_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.calls.borrow_mut().push(HostCall::Focus(tab_id));
        if self.fail_focus.get() {
            return Err(HostError::NoSuchTab(tab_id));
        }
        Ok(())
    }

    fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.calls.borrow_mut().push(HostCall::Remove(tab_id));
        Ok(())
    }

    fn go_back_or_close(&self, tab_id: TabId) -> Result<(), HostError> {
        self.calls.borrow_mut().push(HostCall::GoBackOrClose(tab_id));
        Ok(())
    }

    fn post_message(&self, tab_id: TabId, message: &OutboundMessage) -> Result<(), HostError> {
        self.calls
            .borrow_mut()
            .push(HostCall::Post(tab_id, message.clone()));
        Ok(())
    }

    fn reply(&self, request: u64, reply: &FeedsListReply) -> Result<(), HostError> {
        self.calls
            .borrow_mut()
            .push(HostCall::Reply(request, reply.clone()));
        Ok(())
    }
}

/// Accepts exactly one access token; account probes can be held until released.
pub struct FakeProvider {
    valid_token: String,
    gate: Option<Rc<Notify>>,
    probes: Cell<usize>,
}

impl FakeProvider {
    pub fn accepting(token: &str) -> Self {
        Self {
            valid_token: token.to_string(),
            gate: None,
            probes: Cell::new(0),
        }
    }

    pub fn gated(token: &str, gate: Rc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::accepting(token)
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.get()
    }
}

impl ProviderClient for FakeProvider {
    fn display_name(&self) -> &str {
        "Dropbox"
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("response_type", "token")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url)
    }

    async fn current_account(
        &self,
        access_token: &SecretString,
    ) -> Result<AccountInfo, ProviderError> {
        self.probes.set(self.probes.get() + 1);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if access_token.expose_secret() == self.valid_token {
            Ok(AccountInfo {
                display_name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
            })
        } else {
            Err(ProviderError::Rejected(401))
        }
    }
}

pub type TestBackground = Background<MemoryStore, FakeHost, FakeProvider>;

pub fn background_with(host: FakeHost, provider: FakeProvider) -> TestBackground {
    Background::new(
        SessionRegistry::new(MemoryStore::new()),
        host,
        ApplicationUrls::new([APP_PAGE, FIREFOX_APP_PAGE]),
        APP_PAGE,
        OAuthCoordinator::new(provider, REDIRECT_URI),
    )
}

pub fn background() -> TestBackground {
    background_with(FakeHost::new(), FakeProvider::accepting("AAA"))
}

pub fn sender(tab: i64, url: &str) -> MessageSender {
    MessageSender {
        tab_id: Some(TabId(tab)),
        url: Some(url.to_string()),
    }
}
