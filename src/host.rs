//! The browser as seen from the background process.

use futures::future::LocalBoxFuture;
use thiserror::Error;

use crate::messages::{FeedsListReply, OutboundMessage};
use crate::storage::TabId;

/// Asynchronous remainder of a handler, resumed later by the event loop.
///
/// A continuation must re-read any state it mutates once it resumes; values
/// captured when it was scheduled may be stale by then.
pub type Continuation<'a> = LocalBoxFuture<'a, ()>;

/// Failures reported by the host. None of them is fatal to the session.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Tab {0} no longer exists")]
    NoSuchTab(TabId),

    #[error("Host request failed: {0}")]
    Request(String),

    #[error("Host disconnected")]
    Disconnected,
}

/// Tab and messaging API of the browser hosting the extension.
///
/// Only tab creation is awaited. Everything else is fire-and-forget: the
/// error, if any, is informational.
#[allow(async_fn_in_trait)]
pub trait BrowserHost {
    async fn create_tab(&self, url: &str) -> Result<TabId, HostError>;

    fn focus_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    /// Navigates the tab back in its history, or closes it if it has none.
    fn go_back_or_close(&self, tab_id: TabId) -> Result<(), HostError>;

    fn post_message(&self, tab_id: TabId, message: &OutboundMessage) -> Result<(), HostError>;

    /// Answers the inbound message identified by `request`.
    fn reply(&self, request: u64, reply: &FeedsListReply) -> Result<(), HostError>;
}
