//! Typed events and messages exchanged with the browser.
//!
//! Every string tag maps to exactly one variant. A payload with an unknown
//! tag fails to deserialize and is logged by the reader instead of being
//! dropped silently.

use serde::{Deserialize, Serialize};

use crate::oauth::LoginButton;
use crate::storage::{FeedCandidate, TabId};

/// Tab load status reported with a tab update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TabStatus {
    Loading,
    Complete,
    /// Any transient status the host may add; never acted upon.
    #[serde(other)]
    Other,
}

impl TabStatus {
    /// Only settled statuses are evaluated, to avoid flapping.
    pub fn is_settled(self) -> bool {
        matches!(self, TabStatus::Loading | TabStatus::Complete)
    }
}

/// Tab lifecycle notifications and toolbar clicks delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    TabCreated { tab_id: TabId },
    TabRemoved { tab_id: TabId },
    TabActivated { tab_id: TabId },
    TabUpdated {
        tab_id: TabId,
        status: TabStatus,
        url: String,
    },
    /// The extension's toolbar icon was clicked while `tab_id` was active.
    IconClicked { tab_id: TabId },
}

/// Who sent an inbound message: the tab and the page URL, when known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    #[serde(default)]
    pub tab_id: Option<TabId>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Messages from content scripts, the authorization tab and the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    /// A page links to one or more feeds.
    FeedIcon { feeds: Vec<FeedCandidate> },
    /// The page itself is a feed document.
    FeedDocument { href: String },
    /// The application tab pulls the feeds of the last active tab.
    GetFeedsList,
    /// The authorization tab captured the redirect fragment.
    OauthConnectToken { content: String },
    /// The authorization tab reports its full redirect URL.
    #[serde(rename = "oauthURL")]
    OauthUrl { content: String },
    /// Login button pressed while logged out.
    OauthLogin,
    /// Login button pressed while logged in.
    OauthLogout,
}

/// Messages pushed to the application tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Feeds of the last active tab; `feed_data` is `null` when none were detected.
    FeedsActivated {
        feed_data: Option<Vec<FeedCandidate>>,
    },
    LoginStatus {
        label: String,
        username: Option<String>,
    },
}

impl From<&LoginButton> for OutboundMessage {
    fn from(button: &LoginButton) -> Self {
        OutboundMessage::LoginStatus {
            label: button.label.clone(),
            username: button.username.clone(),
        }
    }
}

/// Response payload for [`InboundMessage::GetFeedsList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedsListReply {
    pub feed_data: Option<Vec<FeedCandidate>>,
}
