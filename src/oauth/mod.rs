//! OAuth token handshake with a cloud-storage provider.
//!
//! The provider only accepts a browser tab as its login surface, so the
//! handshake opens a detached authorization tab, waits for it to report the
//! redirect fragment, closes it, then verifies the token with an account
//! probe.
//!
//! - [`coordinator`] - the connection state machine
//! - [`provider`] - the provider API (`ProviderClient`) and its Dropbox client
//! - [`token`] - redirect fragment parsing and the persisted token record

mod coordinator;
mod provider;
mod token;

pub use coordinator::{ConnectionPhase, ConnectionState, LoginButton, OAuthCoordinator, OAuthError};
pub use provider::{AccountInfo, DropboxClient, ProviderClient, ProviderError};
pub use token::{parse_token, token_fragment, ParsedToken};
