use secrecy::{ExposeSecret, SecretString};
use std::cell::RefCell;
use thiserror::Error;
use tokio::sync::watch;

use super::provider::{AccountInfo, ProviderClient, ProviderError};
use super::token::{parse_token, ParsedToken, StoredToken};
use crate::host::{BrowserHost, Continuation};
use crate::storage::{StateStore, TabId};
use crate::util::oauth_state_nonce;

/// Handshake phase of a provider connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPhase {
    #[default]
    LoggedOut,
    /// Authorization tab requested or open, waiting for its completion signal.
    AwaitingAuthorization,
    TokenReceived,
    Verifying,
    Authenticated,
}

/// Connection to one OAuth provider.
#[derive(Debug, Default)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub raw_token: Option<SecretString>,
    pub parsed_token: ParsedToken,
    /// Set only while the authorization tab is open.
    pub authorization_tab_id: Option<TabId>,
    pub account: Option<AccountInfo>,
    /// Bumped by every transition that invalidates in-flight continuations.
    generation: u64,
}

impl ConnectionState {
    pub fn authenticated(&self) -> bool {
        self.phase == ConnectionPhase::Authenticated
    }
}

/// What the login button currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginButton {
    pub label: String,
    pub username: Option<String>,
}

#[derive(Debug, Error)]
pub enum OAuthError {
    /// A login was requested while an authorization tab is pending.
    #[error("An authorization is already in progress")]
    AuthorizationPending,

    #[error("Already connected")]
    AlreadyConnected,

    /// A completion signal arrived with no authorization tab recorded.
    #[error("Authorization completed with no pending authorization tab")]
    NoPendingAuthorization,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Drives the token handshake through a detached authorization tab.
///
/// At most one handshake is in flight. Every transition republishes the
/// login button on a `watch` channel.
pub struct OAuthCoordinator<P> {
    provider: P,
    redirect_uri: String,
    state: RefCell<ConnectionState>,
    button: watch::Sender<LoginButton>,
}

impl<P: ProviderClient> OAuthCoordinator<P> {
    pub fn new(provider: P, redirect_uri: impl Into<String>) -> Self {
        let button = logged_out_button(provider.display_name());
        let (button, _) = watch::channel(button);
        Self {
            provider,
            redirect_uri: redirect_uri.into(),
            state: RefCell::new(ConnectionState::default()),
            button,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn subscribe(&self) -> watch::Receiver<LoginButton> {
        self.button.subscribe()
    }

    pub fn login_button(&self) -> LoginButton {
        self.button.borrow().clone()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.borrow().phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().authenticated()
    }

    pub fn authorization_tab_id(&self) -> Option<TabId> {
        self.state.borrow().authorization_tab_id
    }

    pub fn account(&self) -> Option<AccountInfo> {
        self.state.borrow().account.clone()
    }

    pub fn account_id(&self) -> Option<String> {
        self.state.borrow().parsed_token.account_id.clone()
    }

    pub fn has_access_token(&self) -> bool {
        self.state.borrow().parsed_token.access_token.is_some()
    }

    pub fn has_raw_token(&self) -> bool {
        self.state.borrow().raw_token.is_some()
    }

    /// Store key of the persisted token record, e.g. `dropbox.token`.
    pub fn token_key(&self) -> String {
        format!("{}.token", self.provider.display_name().to_lowercase())
    }

    /// Opens the authorization tab.
    ///
    /// The phase moves to `AwaitingAuthorization` before the tab exists, so a
    /// second login is refused while the first is still opening.
    ///
    /// # Errors
    ///
    /// - [`OAuthError::AuthorizationPending`] if a handshake is in flight
    /// - [`OAuthError::AlreadyConnected`] if a token is held or being verified
    /// - [`OAuthError::Provider`] if the login URL cannot be built
    pub fn login<'a, H>(&'a self, host: &'a H) -> Result<Continuation<'a>, OAuthError>
    where
        H: BrowserHost + 'a,
    {
        let generation = {
            let mut state = self.state.borrow_mut();
            match state.phase {
                ConnectionPhase::LoggedOut => {}
                ConnectionPhase::AwaitingAuthorization => {
                    return Err(OAuthError::AuthorizationPending)
                }
                _ => return Err(OAuthError::AlreadyConnected),
            }
            state.phase = ConnectionPhase::AwaitingAuthorization;
            state.generation += 1;
            state.generation
        };

        let nonce = oauth_state_nonce(&self.redirect_uri);
        let url = match self.provider.authorization_url(&self.redirect_uri, &nonce) {
            Ok(url) => url,
            Err(e) => {
                self.reset_to_logged_out();
                return Err(e.into());
            }
        };
        self.publish();
        tracing::info!(provider = self.provider.display_name(), "Opening authorization tab");

        Ok(Box::pin(async move {
            let created = host.create_tab(url.as_str()).await;

            let orphan = {
                let mut state = self.state.borrow_mut();
                let current = state.generation == generation
                    && state.phase == ConnectionPhase::AwaitingAuthorization;
                match created {
                    Ok(tab_id) if current => {
                        state.authorization_tab_id = Some(tab_id);
                        tracing::debug!(tab_id = %tab_id, "Authorization tab open");
                        None
                    }
                    Ok(tab_id) => Some(tab_id),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to open authorization tab");
                        if current {
                            state.phase = ConnectionPhase::LoggedOut;
                            state.generation += 1;
                        }
                        None
                    }
                }
            };

            if let Some(tab_id) = orphan {
                tracing::info!(tab_id = %tab_id, "Handshake abandoned while opening, closing tab");
                if let Err(e) = host.remove_tab(tab_id) {
                    tracing::debug!(tab_id = %tab_id, error = %e, "Failed to close orphan tab");
                }
            }
            self.publish();
        }))
    }

    /// Processes the completion signal of the authorization tab.
    ///
    /// Closes the tab, persists and parses the raw token, then returns the
    /// verification continuation.
    ///
    /// # Errors
    ///
    /// [`OAuthError::NoPendingAuthorization`] if no authorization tab is
    /// recorded. Nothing is changed in that case.
    pub fn complete_authorization<'a, S, H>(
        &'a self,
        host: &'a H,
        store: &'a S,
        raw: &str,
    ) -> Result<Continuation<'a>, OAuthError>
    where
        S: StateStore + 'a,
        H: BrowserHost + 'a,
    {
        let tab_id = self
            .state
            .borrow()
            .authorization_tab_id
            .ok_or(OAuthError::NoPendingAuthorization)?;

        if let Err(e) = host.remove_tab(tab_id) {
            tracing::info!(tab_id = %tab_id, error = %e, "Failed to close authorization tab");
        }

        self.persist_token(store, raw);
        {
            let mut state = self.state.borrow_mut();
            state.authorization_tab_id = None;
            self.receive_token(&mut state, raw);
        }
        self.publish();
        tracing::info!("Authorization token received");

        Ok(self.verify(store))
    }

    /// Resumes a connection from a persisted token, skipping the authorization tab.
    pub fn restore<'a, S>(&'a self, store: &'a S) -> Option<Continuation<'a>>
    where
        S: StateStore + 'a,
    {
        if self.phase() != ConnectionPhase::LoggedOut {
            return None;
        }

        let key = self.token_key();
        let raw = store.get(&key)?;
        let stored: StoredToken = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding unreadable stored token");
                if let Err(e) = store.remove(&key) {
                    tracing::warn!(key = %key, error = %e, "Failed to remove stored token");
                }
                return None;
            }
        };

        tracing::info!(stored_at = %stored.stored_at, "Restoring stored token");
        {
            let mut state = self.state.borrow_mut();
            self.receive_token(&mut state, &stored.raw);
        }
        self.publish();

        Some(self.verify(store))
    }

    /// Forgets the token in memory and in the store. No network round-trip.
    pub fn logout<S, H>(&self, host: &H, store: &S)
    where
        S: StateStore,
        H: BrowserHost,
    {
        let open_tab = self.state.borrow().authorization_tab_id;
        if let Some(tab_id) = open_tab {
            if let Err(e) = host.remove_tab(tab_id) {
                tracing::debug!(tab_id = %tab_id, error = %e, "Failed to close authorization tab");
            }
        }

        self.clear_token(store);
        tracing::info!(provider = self.provider.display_name(), "Logged out");
    }

    /// Treats closing the authorization tab as cancelling the handshake.
    ///
    /// Returns `true` if `tab_id` was the authorization tab.
    pub fn on_tab_removed(&self, tab_id: TabId) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.authorization_tab_id != Some(tab_id) {
                return false;
            }
            state.authorization_tab_id = None;
            state.phase = ConnectionPhase::LoggedOut;
            state.generation += 1;
        }
        tracing::info!(tab_id = %tab_id, "Authorization tab closed, handshake cancelled");
        self.publish();
        true
    }

    fn receive_token(&self, state: &mut ConnectionState, raw: &str) {
        state.raw_token = Some(SecretString::from(raw.to_owned()));
        state.parsed_token = parse_token(raw);
        state.account = None;
        state.phase = ConnectionPhase::TokenReceived;
        state.generation += 1;
    }

    /// Probes the account with the parsed token.
    fn verify<'a, S>(&'a self, store: &'a S) -> Continuation<'a>
    where
        S: StateStore + 'a,
    {
        let generation = self.state.borrow().generation;

        Box::pin(async move {
            let token = {
                let mut state = self.state.borrow_mut();
                if state.generation != generation {
                    return;
                }
                state.phase = ConnectionPhase::Verifying;
                state
                    .parsed_token
                    .access_token
                    .as_ref()
                    .map(|t| SecretString::from(t.expose_secret().to_owned()))
            };
            self.publish();

            let result = match token {
                Some(token) => self.provider.current_account(&token).await,
                None => Err(ProviderError::MissingAccessToken),
            };

            if self.state.borrow().generation != generation {
                tracing::debug!("Discarding stale verification result");
                return;
            }

            match result {
                Ok(account) => {
                    tracing::info!(
                        provider = self.provider.display_name(),
                        display_name = %account.display_name,
                        "Connected"
                    );
                    let mut state = self.state.borrow_mut();
                    state.account = Some(account);
                    state.phase = ConnectionPhase::Authenticated;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Token verification failed, logging out");
                    self.clear_token(store);
                    return;
                }
            }
            self.publish();
        })
    }

    fn clear_token<S: StateStore>(&self, store: &S) {
        let key = self.token_key();
        if let Err(e) = store.remove(&key) {
            tracing::warn!(key = %key, error = %e, "Failed to remove stored token");
        }
        self.reset_to_logged_out();
    }

    fn reset_to_logged_out(&self) {
        {
            let mut state = self.state.borrow_mut();
            let generation = state.generation + 1;
            *state = ConnectionState {
                generation,
                ..ConnectionState::default()
            };
        }
        self.publish();
    }

    fn persist_token<S: StateStore>(&self, store: &S, raw: &str) {
        let key = self.token_key();
        let result = serde_json::to_string(&StoredToken::new(raw))
            .map_err(Into::into)
            .and_then(|record| store.set(&key, &record));
        if let Err(e) = result {
            tracing::warn!(key = %key, error = %e, "Failed to persist token");
        }
    }

    fn publish(&self) {
        let button = {
            let state = self.state.borrow();
            match state.phase {
                ConnectionPhase::LoggedOut => logged_out_button(self.provider.display_name()),
                ConnectionPhase::Authenticated => LoginButton {
                    label: "Logout →".to_string(),
                    username: state.account.as_ref().map(|a| a.email.clone()),
                },
                ConnectionPhase::AwaitingAuthorization
                | ConnectionPhase::TokenReceived
                | ConnectionPhase::Verifying => LoginButton {
                    label: "(Connecting...)".to_string(),
                    username: None,
                },
            }
        };
        self.button.send_if_modified(|current| {
            if *current == button {
                return false;
            }
            *current = button;
            true
        });
    }
}

fn logged_out_button(provider: &str) -> LoginButton {
    LoginButton {
        label: format!("Login ({})", provider),
        username: None,
    }
}
