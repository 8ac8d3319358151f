//! Background process: routes host events and messages to their handlers.
//!
//! Handlers run their synchronous part immediately and hand back a
//! [`Continuation`] for anything that waits on the host or the network.
//! [`run`] polls those continuations alongside new envelopes, so a pending
//! tab creation never blocks the next event.

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use url::Url;

use crate::host::{BrowserHost, Continuation};
use crate::messages::{FeedsListReply, HostEvent, InboundMessage, MessageSender, OutboundMessage};
use crate::oauth::{token_fragment, LoginButton, OAuthCoordinator, OAuthError, ProviderClient};
use crate::storage::{SessionRegistry, StateStore};
use crate::tabs::{ActivationController, ApplicationUrls, TabLifecycleMonitor};

/// One unit of work delivered to the background process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Event(HostEvent),
    Message {
        sender: MessageSender,
        /// Set when the sender waits for a reply.
        request: Option<u64>,
        message: InboundMessage,
    },
}

/// Outcome of an inbound message.
#[derive(Default)]
pub struct Handled<'a> {
    pub reply: Option<FeedsListReply>,
    pub continuation: Option<Continuation<'a>>,
}

impl<'a> Handled<'a> {
    fn continuation(continuation: Option<Continuation<'a>>) -> Self {
        Self {
            reply: None,
            continuation,
        }
    }
}

pub struct Background<S, H, P> {
    registry: SessionRegistry<S>,
    host: H,
    monitor: TabLifecycleMonitor,
    activation: ActivationController,
    oauth: OAuthCoordinator<P>,
}

impl<S, H, P> Background<S, H, P>
where
    S: StateStore,
    H: BrowserHost,
    P: ProviderClient,
{
    pub fn new(
        registry: SessionRegistry<S>,
        host: H,
        application_urls: ApplicationUrls,
        application_page: impl Into<String>,
        oauth: OAuthCoordinator<P>,
    ) -> Self {
        Self {
            registry,
            host,
            monitor: TabLifecycleMonitor::new(application_urls),
            activation: ActivationController::new(application_page),
            oauth,
        }
    }

    pub fn registry(&self) -> &SessionRegistry<S> {
        &self.registry
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn oauth(&self) -> &OAuthCoordinator<P> {
        &self.oauth
    }

    pub fn activation(&self) -> &ActivationController {
        &self.activation
    }

    /// Restores a persisted token, if any.
    pub fn startup(&self) -> Option<Continuation<'_>> {
        self.oauth.restore(self.registry.store())
    }

    /// Handles an envelope, sending the reply if the sender asked for one.
    pub fn dispatch(&self, envelope: Envelope) -> Option<Continuation<'_>> {
        match envelope {
            Envelope::Event(event) => self.handle_event(event),
            Envelope::Message {
                sender,
                request,
                message,
            } => {
                let handled = self.handle_message(&sender, message);
                if let Some(reply) = &handled.reply {
                    match request {
                        Some(request) => {
                            if let Err(e) = self.host.reply(request, reply) {
                                tracing::debug!(request, error = %e, "Reply not delivered");
                            }
                        }
                        None => tracing::debug!("Reply dropped, sender did not ask for one"),
                    }
                }
                handled.continuation
            }
        }
    }

    pub fn handle_event(&self, event: HostEvent) -> Option<Continuation<'_>> {
        match event {
            HostEvent::TabCreated { tab_id } => {
                tracing::trace!(tab_id = %tab_id, "Tab created");
                None
            }
            HostEvent::TabRemoved { tab_id } => {
                if let Err(e) = self.monitor.on_tab_removed(&self.registry, tab_id) {
                    tracing::warn!(tab_id = %tab_id, error = %e, "Failed to persist tab removal");
                }
                self.activation.note_tab_removed(tab_id);
                self.oauth.on_tab_removed(tab_id);
                None
            }
            HostEvent::TabActivated { tab_id } => {
                if let Err(e) = self.monitor.on_tab_activated(&self.registry, tab_id) {
                    tracing::warn!(tab_id = %tab_id, error = %e, "Failed to persist tab activation");
                }
                None
            }
            HostEvent::TabUpdated {
                tab_id,
                status,
                url,
            } => {
                if self.activation.is_closing(tab_id) {
                    tracing::debug!(tab_id = %tab_id, "Ignoring update of closing duplicate tab");
                    return None;
                }
                if let Err(e) = self
                    .monitor
                    .on_tab_updated(&self.registry, tab_id, status, &url)
                {
                    tracing::warn!(tab_id = %tab_id, error = %e, "Failed to persist tab update");
                }
                None
            }
            HostEvent::IconClicked { tab_id } => {
                self.activation
                    .activate(&self.registry, &self.host, Some(tab_id))
            }
        }
    }

    pub fn handle_message(&self, sender: &MessageSender, message: InboundMessage) -> Handled<'_> {
        let base = sender.url.as_deref().and_then(|u| Url::parse(u).ok());

        match message {
            InboundMessage::FeedIcon { feeds } => {
                let Some(tab_id) = sender.tab_id else {
                    tracing::warn!("feedIcon message without a sender tab");
                    return Handled::default();
                };
                if let Err(e) =
                    self.monitor
                        .on_feed_icon(&self.registry, tab_id, feeds, base.as_ref())
                {
                    tracing::warn!(tab_id = %tab_id, error = %e, "Failed to persist detected feeds");
                }
                Handled::default()
            }
            InboundMessage::FeedDocument { href } => {
                let Some(tab_id) = sender.tab_id else {
                    tracing::warn!("feedDocument message without a sender tab");
                    return Handled::default();
                };
                match self.activation.handle_feed_document(
                    &self.registry,
                    &self.host,
                    tab_id,
                    &href,
                    base.as_ref(),
                ) {
                    Ok(continuation) => Handled::continuation(continuation),
                    Err(e) => {
                        tracing::warn!(tab_id = %tab_id, error = %e, "Failed to persist feed document");
                        Handled::default()
                    }
                }
            }
            InboundMessage::GetFeedsList => Handled {
                reply: Some(FeedsListReply {
                    feed_data: self.activation.feeds_list(&self.registry),
                }),
                continuation: None,
            },
            InboundMessage::OauthConnectToken { content } => self.complete_authorization(&content),
            InboundMessage::OauthUrl { content } => {
                self.complete_authorization(token_fragment(&content))
            }
            InboundMessage::OauthLogin => match self.oauth.login(&self.host) {
                Ok(continuation) => Handled::continuation(Some(continuation)),
                Err(e) => {
                    log_oauth_error(&e);
                    Handled::default()
                }
            },
            InboundMessage::OauthLogout => {
                self.oauth.logout(&self.host, self.registry.store());
                Handled::default()
            }
        }
    }

    fn complete_authorization(&self, raw: &str) -> Handled<'_> {
        match self
            .oauth
            .complete_authorization(&self.host, self.registry.store(), raw)
        {
            Ok(continuation) => Handled::continuation(Some(continuation)),
            Err(e) => {
                log_oauth_error(&e);
                Handled::default()
            }
        }
    }

    /// Pushes the login button state to the application tab, if one is open.
    pub fn post_login_status(&self, button: &LoginButton) {
        let Some(app_tab) = self.registry.get_session().application_tab_id else {
            return;
        };
        if let Err(e) = self.host.post_message(app_tab, &OutboundMessage::from(button)) {
            tracing::debug!(tab_id = %app_tab, error = %e, "loginStatus not delivered");
        }
    }
}

fn log_oauth_error(error: &OAuthError) {
    match error {
        OAuthError::NoPendingAuthorization => {
            tracing::error!(error = %error, "OAuth protocol misuse, handshake halted");
        }
        _ => tracing::warn!(error = %error, "OAuth request rejected"),
    }
}

/// Runs the background event loop until the inbound channel closes.
///
/// Multiplexes three sources on one task:
/// - **Envelopes**: host events and messages, dispatched in arrival order
/// - **Continuations**: pending tab creations and account probes
/// - **Login button**: every change is forwarded to the application tab
///
/// Continuations still pending when the channel closes are driven to
/// completion before returning.
pub async fn run<S, H, P>(background: &Background<S, H, P>, mut inbound: mpsc::Receiver<Envelope>)
where
    S: StateStore,
    H: BrowserHost,
    P: ProviderClient,
{
    let mut pending: FuturesUnordered<Continuation<'_>> = FuturesUnordered::new();
    let mut login_status = background.oauth().subscribe();

    if let Some(continuation) = background.startup() {
        pending.push(continuation);
    }

    loop {
        tokio::select! {
            envelope = inbound.recv() => {
                let Some(envelope) = envelope else {
                    break;
                };
                if let Some(continuation) = background.dispatch(envelope) {
                    pending.push(continuation);
                }
            }
            Some(()) = pending.next(), if !pending.is_empty() => {}
            Ok(()) = login_status.changed() => {
                let button = login_status.borrow_and_update().clone();
                background.post_login_status(&button);
            }
        }
    }

    tracing::debug!(pending = pending.len(), "Inbound channel closed, draining continuations");
    while pending.next().await.is_some() {}
}
