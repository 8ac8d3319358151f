//! Newline-delimited JSON bridge between the browser and the background process.
//!
//! The browser side writes one [`Frame`] per line to stdin and reads one
//! [`Command`] per line from stdout. Tab creation is the only request that
//! expects an answer; it is correlated by a request number.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};

use crate::background::Envelope;
use crate::host::{BrowserHost, HostError};
use crate::messages::{FeedsListReply, HostEvent, InboundMessage, MessageSender, OutboundMessage};
use crate::storage::TabId;

/// Frames longer than this are dropped unread.
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// One line of input from the browser side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Frame {
    Event {
        event: HostEvent,
    },
    Message {
        #[serde(default)]
        sender: MessageSender,
        #[serde(default)]
        request: Option<u64>,
        message: InboundMessage,
    },
    TabCreated {
        request: u64,
        tab_id: TabId,
    },
    TabCreateFailed {
        request: u64,
        error: String,
    },
}

/// One line of output to the browser side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    CreateTab { request: u64, url: String },
    FocusTab { tab_id: TabId },
    RemoveTab { tab_id: TabId },
    GoBackOrClose { tab_id: TabId },
    PostMessage { tab_id: TabId, message: OutboundMessage },
    Reply { request: u64, reply: FeedsListReply },
}

type TabReply = Result<TabId, String>;

/// Tab creations waiting for their `tabCreated` frame.
///
/// Shared between the host (which registers requests) and the frame reader
/// (which resolves them), possibly on another task.
#[derive(Debug, Clone, Default)]
pub struct PendingReplies(Arc<Mutex<HashMap<u64, oneshot::Sender<TabReply>>>>);

impl PendingReplies {
    fn register(&self, request: u64) -> oneshot::Receiver<TabReply> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(request, tx);
        rx
    }

    fn forget(&self, request: u64) {
        self.lock().remove(&request);
    }

    pub fn resolve(&self, request: u64, reply: TabReply) {
        match self.lock().remove(&request) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => tracing::warn!(request, "Reply for unknown tab request"),
        }
    }

    /// Fails every outstanding request; the browser side is gone.
    pub fn disconnect(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<TabReply>>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// [`BrowserHost`] that writes [`Command`] lines to `out`.
pub struct StdioHost<W> {
    out: RefCell<W>,
    pending: PendingReplies,
    next_request: Cell<u64>,
}

impl<W: Write> StdioHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
            pending: PendingReplies::default(),
            next_request: Cell::new(1),
        }
    }

    pub fn pending_replies(&self) -> PendingReplies {
        self.pending.clone()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn emit(&self, command: &Command) -> Result<(), HostError> {
        let line = serde_json::to_string(command).map_err(|e| HostError::Request(e.to_string()))?;
        let mut out = self.out.borrow_mut();
        writeln!(out, "{}", line)
            .and_then(|_| out.flush())
            .map_err(|e| HostError::Request(e.to_string()))
    }
}

impl<W: Write> BrowserHost for StdioHost<W> {
    async fn create_tab(&self, url: &str) -> Result<TabId, HostError> {
        let request = self.next_request.get();
        self.next_request.set(request + 1);

        let reply = self.pending.register(request);
        if let Err(e) = self.emit(&Command::CreateTab {
            request,
            url: url.to_string(),
        }) {
            self.pending.forget(request);
            return Err(e);
        }

        match reply.await {
            Ok(Ok(tab_id)) => Ok(tab_id),
            Ok(Err(error)) => Err(HostError::Request(error)),
            Err(_) => Err(HostError::Disconnected),
        }
    }

    fn focus_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.emit(&Command::FocusTab { tab_id })
    }

    fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.emit(&Command::RemoveTab { tab_id })
    }

    fn go_back_or_close(&self, tab_id: TabId) -> Result<(), HostError> {
        self.emit(&Command::GoBackOrClose { tab_id })
    }

    fn post_message(&self, tab_id: TabId, message: &OutboundMessage) -> Result<(), HostError> {
        self.emit(&Command::PostMessage {
            tab_id,
            message: message.clone(),
        })
    }

    fn reply(&self, request: u64, reply: &FeedsListReply) -> Result<(), HostError> {
        self.emit(&Command::Reply {
            request,
            reply: reply.clone(),
        })
    }
}

/// Outcome of reading one line with [`read_bounded_line`].
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// A complete line is in the buffer, without its terminator.
    Line,
    /// The line exceeded the limit; its bytes were consumed and discarded.
    Oversized(usize),
    Eof,
}

/// Reads one `\n`-terminated line into `buf`, holding at most `limit` bytes.
///
/// Bytes past the limit are consumed from the reader as they arrive and
/// never buffered, so a runaway line costs no more memory than a valid one.
async fn read_bounded_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut total: usize = 0;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match total {
                0 => LineRead::Eof,
                n if n > limit => LineRead::Oversized(n),
                _ => LineRead::Line,
            });
        }

        let (chunk_len, terminated) = match available.iter().position(|&b| b == b'\n') {
            Some(idx) => (idx, true),
            None => (available.len(), false),
        };

        if total.saturating_add(chunk_len) <= limit {
            buf.extend_from_slice(&available[..chunk_len]);
        } else if !buf.is_empty() {
            buf.clear();
            buf.shrink_to_fit();
        }
        total = total.saturating_add(chunk_len);
        reader.consume(chunk_len + usize::from(terminated));

        if terminated {
            return Ok(if total > limit {
                LineRead::Oversized(total)
            } else {
                LineRead::Line
            });
        }
    }
}

/// Reads frames until EOF, resolving tab replies and forwarding the rest.
///
/// Unreadable or oversized lines are logged and skipped. On EOF every
/// outstanding tab request fails with [`HostError::Disconnected`].
pub async fn read_frames<R>(
    mut reader: R,
    replies: PendingReplies,
    envelopes: mpsc::Sender<Envelope>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let result = loop {
        match read_bounded_line(&mut reader, &mut buf, MAX_FRAME_LEN).await {
            Ok(LineRead::Line) => {}
            Ok(LineRead::Oversized(len)) => {
                tracing::warn!(len, max = MAX_FRAME_LEN, "Dropping oversized frame");
                continue;
            }
            Ok(LineRead::Eof) => break Ok(()),
            Err(e) => break Err(e),
        }

        let Ok(line) = std::str::from_utf8(&buf) else {
            tracing::warn!(len = buf.len(), "Dropping frame that is not UTF-8");
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let envelope = match serde_json::from_str::<Frame>(line) {
            Ok(Frame::Event { event }) => Envelope::Event(event),
            Ok(Frame::Message {
                sender,
                request,
                message,
            }) => Envelope::Message {
                sender,
                request,
                message,
            },
            Ok(Frame::TabCreated { request, tab_id }) => {
                replies.resolve(request, Ok(tab_id));
                continue;
            }
            Ok(Frame::TabCreateFailed { request, error }) => {
                replies.resolve(request, Err(error));
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unreadable frame");
                continue;
            }
        };

        if envelopes.send(envelope).await.is_err() {
            tracing::debug!("Background loop gone, stopping frame reader");
            break Ok(());
        }
    };

    replies.disconnect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::TabStatus;
    use pretty_assertions::assert_eq;

    fn written_lines(host: StdioHost<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(host.into_inner())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_fire_and_forget_commands() {
        let host = StdioHost::new(Vec::new());
        host.focus_tab(TabId(3)).unwrap();
        host.go_back_or_close(TabId(9)).unwrap();
        host.post_message(TabId(3), &OutboundMessage::FeedsActivated { feed_data: None })
            .unwrap();

        assert_eq!(
            written_lines(host),
            vec![
                serde_json::json!({"command": "focusTab", "tabId": 3}),
                serde_json::json!({"command": "goBackOrClose", "tabId": 9}),
                serde_json::json!({
                    "command": "postMessage",
                    "tabId": 3,
                    "message": {"type": "feedsActivated", "feedData": null}
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_tab_resolved_by_reply() {
        let host = StdioHost::new(Vec::new());
        let replies = host.pending_replies();

        let create = host.create_tab("chrome-extension://abc/reader.html");
        let resolve = async {
            tokio::task::yield_now().await;
            replies.resolve(1, Ok(TabId(42)));
        };
        let (created, ()) = tokio::join!(create, resolve);

        assert_eq!(created.unwrap(), TabId(42));
        assert!(replies.is_empty());
        assert_eq!(
            written_lines(host),
            vec![serde_json::json!({
                "command": "createTab",
                "request": 1,
                "url": "chrome-extension://abc/reader.html"
            })]
        );
    }

    #[tokio::test]
    async fn test_create_tab_fails_on_disconnect() {
        let host = StdioHost::new(Vec::new());
        let replies = host.pending_replies();

        let create = host.create_tab("chrome-extension://abc/reader.html");
        let disconnect = async {
            tokio::task::yield_now().await;
            replies.disconnect();
        };
        let (created, ()) = tokio::join!(create, disconnect);

        assert!(matches!(created, Err(HostError::Disconnected)));
    }

    #[tokio::test]
    async fn test_read_frames_routes_events_and_replies() {
        let input = concat!(
            r#"{"frame":"event","event":{"type":"tabActivated","tabId":5}}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"frame":"tabCreated","request":7,"tabId":11}"#,
            "\n",
            r#"{"frame":"message","sender":{"tabId":5,"url":"https://example.com/"},"request":2,"message":{"type":"getFeedsList"}}"#,
            "\n",
            r#"{"frame":"event","event":{"type":"tabUpdated","tabId":5,"status":"complete","url":"https://example.com/"}}"#,
            "\n",
        );

        let replies = PendingReplies::default();
        let pending_tab = replies.register(7);
        let (tx, mut rx) = mpsc::channel(8);

        read_frames(input.as_bytes(), replies.clone(), tx).await.unwrap();

        assert_eq!(pending_tab.await.unwrap(), Ok(TabId(11)));
        assert_eq!(
            rx.recv().await,
            Some(Envelope::Event(HostEvent::TabActivated { tab_id: TabId(5) }))
        );
        assert_eq!(
            rx.recv().await,
            Some(Envelope::Message {
                sender: MessageSender {
                    tab_id: Some(TabId(5)),
                    url: Some("https://example.com/".to_string()),
                },
                request: Some(2),
                message: InboundMessage::GetFeedsList,
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(Envelope::Event(HostEvent::TabUpdated {
                tab_id: TabId(5),
                status: TabStatus::Complete,
                url: "https://example.com/".to_string(),
            }))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_frames_unknown_message_type_skipped() {
        let input = concat!(
            r#"{"frame":"message","sender":{"tabId":1},"message":{"type":"mystery"}}"#,
            "\n",
        );
        let (tx, mut rx) = mpsc::channel(8);

        read_frames(input.as_bytes(), PendingReplies::default(), tx)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_eof_disconnects_pending_requests() {
        let replies = PendingReplies::default();
        let pending_tab = replies.register(1);
        let (tx, _rx) = mpsc::channel(8);

        read_frames(&b""[..], replies.clone(), tx).await.unwrap();
        assert!(pending_tab.await.is_err());
    }

    #[tokio::test]
    async fn test_bounded_line_discards_overflow_without_buffering() {
        let mut input = vec![b'x'; 64];
        input.extend_from_slice(b"\nok\n");
        // Small capacity forces the long line across several fill_buf calls
        let mut reader = tokio::io::BufReader::with_capacity(8, &input[..]);
        let mut buf = Vec::new();

        let first = read_bounded_line(&mut reader, &mut buf, 16).await.unwrap();
        assert_eq!(first, LineRead::Oversized(64));
        assert!(buf.len() <= 16);

        let second = read_bounded_line(&mut reader, &mut buf, 16).await.unwrap();
        assert_eq!(second, LineRead::Line);
        assert_eq!(buf, b"ok");

        let third = read_bounded_line(&mut reader, &mut buf, 16).await.unwrap();
        assert_eq!(third, LineRead::Eof);
    }

    #[tokio::test]
    async fn test_bounded_line_accepts_unterminated_last_line() {
        let mut reader = &b"tail"[..];
        let mut buf = Vec::new();

        let read = read_bounded_line(&mut reader, &mut buf, 16).await.unwrap();
        assert_eq!(read, LineRead::Line);
        assert_eq!(buf, b"tail");
    }

    #[tokio::test]
    async fn test_read_frames_skips_oversized_frame() {
        let mut input = String::from(r#"{"frame":"event","event":{"type":"tabActivated","tabId":1,"pad":""#);
        input.push_str(&"a".repeat(MAX_FRAME_LEN));
        input.push_str("\"}}\n");
        input.push_str(r#"{"frame":"event","event":{"type":"tabActivated","tabId":2}}"#);
        input.push('\n');
        let (tx, mut rx) = mpsc::channel(8);

        read_frames(input.as_bytes(), PendingReplies::default(), tx)
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(Envelope::Event(HostEvent::TabActivated { tab_id: TabId(2) }))
        );
        assert_eq!(rx.recv().await, None);
    }
}
