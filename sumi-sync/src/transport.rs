//! Persistent WebSocket connection to the computation backend.
//!
//! One [`BackendClient`] per process: it frames outgoing calls, matches
//! response ids to pending callers, fans notifications out to
//! subscribers and owns the reconnect policy. Nothing else touches the
//! socket or the request-id state; the queues reach it only through the
//! [`crate::invoker::RpcTransport`] seam.
//!
//! ```text
//! invoke() ──┐                        ┌──> pending map ──> caller
//!            ├──> writer task ── ws ──┤
//! backlog ───┘    (mpsc drain)        └──> subscribers (typed fan-out)
//! ```
//!
//! Calls issued while the socket is still opening are parked in a FIFO
//! backlog and flushed the instant the connection opens. When the
//! connection drops, every pending and parked call rejects with
//! [`SyncError::Closed`] and a single reconnect attempt is scheduled,
//! unless [`BackendClient::close`] was called.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

use crate::error::{Result, SyncError};
use crate::invoker::RpcTransport;
use crate::protocol::{
    response_result, Envelope, Notification, NotificationKind, RequestId,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend endpoint.
    pub url: String,
    /// Delay before the single reconnect attempt after an unexpected
    /// closure.
    pub reconnect_delay: Duration,
    /// Maximum inbound frame size; documents and rendered patches can
    /// be large.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9100/rpc".to_string(),
            reconnect_delay: Duration::from_secs(1),
            max_frame_size: 1024 * 1024 * 1024,
        }
    }
}

/// Connection lifecycle. `Closed` is terminal: only an explicit
/// [`BackendClient::close`] (or drop) reaches it, and no reconnect is
/// attempted from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

struct Inner {
    state: ConnectionState,
    /// Next request id; starts at 1 and is never reused. (The backend
    /// answers undecodable frames with id 0.)
    next_id: RequestId,
    pending: HashMap<RequestId, oneshot::Sender<Result<Vec<u8>>>>,
    /// Frames parked while `Connecting`, flushed FIFO on open.
    backlog: VecDeque<Vec<u8>>,
    outgoing: Option<mpsc::UnboundedSender<Vec<u8>>>,
    /// Distinguishes the live socket's tasks from a dead socket's tail.
    conn_epoch: u64,
    subscribers: HashMap<NotificationKind, Vec<(u64, mpsc::UnboundedSender<Notification>)>>,
    next_sub_id: u64,
    reconnect: Option<tokio::task::JoinHandle<()>>,
}

pub struct BackendClient {
    config: ClientConfig,
    inner: Arc<Mutex<Inner>>,
}

impl BackendClient {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                next_id: 1,
                pending: HashMap::new(),
                backlog: VecDeque::new(),
                outgoing: None,
                conn_epoch: 0,
                subscribers: HashMap::new(),
                next_sub_id: 0,
                reconnect: None,
            })),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state
    }

    /// Opens the connection. Idempotent: while already open or opening
    /// this returns immediately; after [`Self::close`] it fails.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                ConnectionState::Open | ConnectionState::Connecting => return Ok(()),
                ConnectionState::Closing | ConnectionState::Closed => {
                    return Err(SyncError::Closed)
                }
                ConnectionState::Disconnected => {
                    if let Some(timer) = inner.reconnect.take() {
                        timer.abort();
                    }
                    inner.state = ConnectionState::Connecting;
                }
            }
        }

        let ws_config = WebSocketConfig::default()
            .max_message_size(Some(self.config.max_frame_size))
            .max_frame_size(Some(self.config.max_frame_size));

        match connect_async_with_config(&self.config.url, Some(ws_config), false).await {
            Ok((socket, _)) => {
                let (ws_writer, ws_reader) = socket.split();
                let (out_tx, out_rx) = mpsc::unbounded_channel::<Vec<u8>>();

                let epoch = {
                    let mut inner = self.inner.lock().unwrap();
                    if inner.state != ConnectionState::Connecting {
                        // close() won the race while the handshake ran.
                        return Err(SyncError::Closed);
                    }
                    inner.state = ConnectionState::Open;
                    inner.conn_epoch += 1;
                    for frame in inner.backlog.drain(..) {
                        let _ = out_tx.send(frame);
                    }
                    inner.outgoing = Some(out_tx);
                    inner.conn_epoch
                };

                log::info!("backend connection open: {}", self.config.url);
                tokio::spawn(run_writer(ws_writer, out_rx));
                tokio::spawn(run_reader(Arc::downgrade(self), self.inner.clone(), ws_reader, epoch));
                Ok(())
            }
            Err(e) => {
                log::warn!("backend connect failed: {e}");
                let rejected = {
                    let mut inner = self.inner.lock().unwrap();
                    if inner.state != ConnectionState::Connecting {
                        Vec::new()
                    } else {
                        inner.state = ConnectionState::Disconnected;
                        take_waiters(&mut inner)
                    }
                };
                for sender in rejected {
                    let _ = sender.send(Err(SyncError::Closed));
                }
                self.schedule_reconnect();
                Err(SyncError::Connect(e.to_string()))
            }
        }
    }

    /// Sends a request and resolves with the matching response, or
    /// rejects when the connection drops first. No per-call timeout
    /// exists: an unanswered call waits until disconnect.
    pub async fn invoke(&self, method: &str, params: Option<Vec<u8>>) -> Result<Vec<u8>> {
        Self::invoke_on(self.inner.clone(), method, params).await
    }

    async fn invoke_on(
        inner: Arc<Mutex<Inner>>,
        method: &str,
        params: Option<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let rx = {
            let mut inner = inner.lock().unwrap();
            match inner.state {
                ConnectionState::Open | ConnectionState::Connecting => {}
                ConnectionState::Disconnected => return Err(SyncError::NotConnected),
                ConnectionState::Closing | ConnectionState::Closed => {
                    return Err(SyncError::Closed)
                }
            }
            let id = inner.next_id;
            inner.next_id += 1;
            let frame = Envelope::request(id, method, params).encode()?;
            let (tx, rx) = oneshot::channel();
            inner.pending.insert(id, tx);
            match inner.state {
                ConnectionState::Open => {
                    // A dead writer surfaces through the reader's
                    // disconnect handling, which rejects this entry.
                    if let Some(out) = &inner.outgoing {
                        let _ = out.send(frame);
                    }
                }
                ConnectionState::Connecting => inner.backlog.push_back(frame),
                _ => unreachable!(),
            }
            rx
        };
        rx.await.unwrap_or(Err(SyncError::Closed))
    }

    /// Registers a listener for one notification stream. Each
    /// subscription is independent; dropping it removes exactly that
    /// listener.
    pub fn subscribe(&self, kind: NotificationKind) -> NotificationSub {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_sub_id;
            inner.next_sub_id += 1;
            inner.subscribers.entry(kind).or_default().push((id, tx));
            id
        };
        NotificationSub {
            id,
            kind,
            rx,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Closes the connection for good: rejects everything in flight,
    /// cancels any reconnect timer and refuses further connects.
    pub fn close(&self) {
        let rejected = {
            let mut inner = self.inner.lock().unwrap();
            if matches!(inner.state, ConnectionState::Closing | ConnectionState::Closed) {
                return;
            }
            if let Some(timer) = inner.reconnect.take() {
                timer.abort();
            }
            let had_socket = inner.outgoing.take().is_some();
            inner.state = if had_socket {
                // The reader notices the socket dying and finishes the
                // transition to Closed.
                ConnectionState::Closing
            } else {
                ConnectionState::Closed
            };
            take_waiters(&mut inner)
        };
        for sender in rejected {
            let _ = sender.send(Err(SyncError::Closed));
        }
    }

    /// Reacts to the socket dying: rejects all waiters and, unless the
    /// closure was requested, schedules exactly one reconnect attempt.
    fn handle_disconnect(self: &Arc<Self>, epoch: u64) {
        let (rejected, reconnect) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.conn_epoch != epoch {
                // A previous socket's tail; the live connection already
                // superseded it.
                return;
            }
            inner.outgoing = None;
            let rejected = take_waiters(&mut inner);
            let reconnect = match inner.state {
                ConnectionState::Closing | ConnectionState::Closed => {
                    inner.state = ConnectionState::Closed;
                    false
                }
                _ => {
                    inner.state = ConnectionState::Disconnected;
                    true
                }
            };
            (rejected, reconnect)
        };
        for sender in rejected {
            let _ = sender.send(Err(SyncError::Closed));
        }
        if reconnect {
            log::warn!(
                "backend connection lost; retrying in {:?}",
                self.config.reconnect_delay
            );
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let delay = self.config.reconnect_delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(client) = weak.upgrade() {
                // Detach our own handle first so connect() cannot abort
                // the task that is running it.
                drop(client.inner.lock().unwrap().reconnect.take());
                if let Err(e) = client.connect().await {
                    log::warn!("reconnect attempt failed: {e}");
                }
            }
        });
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, ConnectionState::Closing | ConnectionState::Closed) {
            // close() raced us; never reconnect past it.
            timer.abort();
            return;
        }
        if let Some(old) = inner.reconnect.replace(timer) {
            old.abort();
        }
    }
}

impl Drop for BackendClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl RpcTransport for BackendClient {
    fn call(
        &self,
        method: &'static str,
        params: Option<Vec<u8>>,
    ) -> BoxFuture<'static, Result<Vec<u8>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Self::invoke_on(inner, method, params).await })
    }

    fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Open | ConnectionState::Connecting
        )
    }
}

/// A live subscription to one notification stream. Dropping it
/// unregisters the listener.
pub struct NotificationSub {
    id: u64,
    kind: NotificationKind,
    rx: mpsc::UnboundedReceiver<Notification>,
    inner: Weak<Mutex<Inner>>,
}

impl NotificationSub {
    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    /// Next notification, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

impl Drop for NotificationSub {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().unwrap();
            if let Some(listeners) = inner.subscribers.get_mut(&self.kind) {
                listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/// Collects every pending and backlogged caller for uniform rejection.
fn take_waiters(inner: &mut Inner) -> Vec<oneshot::Sender<Result<Vec<u8>>>> {
    inner.backlog.clear();
    inner.pending.drain().map(|(_, sender)| sender).collect()
}

async fn run_writer(
    mut ws_writer: SplitSink<WsStream, Message>,
    mut out_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(frame) = out_rx.recv().await {
        if ws_writer.send(Message::Binary(frame.into())).await.is_err() {
            break;
        }
    }
    let _ = ws_writer.close().await;
}

async fn run_reader(
    client: Weak<BackendClient>,
    inner: Arc<Mutex<Inner>>,
    mut ws_reader: SplitStream<WsStream>,
    epoch: u64,
) {
    while let Some(message) = ws_reader.next().await {
        let data = match message {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        };

        match Envelope::decode(&data) {
            Ok(Envelope::Response { id, result, error }) => {
                let waiter = inner.lock().unwrap().pending.remove(&id);
                match waiter {
                    Some(sender) => {
                        let _ = sender.send(response_result(result, error));
                    }
                    // Stale or duplicate id, e.g. a response outliving a
                    // disconnect that already rejected the caller.
                    None => log::warn!("response for unknown request id {id}, dropping"),
                }
            }
            Ok(Envelope::Notification { method, params }) => {
                dispatch_notification(&inner, &method, &params);
            }
            Ok(Envelope::Request { id, .. }) => {
                log::warn!("unexpected request frame from backend (id {id}), dropping");
            }
            Err(e) => log::warn!("undecodable frame from backend, dropping: {e}"),
        }
    }

    if let Some(client) = client.upgrade() {
        client.handle_disconnect(epoch);
    }
}

/// Validates a notification and fans it out to the kind's subscribers.
/// Malformed payloads are logged and dropped so they can never corrupt
/// listener state.
fn dispatch_notification(inner: &Arc<Mutex<Inner>>, method: &str, params: &[u8]) {
    let Some(kind) = NotificationKind::from_method(method) else {
        log::debug!("notification for unknown method {method}, dropping");
        return;
    };
    let notification = match Notification::decode(kind, params) {
        Ok(notification) => notification,
        Err(e) => {
            log::warn!("invalid {method} notification payload, dropping: {e}");
            return;
        }
    };
    let mut inner = inner.lock().unwrap();
    if let Some(listeners) = inner.subscribers.get_mut(&kind) {
        listeners.retain(|(_, tx)| tx.send(notification.clone()).is_ok());
    }
}
