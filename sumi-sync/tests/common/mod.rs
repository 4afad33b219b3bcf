//! In-process backend stub for integration tests.
//!
//! Speaks the real wire protocol over a real WebSocket: records every
//! request, echoes parameter bytes back as the result by default, and
//! can hold, delay or fail individual methods, push notifications, and
//! drop the connection on command.

// Each integration binary uses a different subset of the stub.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;

use sumi_sync::protocol::Envelope;

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub id: u32,
    pub method: String,
    pub params: Option<Vec<u8>>,
}

#[derive(Default)]
struct Behavior {
    hold: HashSet<String>,
    fail: HashMap<String, String>,
    delay: HashMap<String, Duration>,
}

struct State {
    calls: Mutex<Vec<CallRecord>>,
    behavior: Mutex<Behavior>,
    held: Mutex<Vec<(u32, String, mpsc::UnboundedSender<Envelope>)>>,
    conn_tx: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    kill: Notify,
    accepts: AtomicUsize,
    accept_delay: Duration,
}

pub struct StubBackend {
    pub url: String,
    state: Arc<State>,
}

impl StubBackend {
    pub async fn start() -> Self {
        Self::start_with_accept_delay(Duration::ZERO).await
    }

    /// Delays the WebSocket handshake so clients sit in `Connecting`.
    pub async fn start_with_accept_delay(accept_delay: Duration) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let state = Arc::new(State {
            calls: Mutex::new(Vec::new()),
            behavior: Mutex::new(Behavior::default()),
            held: Mutex::new(Vec::new()),
            conn_tx: Mutex::new(None),
            kill: Notify::new(),
            accepts: AtomicUsize::new(0),
            accept_delay,
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                accept_state.accepts.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle_connection(stream, accept_state.clone()));
            }
        });

        Self { url, state }
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    /// Parks requests for `method` instead of answering.
    pub fn hold(&self, method: &str) {
        self.state
            .behavior
            .lock()
            .unwrap()
            .hold
            .insert(method.to_string());
    }

    /// Answers every parked request for `method` with an empty result.
    pub fn release(&self, method: &str) {
        self.state.behavior.lock().unwrap().hold.remove(method);
        let mut held = self.state.held.lock().unwrap();
        let mut kept = Vec::new();
        for (id, held_method, tx) in held.drain(..) {
            if held_method == method {
                let _ = tx.send(Envelope::Response {
                    id,
                    result: Some(Vec::new()),
                    error: None,
                });
            } else {
                kept.push((id, held_method, tx));
            }
        }
        *held = kept;
    }

    /// Answers `method` with a backend error string.
    pub fn fail(&self, method: &str, message: &str) {
        self.state
            .behavior
            .lock()
            .unwrap()
            .fail
            .insert(method.to_string(), message.to_string());
    }

    /// Adds latency before answering `method`.
    pub fn delay(&self, method: &str, delay: Duration) {
        self.state
            .behavior
            .lock()
            .unwrap()
            .delay
            .insert(method.to_string(), delay);
    }

    /// Pushes a notification frame to the connected client.
    pub fn notify(&self, method: &str, params: Vec<u8>) {
        let conn = self.state.conn_tx.lock().unwrap();
        let tx = conn.as_ref().expect("no client connected");
        let _ = tx.send(Envelope::Notification {
            method: method.to_string(),
            params,
        });
    }

    /// Drops the current connection. `notify_one` stores a permit, so
    /// the connection task sees the kill even if it is mid-message.
    pub fn kill(&self) {
        self.state.conn_tx.lock().unwrap().take();
        self.state.kill.notify_one();
    }

    pub fn accept_count(&self) -> usize {
        self.state.accepts.load(Ordering::SeqCst)
    }

    /// Waits until `count` calls were recorded.
    pub async fn wait_for_calls(&self, count: usize) {
        while self.call_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Waits until a client connection is registered.
    pub async fn wait_connected(&self) {
        while self.state.conn_tx.lock().unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<State>) {
    if state.accept_delay > Duration::ZERO {
        tokio::time::sleep(state.accept_delay).await;
    }
    let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut ws_writer, mut ws_reader) = socket.split();
    let (tx, mut send_rx) = mpsc::unbounded_channel::<Envelope>();
    *state.conn_tx.lock().unwrap() = Some(tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(envelope) = send_rx.recv().await {
            let Ok(bytes) = envelope.encode() else {
                continue;
            };
            if ws_writer.send(Message::Binary(bytes.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        let message = tokio::select! {
            message = ws_reader.next() => message,
            _ = state.kill.notified() => break,
        };
        let Some(Ok(message)) = message else {
            break;
        };
        let data = match message {
            Message::Binary(data) => data,
            Message::Close(_) => break,
            _ => continue,
        };

        let Ok(Envelope::Request { id, method, params }) = Envelope::decode(&data) else {
            continue;
        };

        state.calls.lock().unwrap().push(CallRecord {
            id,
            method: method.clone(),
            params: params.clone(),
        });

        let (reply, delay) = {
            let behavior = state.behavior.lock().unwrap();
            if behavior.hold.contains(&method) {
                (None, None)
            } else if let Some(message) = behavior.fail.get(&method) {
                (
                    Some(Envelope::Response {
                        id,
                        result: None,
                        error: Some(message.clone()),
                    }),
                    behavior.delay.get(&method).copied(),
                )
            } else {
                (
                    Some(Envelope::Response {
                        id,
                        result: Some(params.unwrap_or_default()),
                        error: None,
                    }),
                    behavior.delay.get(&method).copied(),
                )
            }
        };

        match reply {
            None => state.held.lock().unwrap().push((id, method, tx.clone())),
            Some(envelope) => match delay {
                None => {
                    let _ = tx.send(envelope);
                }
                Some(delay) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(envelope);
                    });
                }
            },
        }
    }

    writer.abort();
}
