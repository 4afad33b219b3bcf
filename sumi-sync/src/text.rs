//! Coalescing sync queue for text block edits.
//!
//! Text snapshots are cheap, full replacements: only the most recent
//! one matters, so the pending slot is overwritten on every enqueue and
//! the drain loop sends whatever is newest when it gets there. The
//! drain scheduling is an explicit state machine so the
//! "never two drains at once" invariant is observable, not implied by
//! flag discipline.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use sumi_core::TextBlock;

use crate::invoker::RpcTransport;
use crate::payload::TextBlocksPayload;
use crate::protocol::{encode_payload, method};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Nothing pending, no drain task alive.
    Idle,
    /// A drain task was spawned but has not dequeued yet.
    Scheduled,
    /// The drain loop is sending payloads.
    Draining,
}

struct Shared {
    pending: Option<TextBlocksPayload>,
    state: DrainState,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

pub struct TextSyncQueue {
    transport: Arc<dyn RpcTransport>,
    shared: Arc<Mutex<Shared>>,
}

impl TextSyncQueue {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            shared: Arc::new(Mutex::new(Shared {
                pending: None,
                state: DrainState::Idle,
                idle_waiters: Vec::new(),
            })),
        }
    }

    /// Replaces any unsent snapshot for this channel and schedules a
    /// drain if one is not already scheduled or running.
    pub fn enqueue(&self, index: usize, text_blocks: Vec<TextBlock>) {
        let spawn = {
            let mut shared = self.shared.lock().unwrap();
            shared.pending = Some(TextBlocksPayload { index, text_blocks });
            if shared.state == DrainState::Idle {
                shared.state = DrainState::Scheduled;
                true
            } else {
                false
            }
        };
        if spawn {
            let transport = self.transport.clone();
            let shared = self.shared.clone();
            tokio::spawn(drain(transport, shared));
        }
    }

    /// Resolves once no snapshot is pending and no drain is running.
    /// The barrier for every operation that reads text backend-side.
    pub fn flush(&self) -> impl std::future::Future<Output = ()> {
        let waiter = {
            let mut shared = self.shared.lock().unwrap();
            if shared.state == DrainState::Idle {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                shared.idle_waiters.push(tx);
                Some(rx)
            }
        };
        async move {
            if let Some(rx) = waiter {
                let _ = rx.await;
            }
        }
    }

    pub fn state(&self) -> DrainState {
        self.shared.lock().unwrap().state
    }
}

/// Sends the current snapshot, looping while newer ones arrive, then
/// goes idle. A failed send is logged and the loop moves on; the next
/// snapshot supersedes the lost one anyway.
async fn drain(transport: Arc<dyn RpcTransport>, shared: Arc<Mutex<Shared>>) {
    loop {
        let payload = {
            let mut shared = shared.lock().unwrap();
            match shared.pending.take() {
                Some(payload) => {
                    shared.state = DrainState::Draining;
                    payload
                }
                None => {
                    shared.state = DrainState::Idle;
                    let waiters = std::mem::take(&mut shared.idle_waiters);
                    drop(shared);
                    for waiter in waiters {
                        let _ = waiter.send(());
                    }
                    return;
                }
            }
        };

        match encode_payload(&payload) {
            Ok(params) => {
                if let Err(e) = transport.call(method::UPDATE_TEXT_BLOCKS, Some(params)).await {
                    log::warn!(
                        "text block sync failed for document {}: {e}",
                        payload.index
                    );
                }
            }
            Err(e) => log::warn!("text block payload encode failed: {e}"),
        }
    }
}
