//! Debounced sync queue for segmentation mask edits.
//!
//! Mask patches are not idempotent snapshots: each one overwrites a
//! bounded sub-area of the page mask, so distinct payloads are sent
//! strictly in arrival order and never merged. What *is* collapsed is
//! the burst pattern of freehand drawing: the drain waits for a quiet
//! period after the last arrival, and rapid strokes on the same document
//! coalesce into one growing patch before the timer fires
//! (see [`MaskSyncQueue::commit_stroke`]).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use sumi_core::{Region, RegionBounds};

use crate::invoker::RpcTransport;
use crate::payload::MaskPayload;
use crate::protocol::{encode_payload, method};

/// Quiet period after the last mask arrival before a drain begins.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

struct Shared {
    list: VecDeque<MaskPayload>,
    /// Bumped on every re-arm, flush and clear; a sleeping timer task
    /// whose generation no longer matches does nothing when it wakes.
    timer_gen: u64,
    draining: bool,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

pub struct MaskSyncQueue {
    transport: Arc<dyn RpcTransport>,
    shared: Arc<Mutex<Shared>>,
    debounce: Duration,
}

impl MaskSyncQueue {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self::with_debounce(transport, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(transport: Arc<dyn RpcTransport>, debounce: Duration) -> Self {
        Self {
            transport,
            shared: Arc::new(Mutex::new(Shared {
                list: VecDeque::new(),
                timer_gen: 0,
                draining: false,
                idle_waiters: Vec::new(),
            })),
            debounce,
        }
    }

    /// Appends a payload and re-arms the debounce timer. Payloads are
    /// sent in arrival order, one backend call each; arrivals during a
    /// drain are appended and drained before the loop exits.
    pub fn enqueue(&self, payload: MaskPayload) {
        let arm = {
            let mut shared = self.shared.lock().unwrap();
            shared.list.push_back(payload);
            !shared.draining
        };
        if arm {
            self.arm_debounce();
        }
    }

    /// Commits one finished freehand stroke.
    ///
    /// If the newest unsent entry is a patch for the same document, the
    /// stroke merges into it: the entry's region grows to the union and
    /// `patch_source` renders one patch covering it. Otherwise a new
    /// entry is appended. Returns the committed region, or `None` when
    /// the stroke lies entirely outside the document.
    pub fn commit_stroke<F>(
        &self,
        index: usize,
        stroke: RegionBounds,
        doc_width: u32,
        doc_height: u32,
        patch_source: F,
    ) -> Option<Region>
    where
        F: FnOnce(Region) -> Vec<u8>,
    {
        let mut bounds = stroke;
        {
            let shared = self.shared.lock().unwrap();
            if let Some(tail) = shared.list.back() {
                if tail.index == index {
                    if let Some(region) = tail.region {
                        bounds.merge(&RegionBounds::from(region));
                    }
                }
            }
        }
        let region = bounds.to_region(doc_width, doc_height)?;
        // Rendering happens outside the lock; if the drain sends the
        // tail meanwhile, the new patch covers a superset of the sent
        // region, which is correct either way.
        let mask = patch_source(region);
        let payload = MaskPayload {
            index,
            mask,
            region: Some(region),
        };
        let arm = {
            let mut shared = self.shared.lock().unwrap();
            match shared.list.back_mut() {
                Some(tail) if tail.index == index && tail.region.is_some() => *tail = payload,
                _ => shared.list.push_back(payload),
            }
            !shared.draining
        };
        if arm {
            self.arm_debounce();
        }
        Some(region)
    }

    /// Empties the pending list and cancels the debounce timer without
    /// sending anything. Used on document teardown so a late patch can
    /// never target a page the user has left.
    pub fn clear(&self) {
        let mut shared = self.shared.lock().unwrap();
        let dropped = shared.list.len();
        shared.list.clear();
        shared.timer_gen += 1;
        if dropped > 0 {
            log::debug!("discarded {dropped} unsent mask payloads");
        }
    }

    /// Cancels the debounce timer, drains immediately and resolves once
    /// the channel is idle. The barrier before any inpaint-class call.
    pub fn flush(&self) -> impl std::future::Future<Output = ()> {
        let (waiter, start) = {
            let mut shared = self.shared.lock().unwrap();
            shared.timer_gen += 1;
            if !shared.draining && shared.list.is_empty() {
                (None, false)
            } else {
                let (tx, rx) = oneshot::channel();
                shared.idle_waiters.push(tx);
                let start = !shared.draining;
                if start {
                    shared.draining = true;
                }
                (Some(rx), start)
            }
        };
        if start {
            tokio::spawn(drain(self.transport.clone(), self.shared.clone()));
        }
        async move {
            if let Some(rx) = waiter {
                let _ = rx.await;
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().unwrap().list.len()
    }

    fn arm_debounce(&self) {
        let gen = {
            let mut shared = self.shared.lock().unwrap();
            shared.timer_gen += 1;
            shared.timer_gen
        };
        let transport = self.transport.clone();
        let shared = self.shared.clone();
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let start = {
                let mut shared = shared.lock().unwrap();
                if shared.timer_gen != gen || shared.draining || shared.list.is_empty() {
                    false
                } else {
                    shared.draining = true;
                    true
                }
            };
            if start {
                drain(transport, shared).await;
            }
        });
    }
}

/// Sends accumulated payloads strictly in arrival order, one backend
/// call per payload, until the list stays empty.
async fn drain(transport: Arc<dyn RpcTransport>, shared: Arc<Mutex<Shared>>) {
    loop {
        let payload = {
            let mut shared = shared.lock().unwrap();
            match shared.list.pop_front() {
                Some(payload) => payload,
                None => {
                    shared.draining = false;
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
                if let Err(e) = transport.call(method::UPDATE_INPAINT_MASK, Some(params)).await {
                    log::warn!("mask sync failed for document {}: {e}", payload.index);
                }
            }
            Err(e) => log::warn!("mask payload encode failed: {e}"),
        }
    }
}
