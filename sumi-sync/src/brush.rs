//! Strict-order sync queue for rendered brush patches.
//!
//! Each patch composites onto the backend's current brush layer, so
//! nothing may ever be dropped, merged or reordered: every payload goes
//! through a [`SerialQueue`] as its own backend call, and a second
//! stroke queued while the first is still in flight simply waits its
//! turn.

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::invoker::RpcTransport;
use crate::payload::BrushPayload;
use crate::protocol::{encode_payload, method};
use crate::queue::SerialQueue;

pub struct BrushSyncQueue {
    transport: Arc<dyn RpcTransport>,
    queue: SerialQueue,
}

impl BrushSyncQueue {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            queue: SerialQueue::new(),
        }
    }

    /// Queues one patch. The payload is immutable once enqueued; the
    /// returned future reports that patch's own send result and may be
    /// dropped for fire-and-forget use.
    pub fn enqueue(&self, payload: BrushPayload) -> impl Future<Output = Result<()>> {
        let transport = self.transport.clone();
        self.queue.push(move || async move {
            let params = encode_payload(&payload)?;
            transport
                .call(method::UPDATE_BRUSH_LAYER, Some(params))
                .await?;
            Ok(())
        })
    }

    /// Resolves once every queued patch has been sent. No backend call
    /// depends on brush state, so this barrier exists for teardown and
    /// tests rather than for cross-operation ordering.
    pub async fn flush(&self) {
        self.queue.on_idle().await;
    }

    /// Drops unsent patches on document teardown.
    pub fn reset(&self) {
        self.queue.reset();
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }
}
