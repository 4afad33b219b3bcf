//! # sumi-sync — backend transport and edit synchronization for Sumi
//!
//! Keeps the editing canvas consistent with the out-of-process
//! computation backend (detection, OCR, inpainting, rendering, LLM
//! translation) without blocking the UI or losing and reordering edits.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  snapshots   ┌───────────────┐
//! │            │─────────────►│ TextSyncQueue │──┐
//! │   Canvas   │  strokes     ├───────────────┤  │   ┌──────────────┐      ┌─────────┐
//! │  (UI side) │─────────────►│ MaskSyncQueue │──┼──►│ TypedInvoker │─────►│ Backend │
//! │            │  patches     ├───────────────┤  │   │ / transport  │  ws  │ process │
//! │            │─────────────►│ BrushSyncQueue│──┘   └──────┬───────┘      └─────────┘
//! └─────┬──────┘              └───────────────┘             │
//!       │        barriered calls (inpaint, render)          │
//!       └────────────────► EditSync ◄───── notifications ───┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — wire envelopes (request/response/notification)
//! - [`payload`] — typed parameter/result shapes behind the opaque bytes
//! - [`error`] — the [`SyncError`] taxonomy
//! - [`transport`] — persistent WebSocket client with id correlation
//!   and reconnect
//! - [`invoker`] — typed call surface plus the stateless fallback path
//! - [`queue`] — FIFO serial task runner (concurrency exactly 1)
//! - [`text`] — coalescing snapshot channel (latest wins)
//! - [`mask`] — debounced, order-preserving patch channel
//! - [`brush`] — strict-order patch channel
//! - [`session`] — the facade enforcing flush barriers
//!
//! Within one channel, delivery order matches enqueue order (mask,
//! brush) or collapses to the newest snapshot (text). Across channels
//! there is no ordering guarantee; cross-channel causality goes through
//! the explicit flush barriers on [`session::EditSync`].

pub mod brush;
pub mod error;
pub mod invoker;
pub mod mask;
pub mod payload;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod text;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use brush::BrushSyncQueue;
pub use error::{Result, SyncError};
pub use invoker::{FallbackChannel, RpcTransport, TypedInvoker};
pub use mask::{MaskSyncQueue, DEFAULT_DEBOUNCE};
pub use payload::{
    BrushPayload, FileEntry, FileResult, IndexPayload, InpaintPartialPayload, LlmGeneratePayload,
    LlmLoadPayload, MaskPayload, OpenDocumentsPayload, ProcessRequest, RenderPayload,
    TextBlocksPayload, ThumbnailResult,
};
pub use protocol::{Envelope, Notification, NotificationKind, RequestId};
pub use queue::SerialQueue;
pub use session::EditSync;
pub use text::TextSyncQueue;
pub use transport::{BackendClient, ClientConfig, ConnectionState, NotificationSub};
