//! Wire envelopes for the backend connection.
//!
//! One long-lived connection carries three envelope kinds, all
//! bincode-encoded as binary frames:
//!
//! ```text
//! Request      { id, method, params? }   client -> backend
//! Response     { id, result? | error? }  backend -> client, correlated by id
//! Notification { method, params }        backend -> client, no id
//! ```
//!
//! Method names and parameter bytes are an opaque contract with the
//! backend; correlation depends only on the id, never on the codec.
//! The backend answers frames it cannot decode with id 0, so live
//! request ids start at 1.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use sumi_core::{DownloadProgress, ProcessProgress};

use crate::error::SyncError;

/// Monotonically increasing per-connection-lifetime request id.
pub type RequestId = u32;

/// One framed unit on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Envelope {
    Request {
        id: RequestId,
        method: String,
        params: Option<Vec<u8>>,
    },
    Response {
        id: RequestId,
        result: Option<Vec<u8>>,
        error: Option<String>,
    },
    Notification {
        method: String,
        params: Vec<u8>,
    },
}

impl Envelope {
    pub fn request(id: RequestId, method: &str, params: Option<Vec<u8>>) -> Self {
        Envelope::Request {
            id,
            method: method.to_string(),
            params,
        }
    }

    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| SyncError::Codec(e.to_string()))
    }

    /// Deserialize from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        let (envelope, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| SyncError::Codec(e.to_string()))?;
        Ok(envelope)
    }
}

/// Splits a response body into the caller-facing result.
///
/// Exactly one of `result`/`error` must be set; anything else is a
/// malformed frame and surfaces as a codec error.
pub fn response_result(
    result: Option<Vec<u8>>,
    error: Option<String>,
) -> Result<Vec<u8>, SyncError> {
    match (result, error) {
        (Some(bytes), None) => Ok(bytes),
        (None, Some(message)) => Err(SyncError::Backend(message)),
        _ => Err(SyncError::Codec(
            "response must carry exactly one of result/error".to_string(),
        )),
    }
}

/// Encodes a typed payload into opaque parameter bytes.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, SyncError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| SyncError::Codec(e.to_string()))
}

/// Decodes opaque result bytes into a typed value.
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SyncError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| SyncError::Codec(e.to_string()))?;
    Ok(value)
}

/// Backend method names.
///
/// The sync layer treats every method identically: opaque name, opaque
/// parameter bytes, opaque result bytes.
pub mod method {
    pub const DETECT: &str = "detect";
    pub const OCR: &str = "ocr";
    pub const INPAINT: &str = "inpaint";
    pub const INPAINT_PARTIAL: &str = "inpaint_partial";
    pub const RENDER: &str = "render";
    pub const UPDATE_TEXT_BLOCKS: &str = "update_text_blocks";
    pub const UPDATE_INPAINT_MASK: &str = "update_inpaint_mask";
    pub const UPDATE_BRUSH_LAYER: &str = "update_brush_layer";
    pub const LLM_LOAD: &str = "llm_load";
    pub const LLM_OFFLOAD: &str = "llm_offload";
    pub const LLM_READY: &str = "llm_ready";
    pub const LLM_GENERATE: &str = "llm_generate";
    pub const PROCESS: &str = "process";
    pub const PROCESS_CANCEL: &str = "process_cancel";
    pub const OPEN_DOCUMENTS: &str = "open_documents";
    pub const EXPORT_DOCUMENT: &str = "export_document";
    pub const GET_THUMBNAIL: &str = "get_thumbnail";

    /// Document-scoped methods the stateless fallback channel may serve
    /// when the persistent connection is down.
    pub const FALLBACK: &[&str] = &[OPEN_DOCUMENTS, EXPORT_DOCUMENT, GET_THUMBNAIL];
}

/// The notification streams this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    DownloadProgress,
    ProcessProgress,
}

impl NotificationKind {
    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "download_progress" => Some(NotificationKind::DownloadProgress),
            "process_progress" => Some(NotificationKind::ProcessProgress),
            _ => None,
        }
    }

    pub fn as_method(&self) -> &'static str {
        match self {
            NotificationKind::DownloadProgress => "download_progress",
            NotificationKind::ProcessProgress => "process_progress",
        }
    }
}

/// A validated, typed notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    DownloadProgress(DownloadProgress),
    ProcessProgress(ProcessProgress),
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::DownloadProgress(_) => NotificationKind::DownloadProgress,
            Notification::ProcessProgress(_) => NotificationKind::ProcessProgress,
        }
    }

    /// Validates raw parameter bytes against the kind's payload schema.
    pub fn decode(kind: NotificationKind, params: &[u8]) -> Result<Self, SyncError> {
        match kind {
            NotificationKind::DownloadProgress => {
                Ok(Notification::DownloadProgress(decode_payload(params)?))
            }
            NotificationKind::ProcessProgress => {
                Ok(Notification::ProcessProgress(decode_payload(params)?))
            }
        }
    }
}
