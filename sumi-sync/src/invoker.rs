//! Typed call surface over the raw transport.
//!
//! [`RpcTransport`] is the narrow seam the queues and the session depend
//! on; [`crate::transport::BackendClient`] implements it for the live
//! connection and tests inject recording mocks. [`TypedInvoker`] adds
//! payload encoding and routes the document-scoped calls (import,
//! export, thumbnails) to a stateless [`FallbackChannel`] while the
//! persistent connection is unavailable.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::payload::{
    FileResult, IndexPayload, InpaintPartialPayload, LlmGeneratePayload, LlmLoadPayload,
    OpenDocumentsPayload, ProcessRequest, RenderPayload, ThumbnailResult,
};
use crate::protocol::{decode_payload, encode_payload, method};
use sumi_core::Region;

/// One opaque call against the backend.
pub trait RpcTransport: Send + Sync {
    fn call(
        &self,
        method: &'static str,
        params: Option<Vec<u8>>,
    ) -> BoxFuture<'static, Result<Vec<u8>>>;

    /// Whether the persistent connection can currently carry calls
    /// (open, or opening with calls queued).
    fn is_connected(&self) -> bool;
}

/// Stateless per-call request/response channel used when the persistent
/// connection is down. Only per-call pairing is required; no id
/// correlation scheme is shared with the live transport.
pub trait FallbackChannel: Send + Sync {
    fn request(
        &self,
        method: &'static str,
        params: Option<Vec<u8>>,
    ) -> BoxFuture<'static, Result<Vec<u8>>>;
}

/// Maps logical operations onto the transport, or onto the fallback for
/// the document-scoped calls when the transport is down.
pub struct TypedInvoker {
    transport: Arc<dyn RpcTransport>,
    fallback: Option<Arc<dyn FallbackChannel>>,
}

impl TypedInvoker {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        fallback: Option<Arc<dyn FallbackChannel>>,
    ) -> Self {
        Self {
            transport,
            fallback,
        }
    }

    pub fn transport(&self) -> Arc<dyn RpcTransport> {
        self.transport.clone()
    }

    async fn route(&self, name: &'static str, params: Option<Vec<u8>>) -> Result<Vec<u8>> {
        if method::FALLBACK.contains(&name) && !self.transport.is_connected() {
            if let Some(fallback) = &self.fallback {
                log::debug!("routing {name} over fallback channel");
                return fallback.request(name, params).await;
            }
        }
        self.transport.call(name, params).await
    }

    async fn call_unit<P: serde::Serialize>(&self, name: &'static str, payload: &P) -> Result<()> {
        let params = encode_payload(payload)?;
        self.route(name, Some(params)).await?;
        Ok(())
    }

    async fn call_no_params(&self, name: &'static str) -> Result<Vec<u8>> {
        self.route(name, None).await
    }

    pub async fn detect(&self, index: usize) -> Result<()> {
        self.call_unit(method::DETECT, &IndexPayload { index }).await
    }

    pub async fn ocr(&self, index: usize) -> Result<()> {
        self.call_unit(method::OCR, &IndexPayload { index }).await
    }

    pub async fn inpaint(&self, index: usize) -> Result<()> {
        self.call_unit(method::INPAINT, &IndexPayload { index }).await
    }

    pub async fn inpaint_partial(&self, index: usize, region: Region) -> Result<()> {
        self.call_unit(
            method::INPAINT_PARTIAL,
            &InpaintPartialPayload { index, region },
        )
        .await
    }

    pub async fn render(&self, payload: &RenderPayload) -> Result<()> {
        self.call_unit(method::RENDER, payload).await
    }

    pub async fn llm_load(&self, payload: &LlmLoadPayload) -> Result<()> {
        self.call_unit(method::LLM_LOAD, payload).await
    }

    pub async fn llm_offload(&self) -> Result<()> {
        self.call_no_params(method::LLM_OFFLOAD).await?;
        Ok(())
    }

    pub async fn llm_ready(&self) -> Result<bool> {
        let bytes = self.call_no_params(method::LLM_READY).await?;
        decode_payload(&bytes)
    }

    pub async fn llm_generate(&self, payload: &LlmGeneratePayload) -> Result<()> {
        self.call_unit(method::LLM_GENERATE, payload).await
    }

    pub async fn process(&self, request: &ProcessRequest) -> Result<()> {
        self.call_unit(method::PROCESS, request).await
    }

    pub async fn process_cancel(&self) -> Result<()> {
        self.call_no_params(method::PROCESS_CANCEL).await?;
        Ok(())
    }

    /// Imports documents; returns how many the backend opened.
    pub async fn open_documents(&self, payload: &OpenDocumentsPayload) -> Result<usize> {
        let params = encode_payload(payload)?;
        let bytes = self.route(method::OPEN_DOCUMENTS, Some(params)).await?;
        decode_payload(&bytes)
    }

    pub async fn export_document(&self, index: usize) -> Result<FileResult> {
        let params = encode_payload(&IndexPayload { index })?;
        let bytes = self.route(method::EXPORT_DOCUMENT, Some(params)).await?;
        decode_payload(&bytes)
    }

    pub async fn get_thumbnail(&self, index: usize) -> Result<ThumbnailResult> {
        let params = encode_payload(&IndexPayload { index })?;
        let bytes = self.route(method::GET_THUMBNAIL, Some(params)).await?;
        decode_payload(&bytes)
    }
}
