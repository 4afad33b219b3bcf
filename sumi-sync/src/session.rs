//! The edit-sync facade the canvas talks to.
//!
//! Owns the three channel queues and the typed invoker, records
//! freehand mask strokes, and enforces the flush precedence for
//! operations whose correctness depends on queued edits being visible
//! backend-side:
//!
//! ```text
//! text flush + mask flush  ->  inpaint-class calls
//! text flush               ->  render-class calls
//! (nothing)                ->  brush flush (feeds no other operation)
//! ```
//!
//! The queues make no inference about which operations depend on which
//! channels; issuing a dependent call without going through this facade
//! is a caller bug.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sumi_core::{Region, RegionBounds, TextBlock};

use crate::brush::BrushSyncQueue;
use crate::error::Result;
use crate::invoker::{FallbackChannel, RpcTransport, TypedInvoker};
use crate::mask::MaskSyncQueue;
use crate::payload::{
    BrushPayload, FileResult, LlmGeneratePayload, LlmLoadPayload, MaskPayload,
    OpenDocumentsPayload, ProcessRequest, RenderPayload, ThumbnailResult,
};
use crate::text::TextSyncQueue;

struct ActiveStroke {
    bounds: RegionBounds,
    brush_radius: f32,
}

pub struct EditSync {
    invoker: TypedInvoker,
    text: TextSyncQueue,
    mask: MaskSyncQueue,
    brush: BrushSyncQueue,
    strokes: Mutex<HashMap<usize, ActiveStroke>>,
}

impl EditSync {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        fallback: Option<Arc<dyn FallbackChannel>>,
    ) -> Self {
        Self {
            invoker: TypedInvoker::new(transport.clone(), fallback),
            text: TextSyncQueue::new(transport.clone()),
            mask: MaskSyncQueue::new(transport.clone()),
            brush: BrushSyncQueue::new(transport),
            strokes: Mutex::new(HashMap::new()),
        }
    }

    /// Like [`Self::new`] with a custom mask debounce window.
    pub fn with_mask_debounce(
        transport: Arc<dyn RpcTransport>,
        fallback: Option<Arc<dyn FallbackChannel>>,
        debounce: Duration,
    ) -> Self {
        Self {
            invoker: TypedInvoker::new(transport.clone(), fallback),
            text: TextSyncQueue::new(transport.clone()),
            mask: MaskSyncQueue::with_debounce(transport.clone(), debounce),
            brush: BrushSyncQueue::new(transport),
            strokes: Mutex::new(HashMap::new()),
        }
    }

    pub fn invoker(&self) -> &TypedInvoker {
        &self.invoker
    }

    // --- Text channel ---

    /// Queues a full snapshot of one document's text blocks; newer
    /// snapshots replace unsent ones.
    pub fn queue_text_blocks(&self, index: usize, text_blocks: Vec<TextBlock>) {
        self.text.enqueue(index, text_blocks);
    }

    pub fn flush_text(&self) -> impl Future<Output = ()> {
        self.text.flush()
    }

    // --- Mask channel ---

    /// Queues one mask payload (full page or explicit patch) in strict
    /// arrival order.
    pub fn queue_mask(&self, payload: MaskPayload) {
        self.mask.enqueue(payload);
    }

    /// Starts recording a freehand mask stroke on `index`, replacing
    /// any stroke already in progress there.
    pub fn begin_mask_stroke(&self, index: usize, brush_radius: f32) {
        self.strokes.lock().unwrap().insert(
            index,
            ActiveStroke {
                bounds: RegionBounds::new(),
                brush_radius,
            },
        );
    }

    /// Extends the in-progress stroke; ignored without a matching
    /// [`Self::begin_mask_stroke`].
    pub fn mask_stroke_point(&self, index: usize, x: f32, y: f32) {
        let mut strokes = self.strokes.lock().unwrap();
        if let Some(stroke) = strokes.get_mut(&index) {
            stroke.bounds.add_point(x, y, stroke.brush_radius);
        }
    }

    /// Finishes the stroke and commits it to the mask queue.
    /// `patch_source` renders the current local mask over the committed
    /// region; rapid successive strokes coalesce into one growing patch
    /// until the debounce window closes.
    pub fn end_mask_stroke<F>(
        &self,
        index: usize,
        doc_width: u32,
        doc_height: u32,
        patch_source: F,
    ) -> Option<Region>
    where
        F: FnOnce(Region) -> Vec<u8>,
    {
        let stroke = self.strokes.lock().unwrap().remove(&index)?;
        if stroke.bounds.is_empty() {
            return None;
        }
        self.mask
            .commit_stroke(index, stroke.bounds, doc_width, doc_height, patch_source)
    }

    /// Discards unsent mask payloads and the debounce timer.
    pub fn clear_mask(&self) {
        self.mask.clear();
    }

    pub fn flush_mask(&self) -> impl Future<Output = ()> {
        self.mask.flush()
    }

    // --- Brush channel ---

    /// Queues one rendered brush patch; strict order, nothing dropped.
    pub fn queue_brush_patch(&self, payload: BrushPayload) -> impl Future<Output = Result<()>> {
        self.brush.enqueue(payload)
    }

    pub async fn flush_brush(&self) {
        self.brush.flush().await;
    }

    /// Invalidates all pending mask and brush work when the user leaves
    /// a document.
    pub fn release_document(&self, index: usize) {
        self.strokes.lock().unwrap().remove(&index);
        self.mask.clear();
        self.brush.reset();
    }

    // --- Barriered operations ---

    /// Full-page inpaint; sees every queued text and mask edit.
    pub async fn inpaint(&self, index: usize) -> Result<()> {
        self.text.flush().await;
        self.mask.flush().await;
        self.invoker.inpaint(index).await
    }

    /// Region inpaint; sees every queued text and mask edit.
    pub async fn inpaint_partial(&self, index: usize, region: Region) -> Result<()> {
        self.text.flush().await;
        self.mask.flush().await;
        self.invoker.inpaint_partial(index, region).await
    }

    /// Renders translated text; sees every queued text edit.
    pub async fn render(&self, payload: &RenderPayload) -> Result<()> {
        self.text.flush().await;
        self.invoker.render(payload).await
    }

    // --- Pass-through operations (no barrier) ---

    pub async fn detect(&self, index: usize) -> Result<()> {
        self.invoker.detect(index).await
    }

    pub async fn ocr(&self, index: usize) -> Result<()> {
        self.invoker.ocr(index).await
    }

    pub async fn llm_load(&self, payload: &LlmLoadPayload) -> Result<()> {
        self.invoker.llm_load(payload).await
    }

    pub async fn llm_offload(&self) -> Result<()> {
        self.invoker.llm_offload().await
    }

    pub async fn llm_ready(&self) -> Result<bool> {
        self.invoker.llm_ready().await
    }

    pub async fn llm_generate(&self, payload: &LlmGeneratePayload) -> Result<()> {
        self.invoker.llm_generate(payload).await
    }

    pub async fn process(&self, request: &ProcessRequest) -> Result<()> {
        self.invoker.process(request).await
    }

    pub async fn process_cancel(&self) -> Result<()> {
        self.invoker.process_cancel().await
    }

    pub async fn open_documents(&self, payload: &OpenDocumentsPayload) -> Result<usize> {
        self.invoker.open_documents(payload).await
    }

    pub async fn export_document(&self, index: usize) -> Result<FileResult> {
        self.invoker.export_document(index).await
    }

    pub async fn get_thumbnail(&self, index: usize) -> Result<ThumbnailResult> {
        self.invoker.get_thumbnail(index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::method;
    use crate::testutil::MockTransport;

    fn session(mock: &MockTransport) -> EditSync {
        EditSync::new(Arc::new(mock.clone()), None)
    }

    fn block(text: &str) -> TextBlock {
        TextBlock {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_inpaint_waits_for_text_and_mask() {
        let mock = MockTransport::new();
        let sync = session(&mock);

        sync.queue_text_blocks(0, vec![block("a")]);
        sync.queue_mask(MaskPayload {
            index: 0,
            mask: vec![1],
            region: None,
        });
        sync.inpaint(0).await.unwrap();

        let methods = mock.methods();
        let inpaint_at = methods
            .iter()
            .position(|m| *m == method::INPAINT)
            .expect("inpaint sent");
        assert!(methods[..inpaint_at].contains(&method::UPDATE_TEXT_BLOCKS));
        assert!(methods[..inpaint_at].contains(&method::UPDATE_INPAINT_MASK));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_waits_for_text_only() {
        let mock = MockTransport::new();
        let sync = session(&mock);

        sync.queue_text_blocks(1, vec![block("line")]);
        sync.queue_mask(MaskPayload {
            index: 1,
            mask: vec![1],
            region: None,
        });
        sync.render(&RenderPayload {
            index: 1,
            text_block_index: None,
            font_family: None,
        })
        .await
        .unwrap();

        let methods = mock.methods();
        let render_at = methods
            .iter()
            .position(|m| *m == method::RENDER)
            .expect("render sent");
        assert!(methods[..render_at].contains(&method::UPDATE_TEXT_BLOCKS));
        // The mask debounce window has not closed; render does not wait
        // for the mask channel.
        assert!(!methods.contains(&method::UPDATE_INPAINT_MASK));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inpaint_partial_sees_stroke_committed_before_it() {
        let mock = MockTransport::new();
        let sync = session(&mock);

        sync.begin_mask_stroke(2, 10.0);
        sync.mask_stroke_point(2, 50.0, 50.0);
        let region = sync.end_mask_stroke(2, 500, 500, |_| vec![0xAB]).unwrap();

        sync.inpaint_partial(2, region).await.unwrap();

        let methods = mock.methods();
        assert_eq!(
            methods,
            vec![method::UPDATE_INPAINT_MASK, method::INPAINT_PARTIAL]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_quick_strokes_one_mask_call() {
        let mock = MockTransport::new();
        let sync = session(&mock);

        // Three short strokes inside one debounce window, brush size 20.
        let stamps = [(100.0, 100.0), (140.0, 110.0), (120.0, 150.0)];
        for (i, (x, y)) in stamps.iter().enumerate() {
            sync.begin_mask_stroke(2, 20.0);
            sync.mask_stroke_point(2, *x, *y);
            sync.end_mask_stroke(2, 1000, 1000, |_| vec![i as u8]).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(crate::mask::DEFAULT_DEBOUNCE).await;

        assert_eq!(mock.call_count(), 1);
        let payload: MaskPayload = mock.decoded_params(0);
        assert_eq!(payload.index, 2);
        // Union of the three stamps, each expanded by the brush radius.
        assert_eq!(
            payload.region.unwrap(),
            Region {
                x: 80,
                y: 80,
                width: 80,
                height: 90,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_document_discards_pending_edits() {
        let mock = MockTransport::new();
        let sync = session(&mock);

        sync.queue_mask(MaskPayload {
            index: 4,
            mask: vec![1],
            region: None,
        });
        let _ = sync.queue_brush_patch(BrushPayload {
            index: 4,
            patch: vec![2],
            region: Region {
                x: 0,
                y: 0,
                width: 8,
                height: 8,
            },
        });
        sync.release_document(4);

        sync.flush_mask().await;
        sync.flush_brush().await;
        tokio::time::sleep(crate::mask::DEFAULT_DEBOUNCE * 2).await;

        // Neither stale edit reached the backend.
        assert!(!mock.methods().contains(&method::UPDATE_INPAINT_MASK));
        assert!(!mock.methods().contains(&method::UPDATE_BRUSH_LAYER));
    }

    #[tokio::test]
    async fn test_stroke_without_points_commits_nothing() {
        let mock = MockTransport::new();
        let sync = session(&mock);

        sync.begin_mask_stroke(0, 10.0);
        assert_eq!(sync.end_mask_stroke(0, 100, 100, |_| vec![]), None);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_end_stroke_without_begin_is_ignored() {
        let mock = MockTransport::new();
        let sync = session(&mock);
        assert_eq!(sync.end_mask_stroke(0, 100, 100, |_| vec![]), None);
    }

    #[tokio::test]
    async fn test_passthrough_calls_skip_barriers() {
        let mock = MockTransport::new();
        let sync = session(&mock);

        sync.detect(0).await.unwrap();
        sync.ocr(0).await.unwrap();
        sync.process_cancel().await.unwrap();

        assert_eq!(
            mock.methods(),
            vec![method::DETECT, method::OCR, method::PROCESS_CANCEL]
        );
    }
}
