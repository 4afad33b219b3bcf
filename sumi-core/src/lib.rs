//! # sumi-core — shared document types for Sumi
//!
//! Types exchanged between the editing canvas and the backend sync layer:
//! text blocks, patch regions in document pixel space, the stroke bounds
//! accumulator, and the progress payloads carried by backend notifications.
//!
//! Nothing here touches the wire or the canvas; both sides depend on this
//! crate so payloads have a single definition.

use serde::{Deserialize, Serialize};

/// Visual style applied when a translated block is rendered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextStyle {
    pub font_families: Vec<String>,
    pub font_size: Option<f32>,
    /// RGBA fill color.
    pub color: [u8; 4],
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_families: Vec::new(),
            font_size: None,
            color: [0, 0, 0, 255],
        }
    }
}

/// One detected (or user-created) text region on a document page.
///
/// The rectangle is in document pixel space. `text` is the recognized
/// source text, `translation` the current target text; both are `None`
/// until the corresponding backend step has run or the user typed
/// something.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TextBlock {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub text: Option<String>,
    pub translation: Option<String>,
    pub style: Option<TextStyle>,
}

/// An axis-aligned patch region in document pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Clips the region to a `width` x `height` document.
    ///
    /// Returns `(x0, y0, w, h)` of the clipped region, or `None` when
    /// nothing of it lies inside the document. All arithmetic saturates,
    /// so a region far outside the page degenerates to `None` rather
    /// than wrapping.
    pub fn clamp(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let x0 = self.x.min(width.saturating_sub(1));
        let y0 = self.y.min(height.saturating_sub(1));
        let x1 = self.x.saturating_add(self.width).min(width).max(x0);
        let y1 = self.y.saturating_add(self.height).min(height).max(y0);
        let w = x1.saturating_sub(x0);
        let h = y1.saturating_sub(y0);
        if w == 0 || h == 0 {
            return None;
        }
        Some((x0, y0, w, h))
    }

    /// Smallest region covering both `self` and `other`.
    pub fn union(&self, other: &Region) -> Region {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x.saturating_add(self.width)).max(other.x.saturating_add(other.width));
        let y1 = (self.y.saturating_add(self.height)).max(other.y.saturating_add(other.height));
        Region {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}

/// Bounds accumulator for an in-progress freehand stroke.
///
/// Grown monotonically while the pointer is down; converted to a pixel
/// [`Region`] at stroke end. An accumulator with no points yet is empty
/// and converts to `None`. Whenever non-empty, `min_x <= max_x` and
/// `min_y <= max_y` hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBounds {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

impl Default for RegionBounds {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionBounds {
    pub fn new() -> Self {
        Self {
            min_x: f32::INFINITY,
            min_y: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            max_y: f32::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Expands the bounds to cover a brush stamp of `radius` centered at
    /// `(x, y)`.
    pub fn add_point(&mut self, x: f32, y: f32, radius: f32) {
        let r = radius.max(0.0);
        self.min_x = self.min_x.min(x - r);
        self.min_y = self.min_y.min(y - r);
        self.max_x = self.max_x.max(x + r);
        self.max_y = self.max_y.max(y + r);
    }

    /// Expands the bounds to cover `other` as well.
    pub fn merge(&mut self, other: &RegionBounds) {
        if other.is_empty() {
            return;
        }
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Converts to an inclusive pixel region clipped to a
    /// `doc_width` x `doc_height` document.
    ///
    /// Returns `None` for an empty accumulator or one whose pixel
    /// footprint vanishes after clipping.
    pub fn to_region(&self, doc_width: u32, doc_height: u32) -> Option<Region> {
        if self.is_empty() {
            return None;
        }
        let x = self.min_x.floor().max(0.0) as u32;
        let y = self.min_y.floor().max(0.0) as u32;
        let raw = Region {
            x,
            y,
            width: (self.max_x.ceil().max(0.0) as u32).saturating_sub(x),
            height: (self.max_y.ceil().max(0.0) as u32).saturating_sub(y),
        };
        let (x0, y0, width, height) = raw.clamp(doc_width, doc_height)?;
        Some(Region {
            x: x0,
            y: y0,
            width,
            height,
        })
    }
}

impl From<Region> for RegionBounds {
    fn from(region: Region) -> Self {
        Self {
            min_x: region.x as f32,
            min_y: region.y as f32,
            max_x: (region.x + region.width) as f32,
            max_y: (region.y + region.height) as f32,
        }
    }
}

/// Lifecycle of one model file download.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DownloadStatus {
    Started,
    Downloading,
    Completed,
    Failed(String),
}

/// `download_progress` notification payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadProgress {
    pub filename: String,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub status: DownloadStatus,
}

/// One step of the batch processing pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ProcessStep {
    Detect,
    Ocr,
    Inpaint,
    LlmGenerate,
    Render,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ProcessStatus {
    Running,
    Completed,
    Cancelled,
    Failed(String),
}

/// `process_progress` notification payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessProgress {
    pub status: ProcessStatus,
    pub step: Option<ProcessStep>,
    pub current_document: usize,
    pub total_documents: usize,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub overall_percent: u8,
}
