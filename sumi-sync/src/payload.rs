//! Typed parameter and result payloads for backend calls.
//!
//! These are the shapes behind the opaque parameter bytes of
//! [`crate::protocol::Envelope`]. One struct per call family; the
//! channel payloads (`TextBlocksPayload`, `MaskPayload`, `BrushPayload`)
//! are the units the sync queues admit.

use serde::{Deserialize, Serialize};

use sumi_core::{Region, TextBlock};

/// Addresses a single document by its index in the open set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IndexPayload {
    pub index: usize,
}

/// Full-replacement snapshot of one document's text blocks.
///
/// Always a complete list, never a diff; the newest snapshot wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextBlocksPayload {
    pub index: usize,
    pub text_blocks: Vec<TextBlock>,
}

/// One segmentation mask edit.
///
/// With `region` set, `mask` holds the encoded sub-image covering exactly
/// that region; without it, `mask` is a full-page replacement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaskPayload {
    pub index: usize,
    pub mask: Vec<u8>,
    pub region: Option<Region>,
}

/// One brush patch, always a bounded sub-image.
///
/// Patches composite onto the backend's current layer state, so they are
/// order-dependent and never merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrushPayload {
    pub index: usize,
    pub patch: Vec<u8>,
    pub region: Region,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InpaintPartialPayload {
    pub index: usize,
    pub region: Region,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderPayload {
    pub index: usize,
    /// Render a single block, or the whole page when `None`.
    pub text_block_index: Option<usize>,
    pub font_family: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmLoadPayload {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmGeneratePayload {
    pub index: usize,
    pub text_block_index: Option<usize>,
    pub language: Option<String>,
}

/// Batch pipeline request; `index: None` processes every open document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRequest {
    pub index: Option<usize>,
    pub llm_model_id: Option<String>,
    pub language: Option<String>,
}

/// One file handed to the backend on import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenDocumentsPayload {
    pub files: Vec<FileEntry>,
}

/// Exported document bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileResult {
    pub name: String,
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailResult {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use crate::protocol::{decode_payload, encode_payload};

    use super::*;

    #[test]
    fn test_mask_payload_full_vs_patch() {
        let full = MaskPayload {
            index: 2,
            mask: vec![1, 2, 3],
            region: None,
        };
        let patch = MaskPayload {
            index: 2,
            mask: vec![4, 5],
            region: Some(Region {
                x: 10,
                y: 20,
                width: 30,
                height: 40,
            }),
        };
        let full_back: MaskPayload = decode_payload(&encode_payload(&full).unwrap()).unwrap();
        let patch_back: MaskPayload = decode_payload(&encode_payload(&patch).unwrap()).unwrap();
        assert_eq!(full_back, full);
        assert_eq!(patch_back, patch);
    }

    #[test]
    fn test_text_blocks_payload_round_trip() {
        let payload = TextBlocksPayload {
            index: 0,
            text_blocks: vec![TextBlock {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
                confidence: 0.5,
                text: Some("abc".to_string()),
                translation: None,
                style: None,
            }],
        };
        let back: TextBlocksPayload = decode_payload(&encode_payload(&payload).unwrap()).unwrap();
        assert_eq!(back, payload);
    }
}
