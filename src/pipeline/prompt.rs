//! Prompt assembly: instruction + page images → ordered [`PromptUnit`]s.
//!
//! Two shapes exist and nothing else:
//!
//! ```text
//! batched   [instruction, image_0, image_1, …, image_{n-1}]   one call
//! per-page  [instruction, image_i]                            n calls
//! ```
//!
//! Batching pays one round trip for the whole document and lets the model
//! write the shared `<head>` once; per-page keeps each request small.

use crate::pipeline::encode::PNG_MIME;
use crate::pipeline::render::Page;
use std::sync::Arc;

/// One element of an inference request.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptUnit {
    /// Instruction or other text content.
    Text(String),
    /// An encoded image.
    Image {
        /// Page index the image came from.
        page: usize,
        mime_type: &'static str,
        data: Arc<[u8]>,
    },
}

impl PromptUnit {
    /// Image unit for a rasterised page.
    pub fn page_image(page: &Page) -> Self {
        PromptUnit::Image {
            page: page.index,
            mime_type: PNG_MIME,
            data: Arc::clone(&page.png),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, PromptUnit::Text(_))
    }

    pub fn is_image(&self) -> bool {
        matches!(self, PromptUnit::Image { .. })
    }
}

/// `[instruction, image_0, …, image_{n-1}]`.
pub fn batched(instruction: &str, pages: &[Page]) -> Vec<PromptUnit> {
    let mut units = Vec::with_capacity(pages.len() + 1);
    units.push(PromptUnit::Text(instruction.to_string()));
    units.extend(pages.iter().map(PromptUnit::page_image));
    units
}

/// `[instruction, image_i]` for a single page.
pub fn per_page(instruction: &str, page: &Page) -> Vec<PromptUnit> {
    vec![
        PromptUnit::Text(instruction.to_string()),
        PromptUnit::page_image(page),
    ]
}

/// `[instruction, markup]` for the text-only tagging pass.
pub fn text_only(instruction: &str, content: &str) -> Vec<PromptUnit> {
    vec![
        PromptUnit::Text(instruction.to_string()),
        PromptUnit::Text(content.to_string()),
    ]
}

/// Count of image units in a request.
pub fn image_count(units: &[PromptUnit]) -> usize {
    units.iter().filter(|u| u.is_image()).count()
}
