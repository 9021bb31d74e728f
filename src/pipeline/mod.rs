//! Pipeline stages for PDF-to-HTML conversion.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable alone and the orchestrator in [`crate::convert`] only sequences
//! them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ prompt ──▶ llm / gemini ──▶ sanitize
//! (upload)  (pdfium)   (units)     (VLM call)       (fences)
//!              │
//!              └──▶ extract (text layer → HTML, no model)
//! ```
//!
//! 1. [`input`]: declared content type + `%PDF` magic checks
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!   pdfium is not async-safe
//! 3. [`encode`]: PNG-encode pages, base64 for request bodies
//! 4. [`prompt`]: batched or per-page `PromptUnit` sequences
//! 5. [`llm`]: the `VisionClient` seam and the edgequake-llm adapter;
//!   [`gemini`] is the direct REST client
//! 6. [`sanitize`]: strip markdown fences from the model output
//! 7. [`extract`]: text-layer fallback that needs no model at all

pub mod encode;
pub mod extract;
pub mod gemini;
pub mod input;
pub mod llm;
pub mod pdfium;
pub mod prompt;
pub mod render;
pub mod sanitize;
