//! # edgequake-pdf2html
//!
//! Convert PDF documents to HTML with a Vision Language Model, and HTML back
//! to PDF with a headless renderer, behind a small HTTP service.
//!
//! ## Why a vision model?
//!
//! CVs and reports are designed visually: two-column layouts, coloured rules,
//! right-aligned dates. The text layer of such a PDF loses all of that. This
//! crate rasterises each page and asks a VLM to reproduce what it *sees* as
//! Tailwind-styled HTML. A plain text-layer path is available too, for when
//! structure matters less than cost.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input     declared type, %PDF magic, non-empty
//!  ├─ 2. Render    rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Prompt    [instruction, images…] batched, or one per page
//!  ├─ 4. VLM       Gemini REST, or any edgequake-llm provider
//!  ├─ 5. Sanitize  strip ```html fences, trim (idempotent)
//!  └─ 6. Output    one HTML document
//!
//! HTML ─► scratch dir ─► chromium / wkhtmltopdf ─► streamed PDF ─► scratch removed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2html::pipeline::{llm::build_vision_client, render::PdfiumEngine};
//! use edgequake_pdf2html::{Converter, ServiceConfig, Strategy};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().api_key("...").build()?;
//!     let converter = Converter::new(
//!         &config,
//!         Arc::new(PdfiumEngine::new(&config)),
//!         build_vision_client(&config)?,
//!     );
//!     let pdf = std::fs::read("cv.pdf")?;
//!     let output = converter.convert(&pdf, Some(Strategy::Batched)).await?;
//!     println!("{}", output.html);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2html` server binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod print;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    RenderBackend, ServiceConfig, ServiceConfigBuilder, Strategy, DEFAULT_GEMINI_ENDPOINT, DEFAULT_MODEL,
    DEFAULT_PROFILE_PICTURE_URL,
};
pub use convert::Converter;
pub use error::{ErrorKind, Pdf2HtmlError};
pub use output::{ConversionOutput, ConversionStats};
pub use print::{CommandRenderer, HtmlRenderer, PrintedPdf, Printer};
pub use server::{build_router, serve, AppState, ServerError};
