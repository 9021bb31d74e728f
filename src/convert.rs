//! Conversion orchestrator: PDF bytes in, sanitised HTML out.
//!
//! ## Flow
//!
//! ```text
//! validate ─► rasterize ─► assemble ─► infer ─► sanitize ─► [tag] ─► HTML
//!                              │
//!                              ├─ batched   one call, every page image
//!                              └─ per-page  one call per page, in order,
//!                                           fragments joined by "\n\n"
//! ```
//!
//! Everything inside one request is sequential. The first failing stage
//! aborts the request: a per-page run that fails on page 2 of 3 returns the
//! error and drops the markup already produced for page 1. Nothing is
//! retried.
//!
//! The whole flow runs under `request_timeout_secs`. On expiry the future is
//! dropped, so no further inference call is started.

use crate::config::{ServiceConfig, Strategy};
use crate::error::Pdf2HtmlError;
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::{extract, input, prompt, sanitize};
use crate::pipeline::llm::VisionClient;
use crate::pipeline::render::{Page, PdfEngine};
use crate::prompts;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Separator between per-page fragments.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Runs conversions. Built once at start-up and shared between requests.
pub struct Converter {
    engine: Arc<dyn PdfEngine>,
    client: Arc<dyn VisionClient>,
    default_strategy: Strategy,
    batched_instruction: String,
    per_page_instruction: String,
    tagger_instruction: Option<String>,
    request_timeout: Duration,
}

impl Converter {
    /// Prepare the instructions once; they only depend on configuration.
    pub fn new(config: &ServiceConfig, engine: Arc<dyn PdfEngine>, client: Arc<dyn VisionClient>) -> Self {
        let instruction = |strategy| {
            let template = config
                .system_prompt
                .as_deref()
                .unwrap_or_else(|| prompts::default_template(strategy));
            prompts::render_instruction(template, &config.profile_picture_url)
        };

        Self {
            engine,
            client,
            default_strategy: config.strategy,
            batched_instruction: instruction(Strategy::Batched),
            per_page_instruction: instruction(Strategy::PerPage),
            tagger_instruction: config
                .tag_editable
                .then(|| prompts::TAGGER_PROMPT.to_string()),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Strategy used when a request does not pick one.
    pub fn default_strategy(&self) -> Strategy {
        self.default_strategy
    }

    /// Convert a PDF to HTML with the vision model.
    ///
    /// `strategy` overrides the configured default for this request only.
    ///
    /// # Errors
    /// Any stage failure, or [`Pdf2HtmlError::RequestTimeout`] when the whole
    /// conversion outlives `request_timeout_secs`.
    pub async fn convert(&self, pdf: &[u8], strategy: Option<Strategy>) -> Result<ConversionOutput, Pdf2HtmlError> {
        let strategy = strategy.unwrap_or(self.default_strategy);
        tokio::time::timeout(self.request_timeout, self.run(pdf, strategy))
            .await
            .map_err(|_| {
                warn!(
                    "Conversion ({}) exceeded {}s, abandoned",
                    strategy,
                    self.request_timeout.as_secs()
                );
                Pdf2HtmlError::RequestTimeout {
                    secs: self.request_timeout.as_secs(),
                }
            })?
    }

    async fn run(&self, pdf: &[u8], strategy: Strategy) -> Result<ConversionOutput, Pdf2HtmlError> {
        let total_start = Instant::now();
        let mut stats = ConversionStats::default();

        // ── Step 1: Validate ─────────────────────────────────────────────
        input::validate_pdf_bytes(pdf)?;

        // ── Step 2: Rasterise ────────────────────────────────────────────
        let render_start = Instant::now();
        let pages = self.engine.rasterize(pdf).await?;
        stats.render_ms = render_start.elapsed().as_millis() as u64;
        info!("Rasterised {} pages in {}ms", pages.len(), stats.render_ms);

        // ── Step 3–4: Assemble and infer ─────────────────────────────────
        let inference_start = Instant::now();
        let joined = match strategy {
            Strategy::Batched => self.infer_batched(&pages, &mut stats).await?,
            Strategy::PerPage => self.infer_per_page(&pages, &mut stats).await?,
        };

        // ── Step 5: Sanitise ─────────────────────────────────────────────
        let mut html = sanitize::sanitize(&joined);

        // ── Step 6: Optional editable tagging ────────────────────────────
        if let Some(tagger) = &self.tagger_instruction {
            if !html.is_empty() {
                html = self.tag_editable(tagger, &html, &mut stats).await?;
            }
        }
        stats.inference_ms = inference_start.elapsed().as_millis() as u64;

        if html.is_empty() {
            return Err(Pdf2HtmlError::EmptyResponse {
                context: format!("{} conversion of {} pages", strategy, pages.len()),
            });
        }

        stats.total_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "Conversion complete: {} pages, {}, {} calls, {} in / {} out tokens, {}ms",
            pages.len(),
            strategy,
            stats.inference_calls,
            stats.input_tokens,
            stats.output_tokens,
            stats.total_ms
        );

        Ok(ConversionOutput {
            html,
            page_count: pages.len(),
            strategy: Some(strategy),
            stats,
        })
    }

    async fn infer_batched(&self, pages: &[Page], stats: &mut ConversionStats) -> Result<String, Pdf2HtmlError> {
        let units = prompt::batched(&self.batched_instruction, pages);
        debug!(
            "Batched request: {} images via {}",
            prompt::image_count(&units),
            self.client.name()
        );
        let out = self.client.infer(&units).await?;
        stats.record_call(out.input_tokens, out.output_tokens);
        Ok(out.text)
    }

    async fn infer_per_page(&self, pages: &[Page], stats: &mut ConversionStats) -> Result<String, Pdf2HtmlError> {
        let mut fragments = Vec::with_capacity(pages.len());
        for page in pages {
            let units = prompt::per_page(&self.per_page_instruction, page);
            let out = self.client.infer(&units).await.map_err(|e| {
                warn!("Page {}/{} failed: {}", page.index + 1, pages.len(), e);
                e
            })?;
            stats.record_call(out.input_tokens, out.output_tokens);
            let fragment = sanitize::sanitize(&out.text);
            if fragment.is_empty() {
                warn!("Page {}/{} came back empty", page.index + 1, pages.len());
                return Err(Pdf2HtmlError::EmptyResponse {
                    context: format!("page {}", page.index + 1),
                });
            }
            debug!("Page {}/{}: {} chars", page.index + 1, pages.len(), fragment.len());
            fragments.push(fragment);
        }
        Ok(fragments.join(PAGE_SEPARATOR))
    }

    async fn tag_editable(&self, instruction: &str, html: &str, stats: &mut ConversionStats) -> Result<String, Pdf2HtmlError> {
        let units = prompt::text_only(instruction, html);
        let out = self.client.infer(&units).await?;
        stats.record_call(out.input_tokens, out.output_tokens);
        Ok(sanitize::sanitize(&out.text))
    }

    /// Convert a PDF to HTML from its text layer, without the model.
    pub async fn extract_html(&self, pdf: &[u8]) -> Result<ConversionOutput, Pdf2HtmlError> {
        let start = Instant::now();
        input::validate_pdf_bytes(pdf)?;
        let texts = self.engine.extract_text(pdf).await?;
        let html = extract::pages_to_html(&texts);
        let elapsed = start.elapsed().as_millis() as u64;
        info!("Extracted text from {} pages in {}ms", texts.len(), elapsed);

        Ok(ConversionOutput {
            html,
            page_count: texts.len(),
            strategy: None,
            stats: ConversionStats {
                render_ms: elapsed,
                total_ms: elapsed,
                ..Default::default()
            },
        })
    }
}
