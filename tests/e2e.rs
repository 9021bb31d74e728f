//! End-to-end tests for edgequake-pdf2html.
//!
//! These use real PDF files in `./test_cases/`, a real libpdfium, and, for
//! the conversion tests, live Gemini calls. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 GOOGLE_API_KEY=... LD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 LD_LIBRARY_PATH=. cargo test --test e2e rasterize -- --nocapture

use edgequake_pdf2html::pipeline::llm::build_vision_client;
use edgequake_pdf2html::pipeline::render::{PdfEngine, PdfiumEngine};
use edgequake_pdf2html::pipeline::sanitize::has_fence_marker;
use edgequake_pdf2html::{CommandRenderer, Converter, Printer, RenderBackend, ServiceConfig, Strategy};
use futures::TryStreamExt;
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Skip this test unless a Gemini key is available.
macro_rules! require_api_key {
    () => {{
        match std::env::var("GOOGLE_API_KEY") {
            Ok(k) if !k.is_empty() => k,
            _ => {
                println!("SKIP: GOOGLE_API_KEY not set");
                return;
            }
        }
    }};
}

fn pdfium_config() -> ServiceConfig {
    let mut builder = ServiceConfig::builder();
    if let Ok(path) = std::env::var("PDF2HTML_PDFIUM_LIB_PATH") {
        builder = builder.pdfium_lib_path(path);
    }
    builder.build().unwrap()
}

/// Assert the HTML passes basic quality checks.
fn assert_html_quality(html: &str, context: &str) {
    assert!(!html.trim().is_empty(), "[{context}] HTML is empty");
    assert!(
        !has_fence_marker(html),
        "[{context}] Output still carries a code fence"
    );
    assert_eq!(html, html.trim(), "[{context}] Output is not trimmed");
    assert!(html.contains('<'), "[{context}] Output has no markup at all");
    println!("[{context}] ✓  {} bytes, quality checks passed", html.len());
}

// ── pdfium only (no model) ───────────────────────────────────────────────────

#[tokio::test]
async fn rasterize_keeps_page_order() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("cv_two_pages.pdf"));
    let bytes = std::fs::read(&path).unwrap();

    let engine = PdfiumEngine::new(&pdfium_config());
    let pages = engine.rasterize(&bytes).await.expect("rasterize should succeed");

    assert_eq!(pages.len(), 2, "CV fixture has two pages");
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.index, i);
        assert!(page.png.starts_with(&[0x89, b'P', b'N', b'G']));
        assert!(page.width.max(page.height) <= 2000);
    }
}

#[tokio::test]
async fn text_extraction_produces_one_section_per_page() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("cv_two_pages.pdf"));
    let bytes = std::fs::read(&path).unwrap();

    let config = pdfium_config();
    let converter = Converter::new(
        &config,
        Arc::new(PdfiumEngine::new(&config)),
        Arc::new(NoModel),
    );
    let out = converter.extract_html(&bytes).await.expect("extract should succeed");
    assert_eq!(out.html.matches("<section class=\"page\"").count(), out.page_count);
    std::fs::write(output_dir().join("cv_two_pages.text.html"), &out.html).ok();
}

#[tokio::test]
async fn corrupt_pdf_is_reported() {
    let _ = e2e_skip_unless_ready!(test_cases_dir());
    let engine = PdfiumEngine::new(&pdfium_config());
    let err = engine
        .rasterize(b"%PDF-1.7\nthis is not really a pdf")
        .await
        .unwrap_err();
    println!("corrupt PDF → {err}");
    assert_eq!(err.kind(), edgequake_pdf2html::ErrorKind::DocumentParse);
}

// ── Live conversions ─────────────────────────────────────────────────────────

async fn live_convert(strategy: Strategy) {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("cv_two_pages.pdf"));
    let key = require_api_key!();
    let bytes = std::fs::read(&path).unwrap();

    let mut builder = ServiceConfig::builder().api_key(key);
    if let Ok(path) = std::env::var("PDF2HTML_PDFIUM_LIB_PATH") {
        builder = builder.pdfium_lib_path(path);
    }
    if let Ok(proxy) = std::env::var("HTTPS_PROXY") {
        builder = builder.proxy(proxy);
    }
    let config = builder.build().unwrap();

    let converter = Converter::new(
        &config,
        Arc::new(PdfiumEngine::new(&config)),
        build_vision_client(&config).unwrap(),
    );
    let out = converter
        .convert(&bytes, Some(strategy))
        .await
        .expect("live conversion should succeed");

    assert_html_quality(&out.html, &strategy.to_string());
    match strategy {
        Strategy::Batched => assert_eq!(out.stats.inference_calls, 1),
        Strategy::PerPage => assert_eq!(out.stats.inference_calls, out.page_count),
    }
    println!(
        "{}: {} calls, {} in / {} out tokens, {}ms",
        strategy, out.stats.inference_calls, out.stats.input_tokens, out.stats.output_tokens, out.stats.total_ms
    );
    std::fs::write(output_dir().join(format!("cv_two_pages.{strategy}.html")), &out.html).ok();
}

#[tokio::test]
async fn live_batched_conversion() {
    live_convert(Strategy::Batched).await;
}

#[tokio::test]
async fn live_per_page_conversion() {
    live_convert(Strategy::PerPage).await;
}

// ── HTML → PDF ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn chromium_prints_a4_pdf() {
    let _ = e2e_skip_unless_ready!(test_cases_dir());
    let program = std::env::var("PDF2HTML_RENDERER_PROGRAM").unwrap_or_else(|_| "chromium".into());

    let root = tempfile::tempdir().unwrap();
    let config = ServiceConfig::builder()
        .render_backend(RenderBackend::Chromium)
        .renderer_program(program)
        .temp_dir(root.path())
        .build()
        .unwrap();
    let printer = Printer::new(&config, Arc::new(CommandRenderer::new(&config)));

    let html = "<!DOCTYPE html><html><head><title>CV</title></head><body><h1>Ada Lovelace</h1></body></html>";
    let printed = match printer.print(html).await {
        Ok(p) => p,
        Err(e) => {
            println!("SKIP: renderer unavailable: {e}");
            return;
        }
    };
    let chunks: Vec<_> = printed.into_stream().try_collect().await.unwrap();
    let pdf: Vec<u8> = chunks.concat();
    assert!(pdf.starts_with(b"%PDF"));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    std::fs::write(output_dir().join("ada.pdf"), &pdf).ok();
}

/// Vision client for tests that must never reach a model.
struct NoModel;

#[async_trait::async_trait]
impl edgequake_pdf2html::pipeline::llm::VisionClient for NoModel {
    fn name(&self) -> &str {
        "none"
    }

    async fn infer(
        &self,
        _prompt: &[edgequake_pdf2html::pipeline::prompt::PromptUnit],
    ) -> Result<edgequake_pdf2html::pipeline::llm::InferenceOutput, edgequake_pdf2html::Pdf2HtmlError> {
        panic!("text extraction must not call the model");
    }
}
