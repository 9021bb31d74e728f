//! Server binary for edgequake-pdf2html.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `ServiceConfig`, builds the pdfium engine, the inference client and
//! the renderer once, and serves until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2html::pipeline::llm::build_vision_client;
use edgequake_pdf2html::pipeline::pdfium::bind_pdfium;
use edgequake_pdf2html::pipeline::render::PdfiumEngine;
use edgequake_pdf2html::{
    serve, AppState, CommandRenderer, Converter, Printer, RenderBackend, ServiceConfig, Strategy,
    DEFAULT_GEMINI_ENDPOINT, DEFAULT_MODEL, DEFAULT_PROFILE_PICTURE_URL,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"ENDPOINTS:
  POST /pdf-to-html-gemini/   multipart "file" (application/pdf) -> text/html via the vision model
                              optional ?strategy=batched|per-page
  POST /pdf-to-html/          multipart "file" (application/pdf) -> text/html from the text layer
  POST /html-to-pdf/          multipart "file" (text/html)       -> converted.pdf
  GET  /healthz               liveness probe

EXAMPLES:
  # Gemini, default model, port 8000
  GOOGLE_API_KEY=... pdf2html

  # One request per page, behind a corporate proxy
  pdf2html --strategy per-page --proxy http://proxy.internal:3128

  # Another vision provider through edgequake-llm
  OPENAI_API_KEY=sk-... pdf2html --provider openai --model gpt-4.1-mini

  # Convert a CV
  curl -F "file=@cv.pdf;type=application/pdf" localhost:8000/pdf-to-html-gemini/ > cv.html
  curl -F "file=@cv.html;type=text/html" localhost:8000/html-to-pdf/ -o cv.pdf

SETUP:
  libpdfium must be loadable: set PDF2HTML_PDFIUM_LIB_PATH, place it in the
  working directory, or install it system-wide.
  HTML to PDF needs chromium (default) or wkhtmltopdf on PATH, or
  --renderer-program pointing at the binary.
"#;

/// PDF ⇄ HTML conversion server.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2html",
    version,
    about = "Serve PDF to HTML conversion via a vision LLM, and HTML to PDF via a headless renderer",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Gemini API key.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Proxy for outbound inference requests (http://, https:// or socks5://).
    #[arg(long, env = "HTTPS_PROXY")]
    proxy: Option<String>,

    /// Model ID.
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, azure) instead of the Gemini REST client.
    #[arg(long, env = "PDF2HTML_PROVIDER")]
    provider: Option<String>,

    /// Gemini API base URL.
    #[arg(long, env = "PDF2HTML_GEMINI_ENDPOINT", default_value = DEFAULT_GEMINI_ENDPOINT)]
    gemini_endpoint: String,

    /// Image URL the model should use for detected profile photos.
    #[arg(long, env = "PROFILE_PICTURE_PLACEHOLDER", default_value = DEFAULT_PROFILE_PICTURE_URL)]
    profile_picture: String,

    /// Path to a text file replacing the built-in conversion instruction.
    #[arg(long, env = "PDF2HTML_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Default batching strategy.
    #[arg(long, env = "PDF2HTML_STRATEGY", value_enum, default_value = "batched")]
    strategy: StrategyArg,

    /// Run a second pass marking editable text elements with id="editable".
    #[arg(long, env = "PDF2HTML_TAG_EDITABLE")]
    tag_editable: bool,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2HTML_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Longest rendered page edge in pixels.
    #[arg(long, env = "PDF2HTML_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2HTML_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDF2HTML_MAX_TOKENS", default_value_t = 16_384)]
    max_tokens: usize,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2HTML_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Whole-conversion timeout in seconds.
    #[arg(long, env = "PDF2HTML_REQUEST_TIMEOUT", default_value_t = 600)]
    request_timeout: u64,

    /// Directory for per-request scratch files.
    #[arg(long, env = "PDF2HTML_TEMP_DIR", default_value = "temp")]
    temp_dir: PathBuf,

    /// HTML to PDF backend.
    #[arg(long, env = "PDF2HTML_RENDERER", value_enum, default_value = "chromium")]
    renderer: RendererArg,

    /// Renderer executable (default: chromium or wkhtmltopdf on PATH).
    #[arg(long, env = "PDF2HTML_RENDERER_PROGRAM")]
    renderer_program: Option<PathBuf>,

    /// Renderer timeout in seconds.
    #[arg(long, env = "PDF2HTML_RENDER_TIMEOUT", default_value_t = 60)]
    render_timeout: u64,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDF2HTML_PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "PDF2HTML_MAX_UPLOAD_BYTES", default_value_t = 50 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Interface to bind.
    #[arg(long, env = "PDF2HTML_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2HTML_VERBOSE")]
    verbose: bool,

    /// Log errors only.
    #[arg(short, long, env = "PDF2HTML_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum StrategyArg {
    Batched,
    PerPage,
}

impl From<StrategyArg> for Strategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Batched => Strategy::Batched,
            StrategyArg::PerPage => Strategy::PerPage,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum RendererArg {
    Chromium,
    Wkhtmltopdf,
}

impl From<RendererArg> for RenderBackend {
    fn from(v: RendererArg) -> Self {
        match v {
            RendererArg::Chromium => RenderBackend::Chromium,
            RendererArg::Wkhtmltopdf => RenderBackend::Wkhtmltopdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    tracing::debug!(?config, "configuration loaded");

    // Fail at start-up rather than on the first upload.
    let lib_path = config.pdfium_lib_path.clone();
    tokio::task::spawn_blocking(move || bind_pdfium(lib_path.as_deref()).map(|_| ()))
        .await
        .context("pdfium probe task failed")?
        .context("Failed to load the PDFium engine")?;

    // ── Wire services ────────────────────────────────────────────────────
    let client = build_vision_client(&config).context("Failed to configure the inference client")?;
    let engine = Arc::new(PdfiumEngine::new(&config));
    let converter = Converter::new(&config, engine, client);
    let printer = Printer::new(&config, Arc::new(CommandRenderer::new(&config)));

    let state = AppState {
        converter: Arc::new(converter),
        printer: Arc::new(printer),
    };

    serve(&config, state).await.context("Server failed")?;
    Ok(())
}

fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .model(&cli.model)
        .gemini_endpoint(&cli.gemini_endpoint)
        .profile_picture_url(&cli.profile_picture)
        .strategy(cli.strategy.clone().into())
        .tag_editable(cli.tag_editable)
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .request_timeout_secs(cli.request_timeout)
        .temp_dir(&cli.temp_dir)
        .render_backend(cli.renderer.clone().into())
        .render_timeout_secs(cli.render_timeout)
        .max_upload_bytes(cli.max_upload_bytes)
        .listen_addr(listen_addr(&cli.host, cli.port));

    if let Some(key) = cli.api_key.as_deref().filter(|k| !k.is_empty()) {
        builder = builder.api_key(key);
    }
    if let Some(proxy) = cli.proxy.as_deref().filter(|p| !p.is_empty()) {
        builder = builder.proxy(proxy);
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(path) = &cli.system_prompt {
        let prompt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(program) = &cli.renderer_program {
        builder = builder.renderer_program(program);
    }
    if let Some(path) = &cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path);
    }

    builder.build().context("Invalid configuration")
}

/// `host:port`, bracketing IPv6 hosts.
fn listen_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
