//! Service configuration.
//!
//! Every knob lives in [`ServiceConfig`], built once at start-up through
//! [`ServiceConfigBuilder`] and then passed by reference into the pieces that
//! need it ([`crate::convert::Converter::new`],
//! [`crate::pipeline::gemini::GeminiClient::new`],
//! [`crate::print::Printer::new`]). Library code never reads environment
//! variables; the `pdf2html` binary is the only place that maps env vars and
//! flags onto the builder.

use crate::error::Pdf2HtmlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default Gemini model, used when no override is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Base URL of the Gemini REST API.
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Placeholder substituted for profile photos detected by the model.
pub const DEFAULT_PROFILE_PICTURE_URL: &str =
    "https://www.gravatar.com/avatar/00000000000000000000000000000000?d=mp&f=y";

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use edgequake_pdf2html::{ServiceConfig, Strategy};
///
/// let config = ServiceConfig::builder()
///     .api_key("test-key")
///     .strategy(Strategy::PerPage)
///     .dpi(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-2.5-flash-lite");
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// API key for the Gemini REST API. Required unless `provider_name` is set.
    pub api_key: Option<String>,

    /// Proxy URL applied to every outbound inference request.
    pub proxy: Option<String>,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// edgequake-llm provider name (openai, anthropic, gemini, ollama, …).
    ///
    /// When set, inference goes through `edgequake_llm::ProviderFactory`
    /// instead of the built-in Gemini client; that provider reads its own
    /// credentials from the environment.
    pub provider_name: Option<String>,

    /// Base URL for the Gemini REST API. Default: [`DEFAULT_GEMINI_ENDPOINT`].
    pub gemini_endpoint: String,

    /// URL the model should use as `src` of a detected profile photo.
    pub profile_picture_url: String,

    /// Custom instruction template replacing the built-in one for both strategies.
    ///
    /// `{profile_picture_url}` is substituted the same way as in the defaults.
    pub system_prompt: Option<String>,

    /// Default batching strategy. Requests may override it. Default: batched.
    pub strategy: Strategy,

    /// Run the second "editable tagger" pass over the generated HTML. Default: false.
    pub tag_editable: bool,

    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 2000.
    ///
    /// An A0 poster at 150 DPI would be ~7000 px tall; the cap keeps memory
    /// and upload size bounded regardless of the physical page size.
    pub max_rendered_pixels: u32,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 16384.
    ///
    /// A batched call returns the whole document, so this is sized for
    /// several dense pages of Tailwind markup rather than one.
    pub max_tokens: usize,

    /// Per-inference-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Whole-conversion timeout in seconds. Default: 600.
    pub request_timeout_secs: u64,

    /// Root under which per-request scratch directories are created. Default: `temp`.
    pub temp_dir: PathBuf,

    /// HTML→PDF backend. Default: Chromium.
    pub render_backend: RenderBackend,

    /// Program to execute for the render backend. Default: the backend's usual binary name.
    pub renderer_program: Option<PathBuf>,

    /// Renderer subprocess timeout in seconds. Default: 60.
    pub render_timeout_secs: u64,

    /// Path to libpdfium (file or directory). Default: working dir, then system.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Socket address the server binds. Default: `0.0.0.0:8000`.
    pub listen_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            proxy: None,
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            profile_picture_url: DEFAULT_PROFILE_PICTURE_URL.to_string(),
            system_prompt: None,
            strategy: Strategy::default(),
            tag_editable: false,
            dpi: 150,
            max_rendered_pixels: 2000,
            temperature: 0.1,
            max_tokens: 16_384,
            api_timeout_secs: 120,
            request_timeout_secs: 600,
            temp_dir: PathBuf::from("temp"),
            render_backend: RenderBackend::default(),
            renderer_program: None,
            render_timeout_secs: 60,
            pdfium_lib_path: None,
            max_upload_bytes: 50 * 1024 * 1024,
            listen_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("proxy", &self.proxy)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("gemini_endpoint", &self.gemini_endpoint)
            .field("profile_picture_url", &self.profile_picture_url)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("strategy", &self.strategy)
            .field("tag_editable", &self.tag_editable)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("temp_dir", &self.temp_dir)
            .field("render_backend", &self.render_backend)
            .field("renderer_program", &self.renderer_program)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("listen_addr", &self.listen_addr)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.config.proxy = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn gemini_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.gemini_endpoint = url.into();
        self
    }

    pub fn profile_picture_url(mut self, url: impl Into<String>) -> Self {
        self.config.profile_picture_url = url.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn tag_editable(mut self, v: bool) -> Self {
        self.config.tag_editable = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn render_backend(mut self, backend: RenderBackend) -> Self {
        self.config.render_backend = backend;
        self
    }

    pub fn renderer_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.renderer_program = Some(program.into());
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, Pdf2HtmlError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2HtmlError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.model.trim().is_empty() {
            return Err(Pdf2HtmlError::InvalidConfig("Model id must not be empty".into()));
        }
        if c.api_timeout_secs == 0 || c.request_timeout_secs == 0 || c.render_timeout_secs == 0 {
            return Err(Pdf2HtmlError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(Pdf2HtmlError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if let Some(proxy) = &c.proxy {
            if !(proxy.starts_with("http://")
                || proxy.starts_with("https://")
                || proxy.starts_with("socks5://"))
            {
                return Err(Pdf2HtmlError::InvalidConfig(format!(
                    "Proxy must be an http://, https:// or socks5:// URL, got '{proxy}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How page images are grouped into inference calls.
///
/// | Strategy | Calls | Trade-off |
/// |----------|-------|-----------|
/// | `Batched` | 1 | the model sees every page and writes `<head>` once |
/// | `PerPage` | n | smaller requests, but each page is converted blind to the others |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One call carrying the instruction and every page image. (default)
    #[default]
    Batched,
    /// One call per page; results concatenated in page order.
    PerPage,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Batched => f.write_str("batched"),
            Strategy::PerPage => f.write_str("per-page"),
        }
    }
}

/// External program used to print HTML to PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackend {
    /// Headless Chromium / Chrome with `--print-to-pdf`. (default)
    #[default]
    Chromium,
    /// `wkhtmltopdf`.
    Wkhtmltopdf,
}

impl RenderBackend {
    /// Binary name looked up on `PATH` when no program is configured.
    pub fn default_program(&self) -> &'static str {
        match self {
            RenderBackend::Chromium => "chromium",
            RenderBackend::Wkhtmltopdf => "wkhtmltopdf",
        }
    }
}

impl fmt::Display for RenderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_program())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let c = ServiceConfig::default();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.model, "gemini-2.5-flash-lite");
        assert_eq!(c.strategy, Strategy::Batched);
        assert!(!c.tag_editable);
        assert_eq!(c.listen_addr, "0.0.0.0:8000");
    }

    #[test]
    fn builder_rejects_out_of_range_dpi() {
        let err = ServiceConfig::builder().dpi(40).build().unwrap_err();
        assert!(err.to_string().contains("DPI"), "got: {err}");
    }

    #[test]
    fn builder_rejects_bad_proxy() {
        let err = ServiceConfig::builder()
            .proxy("proxy.local:3128")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Proxy"), "got: {err}");

        ServiceConfig::builder()
            .proxy("http://proxy.local:3128")
            .build()
            .expect("http proxy is accepted");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ServiceConfig::builder().api_key("super-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn strategy_serde_names() {
        let s: Strategy = serde_json::from_str("\"per-page\"").unwrap();
        assert_eq!(s, Strategy::PerPage);
        assert_eq!(Strategy::Batched.to_string(), "batched");
        assert_eq!(serde_json::to_string(&Strategy::PerPage).unwrap(), "\"per-page\"");
    }
}
