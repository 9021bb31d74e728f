//! HTML → PDF printing through a headless renderer.
//!
//! Each request gets its own scratch directory (a [`tempfile::TempDir`]
//! under `temp_dir`). The renderer writes its PDF there.
//! The directory is owned by the [`PrintedPdf`] handed back to the caller;
//! it is deleted as soon as that value, or the stream made from it, is
//! dropped. That covers a fully sent response, a client that disconnects
//! mid-download, and every error path before the response exists.
//!
//! The uploaded document never gets a `file://` origin. [`CommandRenderer`]
//! serves it from a loopback listener for the lifetime of the render, so a
//! page cannot pull other files off the host into its PDF.
//!
//! Two [`RenderBackend`]s are supported through one [`CommandRenderer`]:
//!
//! | Backend | Invocation |
//! |---------|-----------|
//! | Chromium | `chromium --headless --print-to-pdf=out.pdf http://127.0.0.1:…/input.html` |
//! | wkhtmltopdf | `wkhtmltopdf --disable-local-file-access --page-size A4 http://127.0.0.1:…/input.html out.pdf` |

use crate::config::{RenderBackend, ServiceConfig};
use crate::error::Pdf2HtmlError;
use async_trait::async_trait;
use axum::{body::Bytes, response::Html, routing::get, Router};
use futures::Stream;
use std::ffi::OsString;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const INPUT_PATH: &str = "/input.html";
const OUTPUT_FILE: &str = "converted.pdf";
const CHUNK_SIZE: usize = 64 * 1024;

/// Chromium ignores `--page-size`; the paper size comes from CSS instead.
const A4_PAGE_RULE: &str = "<style>@page { size: A4; }</style>";

/// Something that turns an HTML document into a PDF file.
#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    /// Backend name for logs and error messages.
    fn name(&self) -> &str;

    /// Render `html` to a PDF inside `scratch` and return the PDF's path.
    ///
    /// Everything written must stay inside `scratch`.
    async fn render(&self, html: &str, scratch: &Path) -> Result<PathBuf, Pdf2HtmlError>;
}

/// [`HtmlRenderer`] that runs an external program.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    backend: RenderBackend,
    program: PathBuf,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            backend: config.render_backend,
            program: config
                .renderer_program
                .clone()
                .unwrap_or_else(|| PathBuf::from(config.render_backend.default_program())),
            timeout: Duration::from_secs(config.render_timeout_secs),
        }
    }

    /// Command-line arguments for one render of the document at `url`.
    fn args(&self, url: &str, output: &Path, scratch: &Path) -> Vec<OsString> {
        match self.backend {
            RenderBackend::Chromium => {
                let mut profile = OsString::from("--user-data-dir=");
                profile.push(scratch.join("profile"));
                let mut print_to = OsString::from("--print-to-pdf=");
                print_to.push(output);
                vec![
                    "--headless".into(),
                    "--disable-gpu".into(),
                    "--no-sandbox".into(),
                    "--no-pdf-header-footer".into(),
                    profile,
                    print_to,
                    url.into(),
                ]
            }
            RenderBackend::Wkhtmltopdf => vec![
                "--quiet".into(),
                "--disable-local-file-access".into(),
                "--encoding".into(),
                "utf-8".into(),
                "--page-size".into(),
                "A4".into(),
                url.into(),
                output.as_os_str().to_owned(),
            ],
        }
    }

    /// Document as handed to the backend.
    fn prepare(&self, html: &str) -> String {
        match self.backend {
            RenderBackend::Chromium => with_a4_page_rule(html),
            RenderBackend::Wkhtmltopdf => html.to_string(),
        }
    }
}

#[async_trait]
impl HtmlRenderer for CommandRenderer {
    fn name(&self) -> &str {
        self.backend.default_program()
    }

    async fn render(&self, html: &str, scratch: &Path) -> Result<PathBuf, Pdf2HtmlError> {
        // Chromium writes its output relative to its own working directory,
        // so hand it an absolute path.
        let scratch = tokio::fs::canonicalize(scratch)
            .await
            .map_err(Pdf2HtmlError::ScratchIo)?;
        let output = scratch.join(OUTPUT_FILE);

        // Stays up until this function returns.
        let document = DocumentServer::start(self.prepare(html)).await?;
        let args = self.args(&document.url(), &output, &scratch);
        debug!("Running {} {:?}", self.program.display(), args);

        let child = tokio::process::Command::new(&self.program)
            .args(&args)
            .current_dir(&scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Pdf2HtmlError::RenderFailed {
                backend: self.name().to_string(),
                detail: format!("cannot start '{}': {}", self.program.display(), e),
            })?;

        // Dropping the wait future on timeout kills the child.
        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Pdf2HtmlError::RenderTimeout {
                backend: self.name().to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| Pdf2HtmlError::RenderFailed {
                backend: self.name().to_string(),
                detail: e.to_string(),
            })?;

        if !result.status.success() {
            return Err(Pdf2HtmlError::RenderFailed {
                backend: self.name().to_string(),
                detail: format!("{}: {}", result.status, stderr_tail(&result.stderr)),
            });
        }
        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(Pdf2HtmlError::RenderFailed {
                backend: self.name().to_string(),
                detail: format!("no output written ({})", stderr_tail(&result.stderr)),
            });
        }
        Ok(output)
    }
}

/// One document served over loopback HTTP. Dropping it stops the listener.
struct DocumentServer {
    addr: SocketAddr,
    _stop: oneshot::Sender<()>,
}

impl DocumentServer {
    async fn start(html: String) -> Result<Self, Pdf2HtmlError> {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(Pdf2HtmlError::ScratchIo)?;
        let addr = listener.local_addr().map_err(Pdf2HtmlError::ScratchIo)?;
        let app = Router::new().route(
            INPUT_PATH,
            get(move || {
                let body = html.clone();
                async move { Html(body) }
            }),
        );

        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let shutdown = async {
                let _ = stopped.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                warn!("Document listener on {} failed: {}", addr, e);
            }
        });
        debug!("Serving document on {}", addr);
        Ok(Self { addr, _stop: stop })
    }

    fn url(&self) -> String {
        format!("http://{}{}", self.addr, INPUT_PATH)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "no diagnostics".to_string();
    }
    let start = text
        .char_indices()
        .rev()
        .nth(499)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

/// Insert the A4 `@page` rule right after `<head>`, or in front of the
/// document when it has none.
fn with_a4_page_rule(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let head_end = lower
        .find("<head")
        .and_then(|start| lower[start..].find('>').map(|off| start + off + 1));
    match head_end {
        Some(pos) => format!("{}{}{}", &html[..pos], A4_PAGE_RULE, &html[pos..]),
        None => format!("{A4_PAGE_RULE}{html}"),
    }
}

// ── Printer ──────────────────────────────────────────────────────────────

/// Runs renders inside per-request scratch directories.
pub struct Printer {
    renderer: Arc<dyn HtmlRenderer>,
    temp_root: PathBuf,
}

impl Printer {
    pub fn new(config: &ServiceConfig, renderer: Arc<dyn HtmlRenderer>) -> Self {
        Self {
            renderer,
            temp_root: config.temp_dir.clone(),
        }
    }

    /// Root under which scratch directories are created.
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Render `html` and open the result for streaming.
    ///
    /// On error the scratch directory is already gone when this returns.
    pub async fn print(&self, html: &str) -> Result<PrintedPdf, Pdf2HtmlError> {
        let start = Instant::now();
        tokio::fs::create_dir_all(&self.temp_root)
            .await
            .map_err(Pdf2HtmlError::ScratchIo)?;
        let scratch = tempfile::Builder::new()
            .prefix("html2pdf-")
            .tempdir_in(&self.temp_root)
            .map_err(Pdf2HtmlError::ScratchIo)?;

        let pdf_path = self.renderer.render(html, scratch.path()).await.map_err(|e| {
            warn!("{} failed: {}", self.renderer.name(), e);
            e
        })?;

        let file = tokio::fs::File::open(&pdf_path)
            .await
            .map_err(Pdf2HtmlError::ScratchIo)?;
        let len = file
            .metadata()
            .await
            .map_err(Pdf2HtmlError::ScratchIo)?
            .len();
        if len == 0 {
            return Err(Pdf2HtmlError::RenderFailed {
                backend: self.renderer.name().to_string(),
                detail: "empty PDF".to_string(),
            });
        }

        info!(
            "Rendered {} bytes of HTML to a {} byte PDF with {} in {:?}",
            html.len(),
            len,
            self.renderer.name(),
            start.elapsed()
        );
        Ok(PrintedPdf {
            file,
            len,
            scratch,
        })
    }
}

/// A rendered PDF, open for reading, plus the scratch directory holding it.
#[derive(Debug)]
pub struct PrintedPdf {
    file: tokio::fs::File,
    len: u64,
    scratch: TempDir,
}

impl PrintedPdf {
    /// Size of the PDF in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Scratch directory holding the PDF.
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Stream the file in chunks. The scratch directory is removed when the
    /// stream ends or is dropped.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        let PrintedPdf { file, scratch, .. } = self;
        futures::stream::try_unfold((file, scratch), |(mut file, scratch)| async move {
            let mut buf = vec![0u8; CHUNK_SIZE];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                debug!("Finished streaming, removing {}", scratch.path().display());
                return Ok(None);
            }
            buf.truncate(n);
            Ok(Some((Bytes::from(buf), (file, scratch))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    struct FakeRenderer {
        fail: bool,
    }

    #[async_trait]
    impl HtmlRenderer for FakeRenderer {
        fn name(&self) -> &str {
            "fake"
        }

        async fn render(&self, html: &str, scratch: &Path) -> Result<PathBuf, Pdf2HtmlError> {
            tokio::fs::write(scratch.join("input.html"), html)
                .await
                .map_err(Pdf2HtmlError::ScratchIo)?;
            if self.fail {
                return Err(Pdf2HtmlError::RenderFailed {
                    backend: "fake".into(),
                    detail: "boom".into(),
                });
            }
            let out = scratch.join(OUTPUT_FILE);
            tokio::fs::write(&out, format!("%PDF-1.4\n{html}"))
                .await
                .map_err(Pdf2HtmlError::ScratchIo)?;
            Ok(out)
        }
    }

    fn printer(root: &Path, fail: bool) -> Printer {
        let config = ServiceConfig::builder().temp_dir(root).build().unwrap();
        Printer::new(&config, Arc::new(FakeRenderer { fail }))
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn streamed_pdf_removes_scratch_when_done() {
        let root = tempfile::tempdir().unwrap();
        let printed = printer(root.path(), false).print("<p>hi</p>").await.unwrap();
        assert!(printed.scratch_path().exists());
        assert_eq!(entries(root.path()), 1);

        let chunks: Vec<Bytes> = printed.into_stream().try_collect().await.unwrap();
        let body: Vec<u8> = chunks.concat();
        assert_eq!(body, b"%PDF-1.4\n<p>hi</p>");
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn dropped_pdf_removes_scratch() {
        let root = tempfile::tempdir().unwrap();
        let printed = printer(root.path(), false).print("<p>hi</p>").await.unwrap();
        drop(printed);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn failed_render_removes_scratch() {
        let root = tempfile::tempdir().unwrap();
        let err = printer(root.path(), true).print("<p>hi</p>").await.unwrap_err();
        assert!(matches!(err, Pdf2HtmlError::RenderFailed { .. }));
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn a4_rule_goes_inside_head() {
        let html = "<!DOCTYPE html><HTML><Head lang=\"en\"><title>x</title></head><body></body></html>";
        let out = with_a4_page_rule(html);
        assert!(out.starts_with("<!DOCTYPE html><HTML><Head lang=\"en\"><style>@page"));
        assert!(out.ends_with("<title>x</title></head><body></body></html>"));

        assert_eq!(with_a4_page_rule("<p>x</p>"), format!("{A4_PAGE_RULE}<p>x</p>"));
    }

    #[test]
    fn backend_arguments() {
        let url = "http://127.0.0.1:4000/input.html";
        let config = ServiceConfig::default();
        let chromium = CommandRenderer::new(&config);
        let args = chromium.args(url, Path::new("/s/converted.pdf"), Path::new("/s"));
        assert!(args.contains(&OsString::from("--headless")));
        assert!(args.contains(&OsString::from("--print-to-pdf=/s/converted.pdf")));
        assert_eq!(args.last(), Some(&OsString::from(url)));

        let config = ServiceConfig::builder()
            .render_backend(RenderBackend::Wkhtmltopdf)
            .build()
            .unwrap();
        let wk = CommandRenderer::new(&config);
        let args = wk.args(url, Path::new("/s/converted.pdf"), Path::new("/s"));
        let page_size = args.iter().position(|a| a == "--page-size").unwrap();
        assert_eq!(args[page_size + 1], "A4");
        assert_eq!(args[args.len() - 2], url);
        assert_eq!(args[args.len() - 1], "/s/converted.pdf");
    }

    #[test]
    fn no_backend_opens_the_document_from_disk() {
        let url = "http://127.0.0.1:4000/input.html";
        for backend in [RenderBackend::Chromium, RenderBackend::Wkhtmltopdf] {
            let config = ServiceConfig::builder().render_backend(backend).build().unwrap();
            let args = CommandRenderer::new(&config).args(url, Path::new("/s/converted.pdf"), Path::new("/s"));
            assert!(
                args.iter().all(|a| !a.to_string_lossy().contains("file:")),
                "{backend:?}: {args:?}"
            );
            assert!(
                args.iter().all(|a| a != "--allow-file-access-from-files"),
                "{backend:?}: {args:?}"
            );
        }

        let config = ServiceConfig::builder()
            .render_backend(RenderBackend::Wkhtmltopdf)
            .build()
            .unwrap();
        let args = CommandRenderer::new(&config).args(url, Path::new("/s/converted.pdf"), Path::new("/s"));
        assert!(args.contains(&OsString::from("--disable-local-file-access")));
    }

    fn loopback() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn document_is_served_over_loopback_until_dropped() {
        let html = "<!DOCTYPE html><html><body><p>Ada</p></body></html>";
        let server = DocumentServer::start(html.to_string()).await.unwrap();
        let url = server.url();
        assert!(url.starts_with("http://127.0.0.1:"), "got {url}");

        let response = loopback().get(&url).send().await.unwrap();
        assert!(response.status().is_success());
        assert!(response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html")));
        assert_eq!(response.text().await.unwrap(), html);

        let elsewhere = url.replace(INPUT_PATH, "/etc/passwd");
        assert_eq!(loopback().get(&elsewhere).send().await.unwrap().status(), 404);

        drop(server);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(loopback().get(&url).send().await.is_err(), "listener should be closed");
    }

    #[tokio::test]
    async fn missing_program_is_render_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let config = ServiceConfig::builder()
            .renderer_program("/nonexistent/renderer-binary")
            .build()
            .unwrap();
        let err = CommandRenderer::new(&config)
            .render("<p>x</p>", scratch.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2HtmlError::RenderFailed { .. }), "got: {err}");
        assert!(err.to_string().contains("cannot start"));
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("renderer.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn wkhtmltopdf_style_program_writes_last_argument() {
        let bin = tempfile::tempdir().unwrap();
        let program = script(bin.path(), "for last; do :; done\nprintf '%%PDF-1.4 fake' > \"$last\"");
        let config = ServiceConfig::builder()
            .render_backend(RenderBackend::Wkhtmltopdf)
            .renderer_program(program)
            .build()
            .unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let out = CommandRenderer::new(&config)
            .render("<p>x</p>", scratch.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(out).unwrap(), b"%PDF-1.4 fake");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_reports_stderr() {
        let bin = tempfile::tempdir().unwrap();
        let program = script(bin.path(), "echo 'cannot load page' >&2\nexit 3");
        let config = ServiceConfig::builder()
            .render_backend(RenderBackend::Wkhtmltopdf)
            .renderer_program(program)
            .build()
            .unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let err = CommandRenderer::new(&config)
            .render("<p>x</p>", scratch.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot load page"), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_program_times_out() {
        let bin = tempfile::tempdir().unwrap();
        let program = script(bin.path(), "sleep 10");
        let config = ServiceConfig::builder()
            .render_backend(RenderBackend::Wkhtmltopdf)
            .renderer_program(program)
            .render_timeout_secs(1)
            .build()
            .unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let err = CommandRenderer::new(&config)
            .render("<p>x</p>", scratch.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2HtmlError::RenderTimeout { secs: 1, .. }));
    }
}
