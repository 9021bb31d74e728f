//! Error types for the edgequake-pdf2html library.
//!
//! Every pipeline stage returns `Result<_, Pdf2HtmlError>` and the
//! orchestrator chains them with `?`. There is no page-level error type: a
//! failure at any stage aborts the whole request, so a single enum is enough.
//!
//! [`Pdf2HtmlError::kind`] classifies a variant into one of the five
//! [`ErrorKind`]s. The HTTP layer maps kinds to status codes and never has
//! to match on individual variants.

use thiserror::Error;

/// Coarse classification of a [`Pdf2HtmlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something we refuse to process (client error).
    Validation,
    /// The PDF could not be opened, read or rendered.
    DocumentParse,
    /// The remote model call failed or returned unusable text.
    Inference,
    /// The HTML→PDF backend failed.
    Render,
    /// Misconfiguration or a bug on our side.
    Internal,
}

/// All errors returned by the edgequake-pdf2html library.
#[derive(Debug, Error)]
pub enum Pdf2HtmlError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The uploaded part declared a content type other than the expected one.
    #[error("Invalid file type '{actual}'. Please upload a file of type '{expected}'.")]
    InvalidContentType { expected: String, actual: String },

    /// The multipart body had no `file` field.
    #[error("No file provided: expected a multipart field named '{field}'")]
    MissingFile { field: String },

    /// The uploaded file has zero bytes.
    #[error("Uploaded file is empty")]
    EmptyUpload,

    /// An HTML upload is not valid UTF-8.
    #[error("Uploaded HTML is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The multipart body itself could not be read.
    #[error("Failed to read multipart upload: {0}")]
    MalformedUpload(String),

    /// The query string could not be parsed (e.g. an unknown `strategy`).
    #[error("Invalid query string: {0}")]
    InvalidQuery(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The bytes do not start with the `%PDF` magic.
    #[error("File is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password; the service does not accept one.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// The document parsed but contains no pages.
    #[error("PDF contains no pages")]
    NoPages,

    /// pdfium returned an error for a specific page (1-indexed).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// pdfium could not read the text layer of a page (1-indexed).
    #[error("Text extraction failed for page {page}: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDF2HTML_PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// VLM API returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'{}", retry_hint(*.retry_after_secs))]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// VLM API returned an authentication error (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// A single VLM call exceeded `api_timeout_secs`.
    #[error("API call timed out after {elapsed_ms}ms ({context})")]
    ApiTimeout { context: String, elapsed_ms: u64 },

    /// The model answered but produced no usable text.
    #[error("Model returned no usable text ({context})")]
    EmptyResponse { context: String },

    /// The whole conversion exceeded `request_timeout_secs`.
    #[error("Conversion timed out after {secs}s")]
    RequestTimeout { secs: u64 },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The HTML→PDF backend exited with an error or produced no file.
    #[error("HTML to PDF rendering with {backend} failed: {detail}")]
    RenderFailed { backend: String, detail: String },

    /// The HTML→PDF backend did not finish in time and was killed.
    #[error("HTML to PDF rendering with {backend} timed out after {secs}s")]
    RenderTimeout { backend: String, secs: u64 },

    /// Creating, writing or reading the scratch directory failed.
    #[error("Scratch file error: {0}")]
    ScratchIo(#[source] std::io::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_hint(retry_after_secs: Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {secs}s)"),
        None => String::new(),
    }
}

impl Pdf2HtmlError {
    /// Classify this error for the request boundary.
    pub fn kind(&self) -> ErrorKind {
        use Pdf2HtmlError::*;
        match self {
            InvalidContentType { .. }
            | MissingFile { .. }
            | EmptyUpload
            | InvalidUtf8(_)
            | MalformedUpload(_)
            | InvalidQuery(_) => ErrorKind::Validation,

            NotAPdf { .. }
            | CorruptPdf { .. }
            | PasswordRequired
            | NoPages
            | RasterisationFailed { .. }
            | TextExtractionFailed { .. }
            | PdfiumBindingFailed(_) => ErrorKind::DocumentParse,

            ProviderNotConfigured { .. }
            | LlmApiError { .. }
            | RateLimitExceeded { .. }
            | AuthError { .. }
            | ApiTimeout { .. }
            | EmptyResponse { .. }
            | RequestTimeout { .. } => ErrorKind::Inference,

            RenderFailed { .. } | RenderTimeout { .. } | ScratchIo(_) => ErrorKind::Render,

            InvalidConfig(_) | Internal(_) => ErrorKind::Internal,
        }
    }

    /// `true` when the caller is at fault.
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}
