//! HTTP surface.
//!
//! | Route | Input | Output |
//! |-------|-------|--------|
//! | `POST /pdf-to-html-gemini/` | multipart `file`, `application/pdf`; `?strategy=` | `text/html` via the vision model |
//! | `POST /pdf-to-html/` | multipart `file`, `application/pdf` | `text/html` from the text layer |
//! | `POST /html-to-pdf/` | multipart `file`, `text/html` | `application/pdf` attachment `converted.pdf` |
//! | `GET /healthz` | | `{"status":"ok"}` |
//!
//! Validation failures answer 400, everything else 500, both with a
//! `{"detail": "<message>"}` body. The upload's declared content type is
//! checked before its bytes are read, so a wrong type never reaches pdfium or
//! the model.

use crate::config::{ServiceConfig, Strategy};
use crate::convert::Converter;
use crate::error::Pdf2HtmlError;
use crate::pipeline::input::{self, HTML_CONTENT_TYPE, PDF_CONTENT_TYPE};
use crate::print::Printer;
use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

const HEALTHZ_STATUS: &str = "ok";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const PDF_DISPOSITION: &str = "attachment; filename=\"converted.pdf\"";

/// Handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub converter: Arc<Converter>,
    pub printer: Arc<Printer>,
}

#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq)]
struct HealthzResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConvertParams {
    pub strategy: Option<Strategy>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ShutdownEvent {
    Pending,
    CtrlC,
    SigTerm,
    ListenerFailed,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listen address may not be empty")]
    EmptyListenAddr,
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("axum server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

/// Request-boundary error: the status comes from [`Pdf2HtmlError::kind`].
#[derive(Debug)]
pub struct AppError(Pdf2HtmlError);

impl From<Pdf2HtmlError> for AppError {
    fn from(err: Pdf2HtmlError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            tracing::info!(error = %self.0, "rejected upload");
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!(error = %self.0, kind = ?self.0.kind(), "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorBody {
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Routes, body limit and request tracing.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/pdf-to-html-gemini/", post(pdf_to_html_gemini))
        .route("/pdf-to-html-gemini", post(pdf_to_html_gemini))
        .route("/pdf-to-html/", post(pdf_to_html))
        .route("/pdf-to-html", post(pdf_to_html))
        .route("/html-to-pdf/", post(html_to_pdf))
        .route("/html-to-pdf", post(html_to_pdf))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(HealthzResponse {
        status: HEALTHZ_STATUS,
    })
}

async fn pdf_to_html_gemini(
    State(state): State<AppState>,
    params: Result<Query<ConvertParams>, QueryRejection>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let Query(params) = params.map_err(|e| Pdf2HtmlError::InvalidQuery(e.body_text()))?;
    let pdf = read_upload(multipart, PDF_CONTENT_TYPE).await?;
    let output = state.converter.convert(&pdf, params.strategy).await?;
    Ok(Html(output.html).into_response())
}

async fn pdf_to_html(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    let pdf = read_upload(multipart, PDF_CONTENT_TYPE).await?;
    let output = state.converter.extract_html(&pdf).await?;
    Ok(Html(output.html).into_response())
}

async fn html_to_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    let bytes = read_upload(multipart, HTML_CONTENT_TYPE).await?;
    let html = input::decode_html(bytes)?;
    let printed = state.printer.print(&html).await?;
    let len = printed.len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, PDF_CONTENT_TYPE)
        .header(header::CONTENT_DISPOSITION, PDF_DISPOSITION)
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(printed.into_stream()))
        .map_err(|e| AppError(Pdf2HtmlError::Internal(format!("response: {e}"))))
}

/// Pull the `file` field out of a multipart body.
///
/// The declared content type is checked before any of the field's bytes are
/// read. Other fields are skipped.
pub async fn read_upload(mut multipart: Multipart, expected: &str) -> Result<Vec<u8>, Pdf2HtmlError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Pdf2HtmlError::MalformedUpload(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        input::check_content_type(field.content_type(), expected)?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Pdf2HtmlError::MalformedUpload(e.body_text()))?;
        if bytes.is_empty() {
            return Err(Pdf2HtmlError::EmptyUpload);
        }
        tracing::debug!(bytes = bytes.len(), content_type = expected, "upload received");
        return Ok(bytes.to_vec());
    }
    Err(Pdf2HtmlError::MissingFile {
        field: FILE_FIELD.to_string(),
    })
}

/// Bind `config.listen_addr` and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: &ServiceConfig, state: AppState) -> Result<(), ServerError> {
    let listen_addr = parse_listen_addr(&config.listen_addr)?;
    let listener = bind_listener(listen_addr).await?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::LocalAddr { source })?;
    tracing::info!(%local_addr, "pdf2html server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownEvent::Pending);
    let shutdown_future = broadcast_shutdown(shutdown_tx);

    let app = build_router(state, config.max_upload_bytes);

    let mut server_future = Box::pin(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_future)
            .await
    });

    let drain_rx = shutdown_rx.clone();
    let mut drain_timeout = Box::pin(drain_timeout_future(drain_rx));

    tokio::select! {
        result = server_future.as_mut() => {
            if let Err(source) = result {
                return Err(ServerError::Serve { source });
            }
        }
        _ = drain_timeout.as_mut() => {
            // Dropping the server future aborts in-flight conversions.
        }
    }

    let final_event = *shutdown_rx.borrow();
    if final_event == ShutdownEvent::Pending {
        tracing::info!("server stopped without external shutdown signal");
    } else {
        tracing::info!(?final_event, "server shutdown complete");
    }

    Ok(())
}

async fn wait_for_shutdown() -> ShutdownEvent {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownEvent::CtrlC,
            Err(error) => {
                tracing::warn!(%error, "failed to capture Ctrl+C signal");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(_) => ShutdownEvent::SigTerm,
                None => ShutdownEvent::ListenerFailed,
            },
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending();

    tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    }
}

fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(ServerError::EmptyListenAddr);
    }

    trimmed
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: trimmed.to_string(),
            source,
        })
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })
}

fn broadcast_shutdown(
    sender: watch::Sender<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let event = wait_for_shutdown().await;
        if let Err(error) = sender.send(event) {
            tracing::warn!(?event, %error, "failed to broadcast shutdown event");
        }
    }
}

fn drain_timeout_future(
    mut receiver: watch::Receiver<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        if receiver.changed().await.is_ok() {
            let event = *receiver.borrow_and_update();
            tracing::info!(?event, "shutdown signal received; draining connections");
            tokio::time::sleep(DRAIN_TIMEOUT).await;
            tracing::warn!(
                ?event,
                seconds = DRAIN_TIMEOUT.as_secs(),
                "graceful shutdown timed out; continuing shutdown"
            );
        }
    }
}
