//! Direct Gemini `generateContent` client.
//!
//! The request mirrors the prompt units one-to-one: a single `user` content
//! whose parts are the instruction text followed by `inlineData` PNG parts,
//! in page order. The answer is the concatenated text of the first
//! candidate's parts.
//!
//! The configured proxy is installed on this client's `reqwest::Client`
//! (`Proxy::all`), so routing inference through a proxy never depends on
//! process-wide environment variables.

use crate::config::ServiceConfig;
use crate::error::Pdf2HtmlError;
use crate::pipeline::encode::to_base64;
use crate::pipeline::llm::{InferenceOutput, VisionClient};
use crate::pipeline::prompt::PromptUnit;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const PROVIDER: &str = "gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// [`VisionClient`] for the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: usize,
    api_timeout_secs: u64,
}

impl GeminiClient {
    /// Build a client from the service configuration.
    ///
    /// Fails when no API key is configured or the proxy URL is rejected by
    /// reqwest.
    pub fn new(config: &ServiceConfig) -> Result<Self, Pdf2HtmlError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Pdf2HtmlError::ProviderNotConfigured {
                provider: PROVIDER.to_string(),
                hint: "Set GOOGLE_API_KEY (or --api-key), or choose another provider with --provider."
                    .to_string(),
            })?;

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.api_timeout_secs));
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| Pdf2HtmlError::InvalidConfig(format!("proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| Pdf2HtmlError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: generate_content_url(&config.gemini_endpoint, &config.model),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
            api_timeout_secs: config.api_timeout_secs,
        })
    }

    /// Full `…/models/{model}:generateContent` URL this client posts to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn generate_content_url(endpoint: &str, model: &str) -> String {
    let model = model.trim().trim_start_matches("models/");
    format!(
        "{}/models/{}:generateContent",
        endpoint.trim_end_matches('/'),
        model
    )
}

#[async_trait]
impl VisionClient for GeminiClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn infer(&self, prompt: &[PromptUnit]) -> Result<InferenceOutput, Pdf2HtmlError> {
        let start = Instant::now();
        let body = serde_json::to_vec(&build_request(prompt, self.temperature, self.max_output_tokens))
            .map_err(|e| Pdf2HtmlError::Internal(format!("request encoding: {e}")))?;

        let response = self
            .http
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Pdf2HtmlError::ApiTimeout {
                        context: format!("{PROVIDER}, limit {}s", self.api_timeout_secs),
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    }
                } else {
                    Pdf2HtmlError::LlmApiError {
                        message: format!("{PROVIDER} request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let bytes = response.bytes().await.map_err(|e| Pdf2HtmlError::LlmApiError {
            message: format!("{PROVIDER} response body: {e}"),
        })?;

        if !status.is_success() {
            let err = status_error(status.as_u16(), retry_after_secs, &bytes);
            warn!("{} call failed after {:?}: {}", PROVIDER, start.elapsed(), err);
            return Err(err);
        }

        let parsed: GenerateContentResponse =
            serde_json::from_slice(&bytes).map_err(|e| Pdf2HtmlError::LlmApiError {
                message: format!("{PROVIDER} returned malformed JSON: {e}"),
            })?;
        let output = parse_response(parsed)?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            PROVIDER,
            output.input_tokens,
            output.output_tokens,
            start.elapsed()
        );
        Ok(output)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

fn build_request(prompt: &[PromptUnit], temperature: f32, max_output_tokens: usize) -> GenerateContentRequest {
    let parts = prompt
        .iter()
        .map(|unit| match unit {
            PromptUnit::Text(text) => Part::Text { text: text.clone() },
            PromptUnit::Image { mime_type, data, .. } => Part::Inline {
                inline_data: InlineData {
                    mime_type: *mime_type,
                    data: to_base64(data),
                },
            },
        })
        .collect();

    GenerateContentRequest {
        contents: vec![Content { role: "user", parts }],
        generation_config: GenerationConfig {
            temperature,
            max_output_tokens,
        },
    }
}

fn parse_response(response: GenerateContentResponse) -> Result<InferenceOutput, Pdf2HtmlError> {
    let (input_tokens, output_tokens) = response
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    let Some(candidate) = response.candidates.into_iter().next() else {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(Pdf2HtmlError::LlmApiError {
                message: format!("{PROVIDER} blocked the prompt: {reason}"),
            });
        }
        return Err(Pdf2HtmlError::EmptyResponse {
            context: format!("{PROVIDER} returned no candidates"),
        });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Pdf2HtmlError::EmptyResponse {
            context: format!(
                "{PROVIDER} finish reason {}",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ),
        });
    }

    Ok(InferenceOutput {
        text,
        input_tokens,
        output_tokens,
    })
}

/// Map a non-2xx answer onto an error, keeping the API's own message.
fn status_error(status: u16, retry_after_secs: Option<u64>, body: &[u8]) -> Pdf2HtmlError {
    let detail = match serde_json::from_slice::<ApiErrorEnvelope>(body) {
        Ok(env) if !env.error.status.is_empty() => format!("{}: {}", env.error.status, env.error.message),
        Ok(env) => env.error.message,
        Err(_) => String::from_utf8_lossy(body).chars().take(300).collect(),
    };

    match status {
        401 | 403 => Pdf2HtmlError::AuthError {
            provider: PROVIDER.to_string(),
            detail,
        },
        429 => Pdf2HtmlError::RateLimitExceeded {
            provider: PROVIDER.to_string(),
            retry_after_secs,
        },
        _ => Pdf2HtmlError::LlmApiError {
            message: format!("{PROVIDER} HTTP {status}: {detail}"),
        },
    }
}
