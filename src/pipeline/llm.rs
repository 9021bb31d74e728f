//! VLM interaction: the [`VisionClient`] seam and its edgequake-llm adapter.
//!
//! The orchestrator only ever sees `VisionClient::infer`. Two
//! implementations exist:
//!
//! * [`crate::pipeline::gemini::GeminiClient`], the default, which talks to
//!   the Gemini REST API directly so the configured proxy can be applied to
//!   its HTTP client explicitly;
//! * [`ProviderClient`], which wraps any `edgequake_llm::LLMProvider`
//!   (OpenAI, Anthropic, Gemini, Ollama, Azure, …) when a provider name is
//!   configured.
//!
//! Neither retries. A failed call is returned to the orchestrator as-is and
//! fails the request.

use crate::config::ServiceConfig;
use crate::error::Pdf2HtmlError;
use crate::pipeline::encode::to_base64;
use crate::pipeline::gemini::GeminiClient;
use crate::pipeline::prompt::PromptUnit;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Raw model answer plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceOutput {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl InferenceOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// A remote generative model that accepts text and images.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Short provider name for logs and error messages.
    fn name(&self) -> &str;

    /// Send one request made of `prompt`, in order, and return the raw text.
    async fn infer(&self, prompt: &[PromptUnit]) -> Result<InferenceOutput, Pdf2HtmlError>;
}

/// Pick the inference backend described by `config`.
///
/// A configured `provider_name` selects edgequake-llm; otherwise the Gemini
/// REST client is used, which needs `api_key`.
pub fn build_vision_client(config: &ServiceConfig) -> Result<Arc<dyn VisionClient>, Pdf2HtmlError> {
    match config.provider_name.as_deref() {
        Some(name) => {
            let client = ProviderClient::from_name(name, config)?;
            info!("Inference via edgequake-llm provider '{}' ({})", name, config.model);
            Ok(Arc::new(client))
        }
        None => {
            let client = GeminiClient::new(config)?;
            info!("Inference via Gemini REST API ({})", config.model);
            Ok(Arc::new(client))
        }
    }
}

/// [`VisionClient`] over an edgequake-llm provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    name: String,
    temperature: f32,
    max_tokens: usize,
    api_timeout: Duration,
}

impl ProviderClient {
    /// Wrap an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>, config: &ServiceConfig) -> Self {
        Self {
            provider,
            name: name.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Build a provider by name via [`ProviderFactory::create_llm_provider`].
    ///
    /// The provider reads its API key from the environment variable it
    /// documents (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …).
    pub fn from_name(provider_name: &str, config: &ServiceConfig) -> Result<Self, Pdf2HtmlError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, &config.model).map_err(|e| {
            Pdf2HtmlError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        if config.proxy.is_some() {
            warn!(
                "Provider '{}' uses its own HTTP client; the configured proxy applies only through standard proxy environment variables",
                provider_name
            );
        }
        Ok(Self::new(provider, provider_name, config))
    }
}

/// Build `CompletionOptions` from the configured sampling settings.
fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Map prompt units onto chat messages.
///
/// ## Message Layout
///
/// 1. **System message**: the first text unit (the instruction).
/// 2. **User message**: remaining text units joined by blank lines, with every
///    image attached as a base64 PNG in prompt order.
///
/// The user text may be empty: VLM APIs need one user turn to answer, but the
/// images carry the content.
pub fn build_messages(prompt: &[PromptUnit]) -> Vec<ChatMessage> {
    let mut instruction: Option<&str> = None;
    let mut user_text: Vec<&str> = Vec::new();
    let mut images: Vec<ImageData> = Vec::new();

    for unit in prompt {
        match unit {
            PromptUnit::Text(text) if instruction.is_none() => instruction = Some(text.as_str()),
            PromptUnit::Text(text) => user_text.push(text.as_str()),
            PromptUnit::Image { mime_type, data, .. } => {
                images.push(ImageData::new(to_base64(data), *mime_type).with_detail("high"));
            }
        }
    }

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = instruction {
        messages.push(ChatMessage::system(system));
    }
    let text = user_text.join("\n\n");
    messages.push(ChatMessage::user_with_images(&text, images));
    messages
}

#[async_trait]
impl VisionClient for ProviderClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn infer(&self, prompt: &[PromptUnit]) -> Result<InferenceOutput, Pdf2HtmlError> {
        let start = Instant::now();
        let messages = build_messages(prompt);
        let options = build_options(self.temperature, self.max_tokens);

        let response = tokio::time::timeout(self.api_timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| Pdf2HtmlError::ApiTimeout {
                context: format!("provider {}", self.name),
                elapsed_ms: start.elapsed().as_millis() as u64,
            })?
            .map_err(|e| Pdf2HtmlError::LlmApiError {
                message: format!("{}: {}", self.name, e),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.name,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(InferenceOutput {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}
