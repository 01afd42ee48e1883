//! VLM interaction: send one receipt image, get one [`Receipt`] back.
//!
//! [`Extractor`] is the seam between the scanner and the model. The
//! production implementation, [`VisionExtractor`], builds a two-message
//! request (system instruction with the schema, then the image) and hands the
//! answer to [`crate::pipeline::parse`].
//!
//! There is no retry or backoff: each user action is exactly one request.
//! Whatever goes wrong (transport, timeout, bad JSON) comes back as
//! [`AttemptError::Extraction`] with the same user-facing message.

use crate::config::ScannerConfig;
use crate::error::AttemptError;
use crate::model::Receipt;
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::parse::parse_receipt;
use crate::prompts::{extraction_prompt, DEFAULT_RECEIPT_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Turns one encoded image into one receipt.
pub trait Extractor: Send + Sync {
    fn extract<'a>(&'a self, image: &'a EncodedImage) -> BoxFuture<'a, Result<Receipt, AttemptError>>;
}

/// [`Extractor`] backed by an `edgequake-llm` vision provider.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    timeout: Option<Duration>,
}

impl VisionExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ScannerConfig) -> Self {
        let instruction = config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_RECEIPT_PROMPT);
        Self {
            provider,
            system_prompt: extraction_prompt(instruction),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.api_timeout_secs.map(Duration::from_secs),
        }
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    async fn extract_receipt(&self, image: &EncodedImage) -> Result<Receipt, AttemptError> {
        let start = Instant::now();
        let fail = |detail: String| AttemptError::Extraction { detail };

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images("", vec![image.to_image_data()]),
        ];
        let options = self.build_options();

        let call = self.provider.chat(&messages, Some(&options));
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| fail(format!("timed out after {}s", limit.as_secs())))?,
            None => call.await,
        };

        let response = result.map_err(|e| {
            warn!("Extraction request failed: {}", e);
            fail(e.to_string())
        })?;

        debug!(
            "Extraction: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        parse_receipt(&response.content).inspect_err(|e| {
            warn!("Unusable model answer: {}", e.detail());
        })
    }
}

impl Extractor for VisionExtractor {
    fn extract<'a>(&'a self, image: &'a EncodedImage) -> BoxFuture<'a, Result<Receipt, AttemptError>> {
        Box::pin(self.extract_receipt(image))
    }
}
