//! Configuration types for receipt scanning.
//!
//! All scanner behaviour is controlled through [`ScannerConfig`], built via
//! its [`ScannerConfigBuilder`]. Setters clamp out-of-range values; `build()`
//! rejects combinations that can never work.

use crate::error::ScanError;
use crate::progress::ObserverRef;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Provider used when nothing else is configured.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Model used with [`DEFAULT_PROVIDER`].
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for a receipt scanner.
///
/// # Example
/// ```rust
/// use edgequake_receipts::ScannerConfig;
///
/// let config = ScannerConfig::builder()
///     .provider_name("openai")
///     .model("gpt-4.1-mini")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.pdf_scale, 2.0);
/// ```
#[derive(Clone)]
pub struct ScannerConfig {
    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Model identifier. If None, uses the provider's vision default.
    pub model: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens for the JSON answer. Default: 2048.
    pub max_tokens: usize,

    /// Upscaling factor applied when rasterising the first PDF page. Default: 2.0.
    pub pdf_scale: f32,

    /// JPEG quality (1–100) for rasterised PDF pages and camera frames. Default: 92.
    pub jpeg_quality: u8,

    /// Custom extraction instruction. The output schema is always appended.
    pub system_prompt: Option<String>,

    /// Per-extraction timeout in seconds. Default: None (bounded only by the service).
    pub api_timeout_secs: Option<u64>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Video device node used by [`crate::pipeline::camera::CommandCamera`].
    pub camera_device: PathBuf,

    /// Frame-grabber executable used by [`crate::pipeline::camera::CommandCamera`].
    pub camera_program: String,

    /// Receives state changes and extraction events.
    pub observer: Option<ObserverRef>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            provider_name: None,
            model: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 2048,
            pdf_scale: 2.0,
            jpeg_quality: 92,
            system_prompt: None,
            api_timeout_secs: None,
            download_timeout_secs: 120,
            camera_device: PathBuf::from("/dev/video0"),
            camera_program: "ffmpeg".to_string(),
            observer: None,
        }
    }
}

impl fmt::Debug for ScannerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("pdf_scale", &self.pdf_scale)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("camera_device", &self.camera_device)
            .field("camera_program", &self.camera_program)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn ScanObserver>"))
            .finish()
    }
}

impl ScannerConfig {
    /// Create a new builder for `ScannerConfig`.
    pub fn builder() -> ScannerConfigBuilder {
        ScannerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ScannerConfig`].
#[derive(Debug)]
pub struct ScannerConfigBuilder {
    config: ScannerConfig,
}

impl ScannerConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
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

    pub fn pdf_scale(mut self, scale: f32) -> Self {
        self.config.pdf_scale = scale.clamp(0.5, 4.0);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn camera_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.config.camera_device = device.into();
        self
    }

    pub fn camera_program(mut self, program: impl Into<String>) -> Self {
        self.config.camera_program = program.into();
        self
    }

    pub fn observer(mut self, observer: ObserverRef) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScannerConfig, ScanError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ScanError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(ScanError::InvalidConfig(
                "api_timeout_secs must be ≥ 1 when set".into(),
            ));
        }
        if c.camera_program.trim().is_empty() {
            return Err(ScanError::InvalidConfig(
                "camera_program must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
