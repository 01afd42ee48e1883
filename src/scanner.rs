//! Async driver binding the pipeline to the session state machine.
//!
//! [`Scanner`] owns the extractor and the camera. Each method takes the
//! current [`Session`] by value, performs the I/O for one user action, feeds
//! the outcome back through [`Session::apply`] and returns the next session.
//! Because triggers are refused outside Home/Capturing, a front end that
//! awaits each call can never have two extractions in flight.

use crate::config::{ScannerConfig, DEFAULT_MODEL, DEFAULT_PROVIDER};
use crate::error::{AttemptError, ScanError};
use crate::pipeline::camera::{Camera, CameraStream, CommandCamera};
use crate::pipeline::encode::{encode_bytes, encode_jpeg, EncodedImage};
use crate::pipeline::input::{self, InputKind, InputSource, LoadedInput, Payload};
use crate::pipeline::llm::{Extractor, VisionExtractor};
use crate::pipeline::render;
use crate::session::{Event, Session, ViewState};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives one scanning session against a model and a camera.
pub struct Scanner {
    config: ScannerConfig,
    extractor: Arc<dyn Extractor>,
    camera: Arc<dyn Camera>,
}

impl Scanner {
    /// Build a scanner from configuration.
    ///
    /// # Errors
    /// Fatal: [`ScanError::MissingCredential`] when the provider's API key is
    /// absent, [`ScanError::ProviderNotConfigured`] when the provider cannot
    /// be created.
    pub fn from_config(config: ScannerConfig) -> Result<Self, ScanError> {
        let provider = resolve_provider(&config)?;
        info!(
            "Extraction provider: {} / {}",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model.as_deref().unwrap_or("default")
        );
        let extractor = Arc::new(VisionExtractor::new(provider, &config));
        let camera = Arc::new(CommandCamera::new(
            config.camera_device.clone(),
            config.camera_program.clone(),
        ));
        Ok(Self::with_parts(config, extractor, camera))
    }

    /// Build a scanner from explicit parts. Used by tests and by callers
    /// with their own extractor or camera.
    pub fn with_parts(
        config: ScannerConfig,
        extractor: Arc<dyn Extractor>,
        camera: Arc<dyn Camera>,
    ) -> Self {
        Self {
            config,
            extractor,
            camera,
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Apply an event, notifying the observer.
    pub fn transition(&self, session: Session, event: Event) -> Session {
        let from = session.state();
        if let (Event::Fail(err), Some(obs)) = (&event, &self.config.observer) {
            if session.accepts(&event) {
                obs.on_attempt_error(err);
            }
        }
        let next = session.apply(event);
        let to = next.state();
        if from != to {
            debug!("State {:?} → {:?}", from, to);
            if let Some(ref obs) = self.config.observer {
                obs.on_state_change(from, to);
            }
        }
        next
    }

    fn fail(&self, session: Session, err: AttemptError) -> Session {
        warn!("{} ({}): {}", err, err.kind(), err.detail());
        self.transition(session, Event::Fail(err))
    }

    // ── File path ────────────────────────────────────────────────────────

    /// Analyse a file path, URL or data URL from Home.
    ///
    /// The input is classified before Submit: an unsupported type, a
    /// malformed data URL or a failed request fails from Home without
    /// entering Analyzing and without calling the extractor. For URLs the
    /// response `Content-Type` is checked at this point too.
    pub async fn analyze_input(&self, session: Session, input: &str) -> Session {
        if session.state() != ViewState::Home {
            debug!("Ignoring input while {:?}", session.state());
            return session;
        }

        let source = InputSource::parse(input);
        info!("Scanning {}", source.label());
        let pending = match input::open_input(&source, self.config.download_timeout_secs).await {
            Ok(pending) => pending,
            Err(e) => return self.fail(session, e),
        };
        debug!("Accepted {} as {:?}", pending.declared_type(), pending.kind());

        let session = self.transition(session, Event::Submit);
        let image = match pending.read().await {
            Ok(loaded) => self.prepare(loaded).await,
            Err(e) => Err(e),
        };
        match image {
            Ok(image) => self.extract_into(session, image).await,
            Err(e) => self.fail(session, e),
        }
    }

    /// Turn an accepted input into the image sent to the model.
    async fn prepare(&self, loaded: LoadedInput) -> Result<EncodedImage, AttemptError> {
        match (loaded.kind, loaded.payload) {
            (InputKind::Image, Payload::Base64(data)) => {
                Ok(EncodedImage::new(data, loaded.declared_type))
            }
            (InputKind::Image, Payload::Bytes(bytes)) => {
                Ok(encode_bytes(&bytes, &loaded.declared_type))
            }
            (InputKind::Pdf, payload) => {
                let bytes = payload.into_bytes().map_err(|e| AttemptError::PdfProcessing {
                    detail: format!("invalid base64 payload: {e}"),
                })?;
                let page = render::render_first_page(bytes, self.config.pdf_scale).await?;
                encode_jpeg(&page, self.config.jpeg_quality).map_err(|e| {
                    AttemptError::PdfProcessing {
                        detail: format!("JPEG encoding failed: {e}"),
                    }
                })
            }
        }
    }

    // ── Camera path ──────────────────────────────────────────────────────

    /// Enter Capturing and open the camera.
    ///
    /// On success the caller holds the stream until [`Scanner::capture`] or
    /// [`Scanner::cancel_camera`]. On failure the session is back at Home
    /// with a device error and no stream exists.
    pub async fn open_camera(&self, session: Session) -> (Session, Option<Box<dyn CameraStream>>) {
        if !session.accepts(&Event::OpenCamera) {
            debug!("Ignoring camera request while {:?}", session.state());
            return (session, None);
        }
        let session = self.transition(session, Event::OpenCamera);
        match self.camera.open().await {
            Ok(stream) => (session, Some(stream)),
            Err(e) => (self.fail(session, e), None),
        }
    }

    /// Grab a frame, release the camera and analyse the frame.
    pub async fn capture(&self, session: Session, mut stream: Box<dyn CameraStream>) -> Session {
        if session.state() != ViewState::Capturing {
            debug!("Ignoring capture while {:?}", session.state());
            return session;
        }
        let frame = stream.capture_frame().await;
        drop(stream);

        let image = frame.and_then(|img| {
            encode_jpeg(&img, self.config.jpeg_quality).map_err(|e| AttemptError::DeviceAccess {
                detail: format!("frame encoding failed: {e}"),
            })
        });
        match image {
            Ok(image) => {
                let session = self.transition(session, Event::Submit);
                self.extract_into(session, image).await
            }
            Err(e) => self.fail(session, e),
        }
    }

    /// Leave Capturing without capturing. The stream is released.
    pub fn cancel_camera(&self, session: Session, stream: Box<dyn CameraStream>) -> Session {
        drop(stream);
        self.transition(session, Event::CancelCamera)
    }

    // ── Extraction ───────────────────────────────────────────────────────

    async fn extract_into(&self, session: Session, image: EncodedImage) -> Session {
        debug_assert_eq!(session.state(), ViewState::Analyzing);
        if let Some(ref obs) = self.config.observer {
            obs.on_extraction_start(&image.media_type, image.data.len());
        }

        let start = Instant::now();
        match self.extractor.extract(&image).await {
            Ok(receipt) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                info!(
                    "Extracted receipt from {:?} with {} items in {}ms",
                    receipt.merchant.as_deref().unwrap_or("N/A"),
                    receipt.items.len(),
                    elapsed_ms
                );
                if let Some(ref obs) = self.config.observer {
                    obs.on_extraction_complete(&receipt, elapsed_ms);
                }
                self.transition(session, Event::Extracted(receipt))
            }
            Err(e) => self.fail(session, e),
        }
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

/// Environment variable holding the API credential for `provider`.
///
/// `None` for local providers that need no credential.
pub fn required_credential(provider: &str) -> Option<&'static str> {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Some("GEMINI_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" | "claude" => Some("ANTHROPIC_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "xai" | "grok" => Some("XAI_API_KEY"),
        "azure" => Some("AZURE_OPENAI_API_KEY"),
        _ => None,
    }
}

/// Vision model used when a provider is named without a model.
pub fn default_model_for(provider: &str) -> &'static str {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => DEFAULT_MODEL,
        "openai" | "azure" => "gpt-4.1-mini",
        "anthropic" | "claude" => "claude-sonnet-4-20250514",
        "mistral" => "pixtral-12b-2409",
        "ollama" | "lmstudio" => "llava",
        _ => "gpt-4.1-nano",
    }
}

/// Fail when `provider` needs a credential that `lookup` cannot find.
pub fn check_credential_with(
    provider: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ScanError> {
    match required_credential(provider) {
        Some(var) if lookup(var).is_none_or(|v| v.trim().is_empty()) => {
            Err(ScanError::MissingCredential {
                var: var.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ScanError> {
    check_credential_with(provider_name, env_lookup)?;
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScanError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or the
///    provider's default vision model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Gemini** when `GEMINI_API_KEY` is set.
/// 5. **Auto-detection** via `ProviderFactory::from_env` when any other known
///    credential is set.
///
/// With none of these, startup fails with [`ScanError::MissingCredential`].
fn resolve_provider(config: &ScannerConfig) -> Result<Arc<dyn LLMProvider>, ScanError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .as_deref()
            .unwrap_or_else(|| default_model_for(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if check_credential_with(DEFAULT_PROVIDER, env_lookup).is_ok() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(DEFAULT_PROVIDER, model);
    }

    let any_key = ["openai", "anthropic", "mistral", "openrouter", "xai", "azure"]
        .iter()
        .any(|p| check_credential_with(p, env_lookup).is_ok());
    if !any_key {
        return Err(ScanError::MissingCredential {
            var: "GEMINI_API_KEY".to_string(),
        });
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ScanError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
