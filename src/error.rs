//! Error types for the edgequake-receipts library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScanError`] is **fatal**: the scanner cannot run at all (missing API
//!   credential, provider not configured, export target not writable).
//!   Returned as `Err(ScanError)` from constructors and export functions.
//!
//! * [`AttemptError`] is **non-fatal**: a single scan attempt failed (camera
//!   unavailable, unsupported file, model returned garbage). It is stored in
//!   the session's error slot and the session returns to
//!   [`crate::session::ViewState::Home`]; history is never touched.
//!
//! Every `AttemptError` displays as the short message shown to the user. The
//! technical cause, when there is one, is kept in a separate field for logs.

use std::path::PathBuf;
use thiserror::Error;

/// Message shown for every extraction failure, whatever the cause.
pub const EXTRACTION_FAILED_MESSAGE: &str = "Could not extract details from the receipt. \
The AI model failed to process the request. Please try again with a clearer image.";

/// All fatal errors returned by the edgequake-receipts library.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// The provider's API credential is not present in the environment.
    #[error("{var} environment variable not set.\nExport it before starting: export {var}=...")]
    MissingCredential { var: String },

    /// The configured provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the exported workbook.
    #[error("Failed to write workbook '{path}': {detail}")]
    ExportWriteFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single scan attempt.
///
/// `Display` yields the user-facing banner text; `detail()` exposes the
/// underlying cause for logging.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptError {
    /// Camera could not be opened or a frame could not be grabbed.
    #[error("Could not access the camera. Please ensure you have given permission.")]
    DeviceAccess { detail: String },

    /// Declared type is not one of the accepted image/PDF types.
    #[error("Unsupported file type. Please upload an image (JPG, PNG) or a PDF.")]
    UnsupportedFileType { declared: String },

    /// First PDF page could not be rasterised or encoded.
    #[error("Failed to process the PDF file. Only single-page PDFs are fully supported.")]
    PdfProcessing { detail: String },

    /// Transport, parse or shape failure from the inference call.
    #[error("{}", EXTRACTION_FAILED_MESSAGE)]
    Extraction { detail: String },

    /// Local file (or download) could not be read.
    #[error("Failed to read the image file.")]
    FileRead { path: String, detail: String },
}

impl AttemptError {
    /// Technical cause of the failure, for logs.
    pub fn detail(&self) -> &str {
        match self {
            AttemptError::DeviceAccess { detail }
            | AttemptError::PdfProcessing { detail }
            | AttemptError::Extraction { detail }
            | AttemptError::FileRead { detail, .. } => detail,
            AttemptError::UnsupportedFileType { declared } => declared,
        }
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::DeviceAccess { .. } => "device_access",
            AttemptError::UnsupportedFileType { .. } => "unsupported_file_type",
            AttemptError::PdfProcessing { .. } => "pdf_processing",
            AttemptError::Extraction { .. } => "extraction",
            AttemptError::FileRead { .. } => "file_read",
        }
    }
}
