//! # edgequake-receipts
//!
//! Scan shopping receipts with a Vision Language Model and export them to
//! Excel.
//!
//! A receipt arrives as a camera frame, a JPEG/PNG image, a PDF (first page
//! only) or a URL. It is sent to a hosted vision model with a strict JSON
//! schema, and the structured result is reviewed, accepted into an in-memory
//! history, and exported as a three-sheet `.xlsx` workbook.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input / camera
//!  │
//!  ├─ 1. Acquire  classify media type, read file / download URL / grab frame
//!  ├─ 2. Render   PDF page 1 → image via pdfium (spawn_blocking)
//!  ├─ 3. Encode   base64 + media type (data-URL prefix stripped)
//!  ├─ 4. Extract  one VLM call with the receipt JSON schema
//!  ├─ 5. Review   Session state machine: accept → history, or discard
//!  └─ 6. Export   Receipts Summary / Itemized Details / All Data Combined
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_receipts::{export_workbook, Event, ScannerConfig, Scanner, Session};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider resolved from GEMINI_API_KEY (or another provider's key)
//!     let scanner = Scanner::from_config(ScannerConfig::default())?;
//!
//!     let session = scanner.analyze_input(Session::new(), "receipt.jpg").await;
//!     if let Some(err) = session.error() {
//!         eprintln!("{err}");
//!         return Ok(());
//!     }
//!     let session = scanner.transition(session, Event::Accept);
//!     println!("Running total: {:.2}", session.running_total());
//!
//!     export_workbook(session.history(), Path::new("receipts.xlsx"))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipts` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-receipts = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod scanner;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ScannerConfig, ScannerConfigBuilder};
pub use error::{AttemptError, ScanError};
pub use export::{export_workbook, render_history, render_receipt, ExportStats, DEFAULT_EXPORT_FILE};
pub use model::{running_total, Receipt, ReceiptItem};
pub use pipeline::camera::{Camera, CameraStream, CommandCamera};
pub use pipeline::encode::EncodedImage;
pub use pipeline::llm::{Extractor, VisionExtractor};
pub use progress::{NoopObserver, ObserverRef, ScanObserver};
pub use scanner::Scanner;
pub use session::{Event, Session, ViewState};
