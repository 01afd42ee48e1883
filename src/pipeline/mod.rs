//! Pipeline stages for receipt acquisition and extraction.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ (render | camera) ──▶ encode ──▶ llm ──▶ parse
//! (path/URL)  (pdfium / frame)     (base64)   (VLM)   (JSON → Receipt)
//! ```
//!
//! 1. [`input`]: classify the declared media type and read the bytes;
//!    unsupported types are rejected before anything is read
//! 2. [`render`]: rasterise page 1 of a PDF; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`camera`]: open a video device and grab one still frame
//! 4. [`encode`]: base64-wrap image bytes, JPEG-encode bitmaps, strip
//!    data-URL prefixes
//! 5. [`llm`]: the single extraction request; the only stage that talks
//!    to the model
//! 6. [`parse`]: tolerate fenced output, check the shape, deserialise

pub mod camera;
pub mod encode;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
