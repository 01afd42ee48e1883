//! Image encoding: bytes or bitmaps → base64 [`EncodedImage`].
//!
//! Uploaded images are forwarded untouched; only bitmaps we produce ourselves
//! (a rasterised PDF page, a camera frame) are compressed, as JPEG.
//! `detail: "high"` asks GPT-4-class models to use the full tile budget so
//! small print on long receipts stays legible.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// One still image ready for the extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Base64 payload, without any `data:` prefix.
    pub data: String,
    /// Media type of the decoded payload, e.g. `image/jpeg`.
    pub media_type: String,
}

impl EncodedImage {
    pub fn new(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: canonical_media_type(&media_type.into()),
        }
    }

    /// Wrap the image for an `edgequake-llm` chat message.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.data.clone(), self.media_type.clone()).with_detail("high")
    }
}

/// Normalise a media type for the vision APIs: parameters such as
/// `; charset=binary` are dropped and aliases are mapped to their
/// registered names.
pub fn canonical_media_type(media_type: &str) -> String {
    let essence = media_type.split(';').next().unwrap_or("");
    match essence.trim().to_ascii_lowercase().as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        other => other.to_string(),
    }
}

/// Base64-encode raw image bytes as-is.
pub fn encode_bytes(bytes: &[u8], media_type: &str) -> EncodedImage {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} bytes → {} bytes base64", bytes.len(), b64.len());
    EncodedImage::new(b64, media_type)
}

/// JPEG-encode a bitmap at the given quality (1–100).
///
/// JPEG has no alpha channel, so the bitmap is flattened to RGB first.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<EncodedImage, image::ImageError> {
    let mut buf = Vec::new();
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)))?;

    debug!(
        "JPEG-encoded {}x{} bitmap at q{} → {} bytes",
        img.width(),
        img.height(),
        quality,
        buf.len()
    );
    Ok(encode_bytes(&buf, "image/jpeg"))
}

// ── Data URLs ────────────────────────────────────────────────────────────────

static RE_DATA_URL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:([^;,]*)((?:;[^;,]*)*),$").unwrap());

/// Split a string into its `data:...,` prefix (if any) and payload.
///
/// Strings that are not data URLs come back whole as the payload, so
/// `prefix.unwrap_or("").to_owned() + payload` always equals the input.
pub fn split_data_url(s: &str) -> (Option<&str>, &str) {
    if !s.starts_with("data:") {
        return (None, s);
    }
    match s.find(',') {
        Some(comma) => (Some(&s[..=comma]), &s[comma + 1..]),
        None => (None, s),
    }
}

/// Return the payload of a data URL, or the input unchanged.
pub fn strip_data_url_prefix(s: &str) -> &str {
    split_data_url(s).1
}

/// Parsed header of a data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrlHeader {
    pub media_type: String,
    pub base64: bool,
}

/// Parse the `data:<type>[;params][;base64],` prefix.
pub fn parse_data_url_prefix(prefix: &str) -> Option<DataUrlHeader> {
    let caps = RE_DATA_URL_PREFIX.captures(prefix)?;
    let media_type = match caps[1].trim() {
        "" => "text/plain".to_string(),
        t => t.to_ascii_lowercase(),
    };
    let base64 = caps[2]
        .split(';')
        .any(|p| p.trim().eq_ignore_ascii_case("base64"));
    Some(DataUrlHeader { media_type, base64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image_as_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_jpeg(&img, 92).expect("encode should succeed");
        assert_eq!(data.media_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // JPEG SOI marker
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn raw_bytes_pass_through_unchanged() {
        let bytes = b"\x89PNG\r\n\x1a\nnot-really-a-png";
        let enc = encode_bytes(bytes, "image/png");
        assert_eq!(STANDARD.decode(&enc.data).unwrap(), bytes);
        assert_eq!(enc.media_type, "image/png");
    }

    #[test]
    fn jpg_alias_is_canonicalised() {
        assert_eq!(EncodedImage::new("AAAA", "image/jpg").media_type, "image/jpeg");
        assert_eq!(canonical_media_type("IMAGE/PNG"), "image/png");
    }

    #[test]
    fn media_type_parameters_are_dropped() {
        assert_eq!(canonical_media_type("image/png; charset=binary"), "image/png");
        assert_eq!(
            EncodedImage::new("AAAA", "image/jpg;q=0.9").media_type,
            "image/jpeg"
        );
    }

    #[test]
    fn data_url_prefix_is_stripped_and_round_trips() {
        for original in [
            "data:image/jpeg;base64,/9j/4AAQSkZJRg==",
            "data:image/png;base64,iVBORw0KGgo=",
            "data:,hello",
        ] {
            let (prefix, payload) = split_data_url(original);
            let prefix = prefix.expect("data URL has a prefix");
            assert!(!payload.starts_with("data:"));
            assert_eq!(format!("{prefix}{payload}"), original);
        }
        assert_eq!(strip_data_url_prefix("data:image/png;base64,QUJD"), "QUJD");
    }

    #[test]
    fn plain_base64_is_left_alone() {
        assert_eq!(split_data_url("QUJD"), (None, "QUJD"));
        assert_eq!(strip_data_url_prefix("QUJD"), "QUJD");
    }

    #[test]
    fn parses_data_url_header() {
        let h = parse_data_url_prefix("data:image/png;base64,").unwrap();
        assert_eq!(h.media_type, "image/png");
        assert!(h.base64);

        let h = parse_data_url_prefix("data:text/plain;charset=utf-8,").unwrap();
        assert_eq!(h.media_type, "text/plain");
        assert!(!h.base64);

        assert!(parse_data_url_prefix("image/png;base64,").is_none());
    }
}
