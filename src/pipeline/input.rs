//! Input resolution: classify and read a user-supplied receipt source.
//!
//! A source is a local path, an `http(s)://` URL or a `data:` URL. Its
//! *declared* media type (extension, `Content-Type` header or data-URL
//! prefix) decides how it is handled; the bytes are not sniffed. Only
//! PNG, JPEG and PDF are accepted, and anything else is rejected before the
//! file is read or the download body is consumed.

use crate::error::AttemptError;
use crate::pipeline::encode::{parse_data_url_prefix, split_data_url};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Media types accepted at the file boundary.
pub const ACCEPTED_MEDIA_TYPES: [&str; 4] =
    ["image/png", "image/jpeg", "image/jpg", "application/pdf"];

/// How an accepted input is turned into an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Forwarded as-is.
    Image,
    /// First page rasterised.
    Pdf,
}

/// Classify a declared media type, rejecting everything not accepted.
pub fn classify(declared: &str) -> Result<InputKind, AttemptError> {
    match media_type_essence(declared).as_str() {
        "application/pdf" => Ok(InputKind::Pdf),
        t if ACCEPTED_MEDIA_TYPES.contains(&t) => Ok(InputKind::Image),
        _ => Err(AttemptError::UnsupportedFileType {
            declared: declared.to_string(),
        }),
    }
}

/// Lowercased media type without parameters such as `; charset=binary`.
pub fn media_type_essence(declared: &str) -> String {
    declared
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Media type implied by a file name's extension.
pub fn media_type_for_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let t = match ext.as_str() {
        "png" => "image/png",
        "jpg" => "image/jpg",
        "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "tif" | "tiff" => "image/tiff",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => return None,
    };
    Some(t)
}

/// Where a receipt comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Path(PathBuf),
    Url(String),
    DataUrl(String),
}

impl InputSource {
    /// Interpret a user-supplied string.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with("data:") {
            InputSource::DataUrl(trimmed.to_string())
        } else if is_url(trimmed) {
            InputSource::Url(trimmed.to_string())
        } else {
            InputSource::Path(PathBuf::from(trimmed))
        }
    }

    /// Declared media type known without any I/O.
    ///
    /// URLs without a recognised extension return `None`; their type comes
    /// from the response headers.
    pub fn declared_type(&self) -> Option<String> {
        match self {
            InputSource::Path(p) => Some(
                media_type_for_extension(p)
                    .unwrap_or("application/octet-stream")
                    .to_string(),
            ),
            InputSource::Url(u) => url_extension_type(u).map(str::to_string),
            InputSource::DataUrl(s) => {
                let (prefix, _) = split_data_url(s);
                Some(
                    prefix
                        .and_then(parse_data_url_prefix)
                        .map(|h| h.media_type)
                        .unwrap_or_else(|| "text/plain".to_string()),
                )
            }
        }
    }

    /// Short human-readable label for logs.
    pub fn label(&self) -> String {
        match self {
            InputSource::Path(p) => p.display().to_string(),
            InputSource::Url(u) => u.clone(),
            InputSource::DataUrl(s) => {
                let (prefix, payload) = split_data_url(s);
                format!("{}<{} chars>", prefix.unwrap_or("data:"), payload.len())
            }
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn url_extension_type(url: &str) -> Option<&'static str> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?.to_string();
    media_type_for_extension(Path::new(&last))
}

/// The content of an input after reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw file or download bytes.
    Bytes(Vec<u8>),
    /// Base64 text taken verbatim from a data URL.
    Base64(String),
}

impl Payload {
    /// Raw bytes, decoding base64 if needed.
    pub fn into_bytes(self) -> Result<Vec<u8>, base64::DecodeError> {
        match self {
            Payload::Bytes(b) => Ok(b),
            Payload::Base64(s) => STANDARD.decode(s.trim()),
        }
    }
}

/// An accepted, fully-read input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedInput {
    pub declared_type: String,
    pub kind: InputKind,
    pub payload: Payload,
}

/// An input whose type has been accepted but whose content is not read yet.
///
/// For URLs the request has been sent and the response headers checked; the
/// body is still unread.
#[derive(Debug)]
pub struct PendingInput {
    declared_type: String,
    kind: InputKind,
    body: PendingBody,
}

#[derive(Debug)]
enum PendingBody {
    Path(PathBuf),
    Base64(String),
    Response { url: String, response: reqwest::Response },
}

impl PendingInput {
    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    /// Read the content.
    ///
    /// # Errors
    /// [`AttemptError::FileRead`] when the file or the response body cannot
    /// be read.
    pub async fn read(self) -> Result<LoadedInput, AttemptError> {
        let payload = match self.body {
            PendingBody::Path(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| AttemptError::FileRead {
                        path: path.display().to_string(),
                        detail: e.to_string(),
                    })?;
                debug!("Read {} bytes from {}", bytes.len(), path.display());
                Payload::Bytes(bytes)
            }
            PendingBody::Base64(data) => Payload::Base64(data),
            PendingBody::Response { url, response } => {
                let bytes = response.bytes().await.map_err(|e| AttemptError::FileRead {
                    path: url,
                    detail: e.to_string(),
                })?;
                info!("Downloaded {} bytes ({})", bytes.len(), self.declared_type);
                Payload::Bytes(bytes.to_vec())
            }
        };
        Ok(LoadedInput {
            declared_type: self.declared_type,
            kind: self.kind,
            payload,
        })
    }
}

/// Classify an input without reading its content.
///
/// Local paths and data URLs are classified from their extension or prefix.
/// URLs are requested and classified from the response `Content-Type`
/// (falling back to the URL extension) before the body is read.
///
/// # Errors
/// [`AttemptError::UnsupportedFileType`] for anything but PNG, JPEG or PDF;
/// [`AttemptError::FileRead`] for a malformed data URL or a failed request.
pub async fn open_input(
    source: &InputSource,
    download_timeout_secs: u64,
) -> Result<PendingInput, AttemptError> {
    let declared = source.declared_type();
    match source {
        InputSource::Path(path) => open_local(path, declared),
        InputSource::DataUrl(s) => open_data_url(s, declared),
        InputSource::Url(url) => request_url(url, declared, download_timeout_secs).await,
    }
}

/// Classify and read an input in one step.
pub async fn load_input(
    source: &InputSource,
    download_timeout_secs: u64,
) -> Result<LoadedInput, AttemptError> {
    open_input(source, download_timeout_secs).await?.read().await
}

fn open_local(path: &Path, declared: Option<String>) -> Result<PendingInput, AttemptError> {
    let declared = declared.unwrap_or_else(|| "application/octet-stream".to_string());
    let kind = classify(&declared)?;
    Ok(PendingInput {
        declared_type: declared,
        kind,
        body: PendingBody::Path(path.to_path_buf()),
    })
}

fn open_data_url(s: &str, declared: Option<String>) -> Result<PendingInput, AttemptError> {
    let declared = declared.unwrap_or_else(|| "text/plain".to_string());
    let kind = classify(&declared)?;

    let (prefix, payload) = split_data_url(s);
    match prefix.and_then(parse_data_url_prefix) {
        Some(h) if h.base64 => Ok(PendingInput {
            declared_type: declared,
            kind,
            body: PendingBody::Base64(payload.to_string()),
        }),
        _ => Err(AttemptError::FileRead {
            path: "data URL".to_string(),
            detail: "data URL payload is not base64-encoded".to_string(),
        }),
    }
}

/// Request a URL and classify it from its headers, falling back to the type
/// implied by the URL. The body is left unread.
async fn request_url(
    url: &str,
    from_extension: Option<String>,
    timeout_secs: u64,
) -> Result<PendingInput, AttemptError> {
    info!("Downloading receipt from: {}", url);
    let read_err = |detail: String| AttemptError::FileRead {
        path: url.to_string(),
        detail,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| read_err(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            read_err(format!("download timed out after {timeout_secs}s"))
        } else {
            read_err(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(read_err(format!("HTTP {}", response.status())));
    }

    let header_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(media_type_essence)
        .filter(|t| t != "application/octet-stream");
    let declared = header_type
        .or(from_extension)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let kind = classify(&declared)?;

    Ok(PendingInput {
        declared_type: declared,
        kind,
        body: PendingBody::Response {
            url: url.to_string(),
            response,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response on a local port and return a URL without an
    /// extension pointing at it.
    async fn serve_once(content_type: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/receipt")
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/r.jpg"));
        assert!(is_url("http://example.com/r.pdf"));
        assert!(!is_url("/tmp/r.jpg"));
        assert!(!is_url("data:image/png;base64,AAAA"));
        assert!(!is_url(""));
    }

    #[test]
    fn classify_accepts_only_boundary_types() {
        assert_eq!(classify("image/png").unwrap(), InputKind::Image);
        assert_eq!(classify("image/jpeg").unwrap(), InputKind::Image);
        assert_eq!(classify("image/jpg").unwrap(), InputKind::Image);
        assert_eq!(classify("application/pdf").unwrap(), InputKind::Pdf);
        assert_eq!(classify("Application/PDF; qs=0.5").unwrap(), InputKind::Pdf);

        for t in ["text/plain", "image/gif", "image/webp", "application/octet-stream", ""] {
            assert!(
                matches!(classify(t), Err(AttemptError::UnsupportedFileType { .. })),
                "{t} should be rejected"
            );
        }
    }

    #[test]
    fn source_parsing_and_declared_types() {
        assert_eq!(
            InputSource::parse("scan.JPG").declared_type().as_deref(),
            Some("image/jpg")
        );
        assert_eq!(
            InputSource::parse("notes.txt").declared_type().as_deref(),
            Some("text/plain")
        );
        assert_eq!(
            InputSource::parse("noext").declared_type().as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(
            InputSource::parse("https://x.test/a/bill.pdf")
                .declared_type()
                .as_deref(),
            Some("application/pdf")
        );
        assert_eq!(InputSource::parse("https://x.test/receipt?id=4").declared_type(), None);
        assert_eq!(
            InputSource::parse("data:image/png;base64,QUJD")
                .declared_type()
                .as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn unsupported_local_file_is_rejected_before_reading() {
        // The file does not exist: a read would yield FileRead, not UnsupportedFileType.
        let src = InputSource::parse("/definitely/not/here/notes.txt");
        let err = load_input(&src, 5).await.unwrap_err();
        assert!(matches!(err, AttemptError::UnsupportedFileType { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_image_file_is_a_read_error() {
        let src = InputSource::parse("/definitely/not/here/receipt.png");
        let err = load_input(&src, 5).await.unwrap_err();
        assert!(matches!(err, AttemptError::FileRead { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn data_url_payload_is_kept_verbatim() {
        let src = InputSource::parse("data:image/jpeg;base64,/9j/4AAQ");
        let loaded = load_input(&src, 5).await.unwrap();
        assert_eq!(loaded.kind, InputKind::Image);
        assert_eq!(loaded.payload, Payload::Base64("/9j/4AAQ".into()));
    }

    #[tokio::test]
    async fn non_base64_data_url_is_a_read_error() {
        let src = InputSource::parse("data:image/png,rawbytes");
        let err = load_input(&src, 5).await.unwrap_err();
        assert!(matches!(err, AttemptError::FileRead { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn reads_local_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.png");
        std::fs::write(&path, b"png-bytes").unwrap();
        let loaded = load_input(&InputSource::Path(path), 5).await.unwrap();
        assert_eq!(loaded.declared_type, "image/png");
        assert_eq!(loaded.payload.into_bytes().unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn download_drops_content_type_parameters() {
        let url = serve_once("image/png; charset=binary", b"png-bytes").await;
        let loaded = load_input(&InputSource::parse(&url), 5).await.unwrap();
        assert_eq!(loaded.declared_type, "image/png");
        assert_eq!(loaded.kind, InputKind::Image);
        assert_eq!(loaded.payload.into_bytes().unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn download_with_unsupported_content_type_is_rejected_from_headers() {
        let url = serve_once("text/html; charset=utf-8", b"<html></html>").await;
        let err = open_input(&InputSource::parse(&url), 5).await.unwrap_err();
        assert!(
            matches!(err, AttemptError::UnsupportedFileType { ref declared } if declared == "text/html"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn opening_a_local_file_does_not_read_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.pdf");
        let pending = open_input(&InputSource::Path(path.clone()), 5).await.unwrap();
        assert_eq!(pending.kind(), InputKind::Pdf);
        assert_eq!(pending.declared_type(), "application/pdf");

        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let loaded = pending.read().await.unwrap();
        assert_eq!(loaded.payload, Payload::Bytes(b"%PDF-1.4".to_vec()));
    }
}
