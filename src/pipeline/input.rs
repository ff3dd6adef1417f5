//! Inbound request handling: validate a (file name, bytes) pair, or load one
//! from a local path or an HTTP/HTTPS URL.
//!
//! The file name alone decides the format. Anything other than `.pdf` or
//! `.docx` is rejected here, before a single byte is parsed, so extraction
//! never sees an unsupported document.

use crate::element::DocumentFormat;
use crate::error::Doc2MdError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// One inbound document.
#[derive(Clone)]
pub struct InputDocument {
    /// Original file name (no directory), used for format dispatch and titles.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for InputDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDocument")
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Accept or reject a request before any processing.
///
/// Order matters: an unsupported name is reported as such even when the body
/// is also empty.
pub fn check_request(filename: &str, bytes: &[u8]) -> Result<DocumentFormat, Doc2MdError> {
    if filename.trim().is_empty() {
        return Err(Doc2MdError::EmptyInput {
            filename: filename.to_string(),
        });
    }
    let format =
        DocumentFormat::from_filename(filename).ok_or_else(|| Doc2MdError::UnsupportedFormat {
            filename: filename.to_string(),
        })?;
    if bytes.is_empty() {
        return Err(Doc2MdError::EmptyInput {
            filename: filename.to_string(),
        });
    }
    Ok(format)
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local path or URL into memory.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<InputDocument, Doc2MdError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else if input.trim().is_empty() {
        Err(Doc2MdError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<InputDocument, Doc2MdError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Doc2MdError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => Doc2MdError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => Doc2MdError::InvalidInput {
            input: format!("{}: {}", path.display(), e),
        },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(InputDocument { filename, bytes })
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<InputDocument, Doc2MdError> {
    info!("Downloading document from: {}", url);

    let parsed = reqwest::Url::parse(url).map_err(|_| Doc2MdError::InvalidInput {
        input: url.to_string(),
    })?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Doc2MdError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            Doc2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Doc2MdError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(parsed.clone()).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(Doc2MdError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = filename_for_url(&parsed, content_type.as_deref());

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes as '{}'", bytes.len(), filename);

    Ok(InputDocument {
        filename,
        bytes: bytes.to_vec(),
    })
}

/// File name for a downloaded document: the last path segment when it has a
/// known extension, otherwise a name derived from the `Content-Type`.
fn filename_for_url(url: &reqwest::Url, content_type: Option<&str>) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    if DocumentFormat::from_filename(last).is_some() {
        return last.to_string();
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());
    match mime.as_deref() {
        Some("application/pdf") => "downloaded.pdf".to_string(),
        Some(DOCX_MIME) => "downloaded.docx".to_string(),
        _ if !last.is_empty() => last.to_string(),
        _ => "downloaded".to_string(),
    }
}

/// Destination path helper for CLI output: `<stem>.md` next to the input.
pub fn default_output_path(input: &str) -> PathBuf {
    let name = if is_url(input) {
        reqwest::Url::parse(input)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back())
                    .map(str::to_string)
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string())
    } else {
        input.to_string()
    };
    PathBuf::from(name).with_extension("md")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn check_request_rejects_unsupported_before_empty() {
        let err = check_request("report.txt", b"").unwrap_err();
        assert!(matches!(err, Doc2MdError::UnsupportedFormat { .. }));
    }

    #[test]
    fn check_request_rejects_empty_body_and_name() {
        assert!(matches!(
            check_request("a.pdf", b"").unwrap_err(),
            Doc2MdError::EmptyInput { .. }
        ));
        assert!(matches!(
            check_request("", b"data").unwrap_err(),
            Doc2MdError::EmptyInput { .. }
        ));
    }

    #[test]
    fn check_request_dispatches_format() {
        assert_eq!(check_request("A.DOCX", b"PK").unwrap(), DocumentFormat::Docx);
        assert_eq!(check_request("x.pdf", b"%PDF").unwrap(), DocumentFormat::Pdf);
    }

    #[test]
    fn filename_from_url_path_or_content_type() {
        let u = reqwest::Url::parse("https://host/files/report.docx?x=1").unwrap();
        assert_eq!(filename_for_url(&u, None), "report.docx");

        let u = reqwest::Url::parse("https://host/download/42").unwrap();
        assert_eq!(
            filename_for_url(&u, Some("application/pdf; charset=binary")),
            "downloaded.pdf"
        );
        assert_eq!(filename_for_url(&u, Some(DOCX_MIME)), "downloaded.docx");
        assert_eq!(filename_for_url(&u, Some("text/html")), "42");
    }

    #[test]
    fn output_path_defaults() {
        assert_eq!(default_output_path("dir/a.docx"), PathBuf::from("dir/a.md"));
        assert_eq!(
            default_output_path("https://h/x/paper.pdf"),
            PathBuf::from("paper.md")
        );
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, Doc2MdError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.docx");
        std::fs::write(&path, b"PK\x03\x04").unwrap();
        let doc = load_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(doc.filename, "memo.docx");
        assert_eq!(doc.bytes.len(), 4);
    }
}
