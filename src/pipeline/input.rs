//! Input resolution and upload screening.
//!
//! An upload is a byte buffer with a declared filename and MIME type. Before
//! any parsing, [`UploadedFile::classify`] applies the allow-list and size
//! cap and decides which path (tabular or document) the file takes.
//!
//! [`resolve_input`] turns a CLI argument (local path or HTTP(S) URL) into an
//! [`UploadedFile`], guessing the MIME type from the extension unless the
//! server or the caller says otherwise.

use crate::error::IngestError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// MIME types accepted at the upload boundary.
pub const ALLOWED_MIME_TYPES: [&str; 4] = [
    "text/csv",
    "application/vnd.ms-excel",
    "text/plain",
    "application/pdf",
];

/// File extensions accepted at the upload boundary.
pub const ALLOWED_EXTENSIONS: [&str; 2] = ["csv", "pdf"];

/// Which ingestion path a file takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Pdf,
}

/// An uploaded file: raw bytes plus what the client declared about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime: String,
}

impl UploadedFile {
    pub fn new(bytes: impl Into<Vec<u8>>, filename: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            mime: mime.into(),
        }
    }

    /// Build an upload with the MIME type guessed from `filename`.
    pub fn guessed(bytes: impl Into<Vec<u8>>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let mime = guess_mime(&filename).to_string();
        Self::new(bytes, filename, mime)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lower-cased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Declared MIME type without parameters, lower-cased.
    fn essence(&self) -> String {
        self.mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    /// Screen the upload and pick its path.
    ///
    /// Both the MIME type and the extension must be on the allow-list; the
    /// extension decides the path. A `.pdf` must be declared
    /// `application/pdf` and a `.csv` must not be.
    pub fn classify(&self, max_size: usize) -> Result<FileKind, IngestError> {
        if self.is_empty() {
            return Err(IngestError::FileMissing);
        }
        if self.len() > max_size {
            return Err(IngestError::FileTooLarge {
                size: self.len(),
                limit: max_size,
            });
        }

        let mime = self.essence();
        let unsupported = || IngestError::UnsupportedFormat {
            filename: self.filename.clone(),
            mime: self.mime.clone(),
        };

        let extension = self.extension().unwrap_or_default();
        if !ALLOWED_MIME_TYPES.contains(&mime.as_str())
            || !ALLOWED_EXTENSIONS.contains(&extension.as_str())
        {
            return Err(unsupported());
        }

        let kind = match extension.as_str() {
            "pdf" if mime == "application/pdf" => FileKind::Pdf,
            "csv" if mime != "application/pdf" => FileKind::Csv,
            _ => return Err(unsupported()),
        };
        debug!("Classified '{}' ({}) as {:?}", self.filename, mime, kind);
        Ok(kind)
    }
}

/// MIME type implied by a filename's extension.
pub fn guess_mime(filename: &str) -> &'static str {
    match Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("csv") => "text/csv",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL into an [`UploadedFile`].
///
/// `mime` overrides whatever type would otherwise be inferred. Inputs larger
/// than `max_size` bytes fail with [`IngestError::FileTooLarge`] before their
/// contents are buffered.
pub async fn resolve_input(
    input: &str,
    mime: Option<&str>,
    timeout_secs: u64,
    max_size: usize,
) -> Result<UploadedFile, IngestError> {
    let mut file = if is_url(input) {
        download_url(input, timeout_secs, max_size).await?
    } else {
        read_local(input, max_size).await?
    };
    if let Some(mime) = mime {
        file.mime = mime.to_string();
    }
    Ok(file)
}

async fn read_local(path_str: &str, max_size: usize) -> Result<UploadedFile, IngestError> {
    let path = PathBuf::from(path_str);
    let unreadable = |e: std::io::Error| IngestError::FileUnreadable {
        path: path.clone(),
        reason: e.to_string(),
    };

    let size = tokio::fs::metadata(&path).await.map_err(unreadable)?.len();
    let size = usize::try_from(size).unwrap_or(usize::MAX);
    if size > max_size {
        return Err(IngestError::FileTooLarge {
            size,
            limit: max_size,
        });
    }

    let bytes = tokio::fs::read(&path).await.map_err(unreadable)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_str.to_string());
    debug!("Read local file: {} ({} bytes)", path.display(), bytes.len());
    Ok(UploadedFile::guessed(bytes, filename))
}

async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_size: usize,
) -> Result<UploadedFile, IngestError> {
    info!("Downloading menu from: {}", url);

    let failed = |reason: String| IngestError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let mut response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {}s", timeout_secs))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(declared) = response.content_length() {
        let declared = usize::try_from(declared).unwrap_or(usize::MAX);
        if declared > max_size {
            return Err(IngestError::FileTooLarge {
                size: declared,
                limit: max_size,
            });
        }
    }

    // Content-Length may be absent or wrong; cap the body as it arrives.
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
        if bytes.len() + chunk.len() > max_size {
            return Err(IngestError::FileTooLarge {
                size: bytes.len() + chunk.len(),
                limit: max_size,
            });
        }
        bytes.extend_from_slice(&chunk);
    }
    info!("Downloaded {} bytes as '{}'", bytes.len(), filename);

    let mut file = UploadedFile::guessed(bytes, filename);
    if let Some(content_type) = content_type {
        file.mime = content_type;
    }
    Ok(file)
}

/// Last path segment of `url` when it looks like a filename.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/menu.pdf"));
        assert!(is_url("http://example.com/menu.csv"));
        assert!(!is_url("/tmp/menu.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn classify_allowed_pairs() {
        let csv = UploadedFile::new(b"a".to_vec(), "menu.CSV", "text/csv");
        assert!(matches!(csv.classify(MB), Ok(FileKind::Csv)));

        let excel_csv = UploadedFile::new(b"a".to_vec(), "menu.csv", "application/vnd.ms-excel");
        assert!(matches!(excel_csv.classify(MB), Ok(FileKind::Csv)));

        let plain = UploadedFile::new(b"a".to_vec(), "menu.csv", "text/plain; charset=utf-8");
        assert!(matches!(plain.classify(MB), Ok(FileKind::Csv)));

        let pdf = UploadedFile::new(b"%PDF".to_vec(), "menu.pdf", "application/pdf");
        assert!(matches!(pdf.classify(MB), Ok(FileKind::Pdf)));
    }

    #[test]
    fn classify_rejects() {
        let cases = [
            UploadedFile::new(b"a".to_vec(), "menu.xlsx", "application/vnd.ms-excel"),
            UploadedFile::new(b"a".to_vec(), "menu.csv", "image/png"),
            UploadedFile::new(b"a".to_vec(), "menu.pdf", "text/plain"),
            UploadedFile::new(b"a".to_vec(), "menu.csv", "application/pdf"),
            UploadedFile::new(b"a".to_vec(), "menu", "text/csv"),
        ];
        for file in cases {
            assert!(
                matches!(file.classify(MB), Err(IngestError::UnsupportedFormat { .. })),
                "accepted {file:?}"
            );
        }
    }

    #[test]
    fn classify_empty_and_oversized() {
        let empty = UploadedFile::new(Vec::new(), "menu.csv", "text/csv");
        assert!(matches!(empty.classify(MB), Err(IngestError::FileMissing)));

        let big = UploadedFile::new(vec![b'a'; 11], "menu.csv", "text/csv");
        assert!(matches!(
            big.classify(10),
            Err(IngestError::FileTooLarge { size: 11, limit: 10 })
        ));
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(guess_mime("a/b/Menu.PDF"), "application/pdf");
        assert_eq!(guess_mime("menu.csv"), "text/csv");
        assert_eq!(guess_mime("menu"), "application/octet-stream");
    }

    #[test]
    fn url_filename() {
        assert_eq!(filename_from_url("https://x.test/files/menu.pdf?v=2"), "menu.pdf");
        assert_eq!(filename_from_url("https://x.test/files/"), "downloaded");
    }

    #[tokio::test]
    async fn reads_local_file_and_guesses_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu.csv");
        std::fs::write(&path, "Name,Price\nTea,1\n").unwrap();

        let file = resolve_input(path.to_str().unwrap(), None, 5, MB).await.unwrap();
        assert_eq!(file.filename, "menu.csv");
        assert_eq!(file.mime, "text/csv");
        assert!(matches!(file.classify(MB), Ok(FileKind::Csv)));

        let overridden = resolve_input(path.to_str().unwrap(), Some("text/plain"), 5, MB)
            .await
            .unwrap();
        assert_eq!(overridden.mime, "text/plain");
    }

    #[tokio::test]
    async fn missing_local_file_is_unreadable() {
        let err = resolve_input("/definitely/not/here.csv", None, 5, MB).await.unwrap_err();
        assert!(matches!(err, IngestError::FileUnreadable { .. }));
    }

    #[tokio::test]
    async fn oversized_local_file_is_refused_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu.csv");
        std::fs::write(&path, "Name,Price,Category\nTea,1,Beverages\n").unwrap();

        let err = resolve_input(path.to_str().unwrap(), None, 5, 16)
            .await
            .unwrap_err();
        match err {
            IngestError::FileTooLarge { size, limit } => {
                assert_eq!(size, 36);
                assert_eq!(limit, 16);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
