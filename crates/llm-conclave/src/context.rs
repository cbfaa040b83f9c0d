//! Context providers supply plain text documents for the opening message.
//!
//! Identifiers are local paths or `http(s)` URLs. [`RoutingContextProvider`]
//! dispatches to the file or URL provider depending on the identifier.

use async_trait::async_trait;
use futures::future::try_join_all;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Extensions for binary document formats that are not extracted.
const UNSUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "odt", "xlsx", "pptx"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("document not found: {0}")]
    NotFound(String),

    /// Transport failure or non-success HTTP status for a URL.
    #[error("network error fetching {identifier}: {message}")]
    Network { identifier: String, message: String },

    /// A local document exists but cannot be read, e.g. permission denied
    /// or the path is a directory.
    #[error("cannot read {identifier}: {message}")]
    Unreadable { identifier: String, message: String },

    /// Binary formats and non-UTF-8 content.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
}

/// Supplies the text of a document.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn fetch(&self, identifier: &str) -> Result<String, FetchError>;
}

/// Splits a comma-separated identifier list, dropping empty entries.
pub fn split_identifiers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fetches every identifier concurrently and joins the texts in input order,
/// one per line. The first failure aborts.
pub async fn fetch_all(
    provider: &dyn ContextProvider,
    identifiers: &[String],
) -> Result<String, FetchError> {
    let documents = try_join_all(identifiers.iter().map(|id| provider.fetch(id))).await?;
    Ok(documents.join("\n"))
}

fn unsupported_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| UNSUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reads UTF-8 text files, optionally relative to a root directory.
///
/// PDF and office documents are not extracted; they fail with
/// [`FetchError::UnsupportedFormat`] before the file is opened.
#[derive(Debug, Clone, Default)]
pub struct FileContextProvider {
    root: Option<PathBuf>,
}

impl FileContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative identifiers against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, identifier: &str) -> PathBuf {
        let path = PathBuf::from(identifier);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl ContextProvider for FileContextProvider {
    async fn fetch(&self, identifier: &str) -> Result<String, FetchError> {
        if unsupported_extension(identifier) {
            return Err(FetchError::UnsupportedFormat(identifier.to_string()));
        }
        let path = self.resolve(identifier);
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(identifier.to_string()),
            _ => FetchError::Unreadable {
                identifier: identifier.to_string(),
                message: e.to_string(),
            },
        })?;
        String::from_utf8(bytes).map_err(|_| FetchError::UnsupportedFormat(identifier.to_string()))
    }
}

/// Fetches `http(s)` URLs. HTML bodies are reduced to their visible text.
#[derive(Debug, Clone, Default)]
pub struct UrlContextProvider {
    client: reqwest::Client,
}

impl UrlContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContextProvider for UrlContextProvider {
    async fn fetch(&self, identifier: &str) -> Result<String, FetchError> {
        let url = Url::parse(identifier).map_err(|_| FetchError::NotFound(identifier.to_string()))?;
        if unsupported_extension(url.path()) {
            return Err(FetchError::UnsupportedFormat(identifier.to_string()));
        }

        let network = |e: reqwest::Error| FetchError::Network {
            identifier: identifier.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(url).send().await.map_err(network)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(identifier.to_string()));
        }
        let response = response.error_for_status().map_err(network)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if content_type.starts_with("application/pdf")
            || content_type.contains("officedocument")
            || content_type.starts_with("image/")
        {
            return Err(FetchError::UnsupportedFormat(identifier.to_string()));
        }

        let body = response.text().await.map_err(network)?;
        if content_type.contains("html") {
            Ok(html_to_text(&body))
        } else {
            Ok(body)
        }
    }
}

/// Strips markup and collapses blank runs into single newlines.
fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();

    if let Ok(hidden) = Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>") {
        text = hidden.replace_all(&text, " ").into_owned();
    }
    if let Ok(tags) = Regex::new(r"(?s)<[^>]*>") {
        text = tags.replace_all(&text, "\n").into_owned();
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    match Regex::new(r"[ \t\r\f]*\n\s*") {
        Ok(blank_runs) => blank_runs.replace_all(&decoded, "\n").trim().to_string(),
        Err(_) => decoded.trim().to_string(),
    }
}

/// Sends URLs to a [`UrlContextProvider`] and everything else to a
/// [`FileContextProvider`].
#[derive(Debug, Clone, Default)]
pub struct RoutingContextProvider {
    files: FileContextProvider,
    urls: UrlContextProvider,
}

impl RoutingContextProvider {
    pub fn new(files: FileContextProvider, urls: UrlContextProvider) -> Self {
        Self { files, urls }
    }
}

#[async_trait]
impl ContextProvider for RoutingContextProvider {
    async fn fetch(&self, identifier: &str) -> Result<String, FetchError> {
        match Url::parse(identifier) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => self.urls.fetch(identifier).await,
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| FetchError::NotFound(identifier.to_string()))?;
                self.files.fetch(&path.to_string_lossy()).await
            }
            _ => self.files.fetch(identifier).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_split_identifiers() {
        assert_eq!(
            split_identifiers(" notes.md, https://example.com/a ,,report.txt "),
            vec!["notes.md", "https://example.com/a", "report.txt"]
        );
        assert!(split_identifiers("  ").is_empty());
    }

    #[tokio::test]
    async fn test_file_provider_reads_text() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("brief.md"), "Ship the release.").unwrap();

        let provider = FileContextProvider::with_root(dir.path());
        assert_eq!(provider.fetch("brief.md").await.unwrap(), "Ship the release.");
    }

    #[tokio::test]
    async fn test_file_provider_not_found() {
        let dir = tempdir().unwrap();
        let provider = FileContextProvider::with_root(dir.path());

        let err = provider.fetch("missing.txt").await.unwrap_err();
        assert_eq!(err, FetchError::NotFound("missing.txt".into()));
    }

    #[tokio::test]
    async fn test_file_provider_directory_is_unreadable() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("notes")).unwrap();
        let provider = FileContextProvider::with_root(dir.path());

        let err = provider.fetch("notes").await.unwrap_err();
        assert!(matches!(err, FetchError::Unreadable { ref identifier, .. } if identifier == "notes"));
    }

    #[tokio::test]
    async fn test_binary_formats_unsupported() {
        let provider = FileContextProvider::new();
        assert!(matches!(
            provider.fetch("paper.PDF").await,
            Err(FetchError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            provider.fetch("memo.docx").await,
            Err(FetchError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_routing_provider_uses_files_for_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "alpha").unwrap();

        let provider = RoutingContextProvider::default();
        assert_eq!(provider.fetch(&path.to_string_lossy()).await.unwrap(), "alpha");

        let file_url = Url::from_file_path(&path).unwrap();
        assert_eq!(provider.fetch(file_url.as_str()).await.unwrap(), "alpha");
    }

    #[tokio::test]
    async fn test_fetch_all_joins_in_order() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), "first").unwrap();
        std::fs::write(dir.path().join("two.txt"), "second").unwrap();
        let provider = FileContextProvider::with_root(dir.path());

        let joined = fetch_all(&provider, &["one.txt".into(), "two.txt".into()])
            .await
            .unwrap();
        assert_eq!(joined, "first\nsecond");

        let err = fetch_all(&provider, &["one.txt".into(), "nope.txt".into()])
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::NotFound("nope.txt".into()));
    }

    #[tokio::test]
    async fn test_fetch_all_empty() {
        let provider = FileContextProvider::new();
        assert_eq!(fetch_all(&provider, &[]).await.unwrap(), "");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><title>t</title></head><body><script>var x = 1;</script>\
                    <h1>Title</h1><p>Fish &amp; chips</p></body></html>";
        assert_eq!(html_to_text(html), "Title\nFish & chips");
    }
}
