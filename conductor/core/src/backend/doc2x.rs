//! Document Recognition Backend (Doc2x)
//!
//! Doc2x converts PDFs and images into page markdown asynchronously:
//! submit the document URL, then poll the task status until it reports
//! `success`.
//!
//! [`Doc2xClient`] is the wire client and implements [`AsyncTaskProvider`].
//! [`Doc2xRecognizer`] is the front door used by the pipeline: it validates
//! the source, reads plain-text documents directly and hands everything
//! else to the [`AsyncTaskPoller`].
//!
//! Word documents (`.docx`) are opened locally. Text mode returns their
//! paragraphs directly; markdown mode renders them to a PDF, stores it in
//! the configured [`FileStore`] and recognizes the stored copy.
//!
//! Configuration keys `doc2x.url` and `doc2x.key` are resolved on every
//! call; a missing or blank value fails before any request is sent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use super::docx;
use super::envelope::{read_json, TaskEnvelope};
use super::http::{self, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use super::traits::DocumentRecognizer;
use crate::config::ConfigLookup;
use crate::error::{map_http_error, GenerationError};
use crate::poller::{
    AsyncTaskPoller, AsyncTaskProvider, PageFragment, PollPolicy, RemoteStatus, TaskHandle,
    TaskResult,
};
use crate::request::{ResultMode, SourceDocument};
use crate::store::FileStore;

/// Store directory for Word documents rendered to PDF
const CONVERTED_PATH: &str = "uploads/docx";

#[derive(Debug, Deserialize)]
struct Submitted {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    #[serde(default)]
    status: String,
    #[serde(default)]
    result: Option<StatusResult>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    #[serde(default)]
    pages: Vec<StatusPage>,
}

#[derive(Debug, Deserialize)]
struct StatusPage {
    #[serde(default)]
    md: String,
}

impl StatusData {
    fn into_remote_status(self) -> RemoteStatus {
        match self.status.as_str() {
            "success" => RemoteStatus::Succeeded(TaskResult {
                pages: self
                    .result
                    .map(|r| r.pages)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|page| PageFragment { markdown: page.md })
                    .collect(),
            }),
            "failed" | "error" => RemoteStatus::Failed {
                message: self
                    .detail
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| format!("task reported status {}", self.status)),
            },
            _ => RemoteStatus::Pending { raw: self.status },
        }
    }
}

/// Doc2x wire client
#[derive(Clone)]
pub struct Doc2xClient {
    config: Arc<dyn ConfigLookup>,
    http_client: reqwest::Client,
    request_timeout: Duration,
}

impl Doc2xClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(config: Arc<dyn ConfigLookup>) -> Result<Self, GenerationError> {
        Ok(Self::with_client(config, http::build_client(DEFAULT_CONNECT_TIMEOUT)?))
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_client(config: Arc<dyn ConfigLookup>, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bound on each submit, poll and fetch call
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Base URL and key, both required
    fn endpoint(&self) -> Result<(String, String), GenerationError> {
        let base = self.config.require_value("doc2x.url")?;
        let key = self.config.require_value("doc2x.key")?;
        Ok((base, key))
    }

    async fn post_submit(
        &self,
        url: &str,
        key: &str,
        document_url: &str,
    ) -> Result<reqwest::Response, GenerationError> {
        self.http_client
            .post(url)
            .bearer_auth(key)
            .form(&[("pdf_url", document_url), ("ocr", "true")])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| map_http_error("submit", &e))
    }

    /// Fetch a document's raw bytes
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, GenerationError> {
        const OPERATION: &str = "fetchDocument";
        if let Some(path) = url.strip_prefix("file://") {
            return tokio::fs::read(path)
                .await
                .map_err(|e| GenerationError::transport(OPERATION, e));
        }
        let response =
            http::send_bounded(OPERATION, self.http_client.get(url), self.request_timeout).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::transport(OPERATION, e))?;
        Ok(bytes.to_vec())
    }

    /// Fetch a plain-text document
    async fn fetch_text(&self, url: &str) -> Result<String, GenerationError> {
        const OPERATION: &str = "fetchText";
        if let Some(path) = url.strip_prefix("file://") {
            return tokio::fs::read_to_string(path)
                .await
                .map_err(|e| GenerationError::transport(OPERATION, e));
        }
        let response =
            http::send_bounded(OPERATION, self.http_client.get(url), self.request_timeout).await?;
        response
            .text()
            .await
            .map_err(|e| GenerationError::transport(OPERATION, e))
    }
}

#[async_trait]
impl AsyncTaskProvider for Doc2xClient {
    type Request = String;

    async fn submit(&self, document_url: &String) -> Result<String, GenerationError> {
        const OPERATION: &str = "submit";
        let (base, key) = self.endpoint()?;
        let is_pdf = http::url_path_lower(document_url).ends_with(".pdf");
        let (primary, legacy) = if is_pdf {
            ("/api/v1/async/pdf", "/api/pdf/async")
        } else {
            ("/api/v1/async/img", "/api/img/async")
        };

        let url = http::join_url(&base, primary);
        tracing::info!(url = %url, document = %document_url, "Submitting recognition task");
        let mut response = self.post_submit(&url, &key, document_url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            let fallback = http::join_url(&base, legacy);
            tracing::warn!(
                endpoint = primary,
                fallback = %fallback,
                "Endpoint returned 404, trying legacy endpoint"
            );
            response = self.post_submit(&fallback, &key, document_url).await?;
        }

        let response = response
            .error_for_status()
            .map_err(|e| map_http_error(OPERATION, &e))?;
        let envelope: TaskEnvelope<Submitted> = read_json(OPERATION, response).await?;
        Ok(envelope.into_data(OPERATION)?.uuid)
    }

    async fn poll(&self, handle: &TaskHandle) -> Result<RemoteStatus, GenerationError> {
        const OPERATION: &str = "poll";
        let (base, key) = self.endpoint()?;
        let url = http::join_url(&base, "/api/v1/async/status");

        let response = http::send_bounded(
            OPERATION,
            self.http_client
                .get(url)
                .bearer_auth(key)
                .query(&[("uuid", handle.id.as_str())]),
            self.request_timeout,
        )
        .await?;
        let envelope: TaskEnvelope<StatusData> = read_json(OPERATION, response).await?;
        Ok(envelope.into_data(OPERATION)?.into_remote_status())
    }
}

impl std::fmt::Debug for Doc2xClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doc2xClient").finish_non_exhaustive()
    }
}

/// Recognition front door combining [`Doc2xClient`] and the poller
#[derive(Clone)]
pub struct Doc2xRecognizer {
    client: Doc2xClient,
    poller: AsyncTaskPoller,
    policy: PollPolicy,
    files: Option<Arc<dyn FileStore>>,
}

impl Doc2xRecognizer {
    /// Create a recognizer
    #[must_use]
    pub fn new(client: Doc2xClient, poller: AsyncTaskPoller, policy: PollPolicy) -> Self {
        Self {
            client,
            poller,
            policy,
            files: None,
        }
    }

    /// Store for Word documents rendered to PDF before recognition
    ///
    /// The store must return URLs the provider can fetch.
    #[must_use]
    pub fn with_file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = Some(files);
        self
    }

    async fn recognize_docx(&self, url: &str, mode: ResultMode) -> Result<String, GenerationError> {
        let bytes = self.client.fetch_bytes(url).await?;
        let paragraphs = docx::paragraphs(&bytes)?;
        if mode == ResultMode::Text {
            tracing::debug!(
                document = %url,
                paragraphs = paragraphs.len(),
                "Reading Word document directly"
            );
            return Ok(docx::text(&paragraphs));
        }

        let files = self.files.as_ref().ok_or_else(|| {
            GenerationError::validation("recognizing a Word document as markdown needs a file store")
        })?;
        let name = format!("{}.pdf", Uuid::new_v4());
        let pdf_url = files
            .upload(&name, CONVERTED_PATH, docx::render_pdf(&paragraphs))
            .await
            .map_err(|e| GenerationError::transport("storeConverted", e))?;
        tracing::info!(document = %url, converted = %pdf_url, "Word document rendered to PDF");

        self.poller
            .run_to_completion(&self.client, &pdf_url, self.policy, mode)
            .await
    }
}

impl std::fmt::Debug for Doc2xRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doc2xRecognizer")
            .field("policy", &self.policy)
            .field("file_store", &self.files.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentRecognizer for Doc2xRecognizer {
    fn name(&self) -> &'static str {
        "doc2x"
    }

    async fn recognize(
        &self,
        source: &SourceDocument,
        mode: ResultMode,
    ) -> Result<String, GenerationError> {
        let url = match source {
            _ if source.is_blank() => {
                return Err(GenerationError::validation("source document is blank"));
            }
            SourceDocument::Inline(text) => return Ok(text.clone()),
            SourceDocument::Url(url) => url.trim().to_string(),
        };

        let path = http::url_path_lower(&url);
        if path.ends_with(".txt") {
            tracing::debug!(document = %url, "Reading plain-text document directly");
            return self.client.fetch_text(&url).await;
        }
        if path.ends_with(".docx") {
            return self.recognize_docx(&url, mode).await;
        }

        self.poller
            .run_to_completion(&self.client, &url, self.policy, mode)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn status(json: &str) -> RemoteStatus {
        serde_json::from_str::<StatusData>(json)
            .unwrap()
            .into_remote_status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status(r#"{"status":"processing","progress":40}"#),
            RemoteStatus::Pending {
                raw: "processing".into()
            }
        );
        assert_eq!(
            status(r#"{"status":"success","result":{"pages":[{"md":"a"},{"md":"b"}]}}"#),
            RemoteStatus::Succeeded(TaskResult {
                pages: vec![
                    PageFragment {
                        markdown: "a".into()
                    },
                    PageFragment {
                        markdown: "b".into()
                    },
                ]
            })
        );
        assert_eq!(
            status(r#"{"status":"failed","detail":"encrypted pdf"}"#),
            RemoteStatus::Failed {
                message: "encrypted pdf".into()
            }
        );
    }

    #[tokio::test]
    async fn test_blank_config_fails_before_request() {
        let config = Arc::new(crate::config::MapConfig::new().with("doc2x.url", "http://127.0.0.1:9"));
        let client = Doc2xClient::new(config).unwrap();
        let err = client
            .submit(&"https://x.example/a.pdf".to_string())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::Configuration {
                key: "doc2x.key".into()
            }
        );
    }

    #[tokio::test]
    async fn test_txt_source_read_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain notes").unwrap();

        let config = Arc::new(crate::config::MapConfig::new());
        let recognizer = Doc2xRecognizer::new(
            Doc2xClient::new(config).unwrap(),
            AsyncTaskPoller::new(Arc::new(crate::clock::ManualClock::new())),
            PollPolicy::default(),
        );

        let text = recognizer
            .recognize(
                &SourceDocument::Url(format!("file://{}", path.display())),
                ResultMode::Markdown,
            )
            .await
            .unwrap();
        assert_eq!(text, "plain notes");
    }

    #[tokio::test]
    async fn test_blank_source_is_validation_error() {
        let recognizer = Doc2xRecognizer::new(
            Doc2xClient::new(Arc::new(crate::config::MapConfig::new())).unwrap(),
            AsyncTaskPoller::new(Arc::new(crate::clock::ManualClock::new())),
            PollPolicy::default(),
        );
        let err = recognizer
            .recognize(&SourceDocument::Url("  ".into()), ResultMode::Text)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    fn local_recognizer() -> Doc2xRecognizer {
        Doc2xRecognizer::new(
            Doc2xClient::new(Arc::new(crate::config::MapConfig::new())).unwrap(),
            AsyncTaskPoller::new(Arc::new(crate::clock::ManualClock::new())),
            PollPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_docx_text_mode_reads_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Report.DOCX");
        let body = r#"<w:p><w:r><w:t>Summary</w:t></w:r></w:p><w:p><w:r><w:t>Revenue grew</w:t></w:r></w:p>"#;
        std::fs::write(&path, crate::backend::docx::tests::docx(body)).unwrap();

        let text = local_recognizer()
            .recognize(
                &SourceDocument::Url(format!("file://{}", path.display())),
                ResultMode::Text,
            )
            .await
            .unwrap();
        assert_eq!(text, "Summary\nRevenue grew\n");
    }

    #[tokio::test]
    async fn test_docx_markdown_without_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.docx");
        let body = r#"<w:p><w:r><w:t>x</w:t></w:r></w:p>"#;
        std::fs::write(&path, crate::backend::docx::tests::docx(body)).unwrap();

        let err = local_recognizer()
            .recognize(
                &SourceDocument::Url(format!("file://{}", path.display())),
                ResultMode::Markdown,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert!(err.to_string().contains("file store"));
    }

    #[tokio::test]
    async fn test_corrupt_docx_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();

        let err = local_recognizer()
            .recognize(
                &SourceDocument::Url(format!("file://{}", path.display())),
                ResultMode::Text,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
