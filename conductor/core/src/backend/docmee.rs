//! Presentation Backend (Docmee)
//!
//! Client for the Docmee AI presentation API. All calls share the
//! `{code, message, data}` envelope and carry a short-lived token in the
//! `token` header. The same client issues those tokens: it implements
//! [`TokenIssuer`] by calling `createApiToken` with the long-lived secret
//! key, so it is usually wrapped in a [`TokenBroker`] rather than called
//! for tokens directly.
//!
//! # Endpoints
//!
//! | Operation | Path |
//! | --- | --- |
//! | createApiToken | `/api/user/createApiToken` |
//! | parseFileData | `/api/ppt/parseFileData` (multipart) |
//! | generateOutline | `/api/ppt/generateOutline` (event stream) |
//! | generateContent | `/api/ppt/generateContent` (event stream) |
//! | randomTemplates | `/api/ppt/randomTemplates` |
//! | generatePptx | `/api/ppt/generatePptx` |
//! | directGeneratePptx | `/api/ppt/directGeneratePptx` (event stream or JSON) |
//! | downloadPptx | `/api/ppt/downloadPptx` |
//!
//! [`TokenBroker`]: crate::credentials::TokenBroker

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::envelope::{read_envelope, read_json, ApiEnvelope};
use super::http::{self, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use super::traits::{
    ContentRequest, DirectPptxRequest, OutlineRequest, PptInfo, PptxRequest, PresentationBackend,
    TemplateSummary,
};
use crate::config::ConfigLookup;
use crate::credentials::TokenIssuer;
use crate::error::GenerationError;
use crate::request::SourceDocument;
use crate::streaming::ByteStream;

/// Header carrying keys and tokens
const TOKEN_HEADER: &str = "token";

const DIRECT_PATH: &str = "/api/ppt/directGeneratePptx";

#[derive(Debug, Serialize)]
struct CreateTokenBody<'a> {
    uid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct DirectBody<'a> {
    stream: bool,
    #[serde(flatten)]
    request: &'a DirectPptxRequest,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedFile {
    data_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedPptx {
    ppt_info: PptInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadInfo {
    file_url: String,
}

/// Docmee presentation client
#[derive(Clone)]
pub struct DocmeeClient {
    config: Arc<dyn ConfigLookup>,
    http_client: reqwest::Client,
    request_timeout: Duration,
}

impl DocmeeClient {
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

    /// Bound on calls that are not event streams
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> Result<String, GenerationError> {
        let base = self.config.require_value("docmee.url")?;
        Ok(http::join_url(&base, path))
    }

    /// POST a JSON body and unwrap the envelope
    async fn call<B, T>(
        &self,
        operation: &str,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<T, GenerationError>
    where
        B: Serialize + Sync + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = self.url(path)?;
        let response = http::send_bounded(
            operation,
            self.http_client
                .post(url)
                .header(TOKEN_HEADER, token)
                .json(body),
            self.request_timeout,
        )
        .await?;
        read_envelope(operation, response).await
    }

    /// POST a JSON body expecting an event stream
    ///
    /// A JSON answer instead of a stream is an error envelope.
    async fn open_stream<B>(
        &self,
        operation: &'static str,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<ByteStream, GenerationError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.url(path)?;
        let response = http::send(
            operation,
            self.http_client
                .post(url)
                .header(TOKEN_HEADER, token)
                .json(body),
        )
        .await?;

        if http::is_json(&response) {
            let envelope: ApiEnvelope<serde_json::Value> = read_json(operation, response).await?;
            return Err(match envelope.into_data(operation) {
                Err(e) => e,
                Ok(_) => GenerationError::provider(operation, "expected an event stream"),
            });
        }

        Ok(http::byte_stream(operation, response))
    }
}

#[async_trait]
impl TokenIssuer for DocmeeClient {
    async fn issue(&self, principal: &str, limit: Option<u32>) -> Result<String, GenerationError> {
        let key = self.config.require_value("docmee.key")?;
        let data: TokenData = self
            .call(
                "createApiToken",
                "/api/user/createApiToken",
                &key,
                &CreateTokenBody {
                    uid: principal,
                    limit,
                },
            )
            .await?;
        Ok(data.token)
    }
}

#[async_trait]
impl PresentationBackend for DocmeeClient {
    fn name(&self) -> &'static str {
        "docmee"
    }

    async fn parse_file_data(
        &self,
        token: &str,
        source: &SourceDocument,
    ) -> Result<String, GenerationError> {
        const OPERATION: &str = "parseFileData";
        let form = match source {
            SourceDocument::Url(url) => Form::new().text("fileUrl", url.clone()),
            SourceDocument::Inline(text) => Form::new().text("content", text.clone()),
        };

        let response = http::send_bounded(
            OPERATION,
            self.http_client
                .post(self.url("/api/ppt/parseFileData")?)
                .header(TOKEN_HEADER, token)
                .multipart(form),
            self.request_timeout,
        )
        .await?;
        let parsed: ParsedFile = read_envelope(OPERATION, response).await?;
        Ok(parsed.data_url)
    }

    async fn generate_outline(
        &self,
        token: &str,
        request: &OutlineRequest,
    ) -> Result<ByteStream, GenerationError> {
        self.open_stream("generateOutline", "/api/ppt/generateOutline", token, request)
            .await
    }

    async fn generate_content(
        &self,
        token: &str,
        request: &ContentRequest,
    ) -> Result<ByteStream, GenerationError> {
        self.open_stream("generateContent", "/api/ppt/generateContent", token, request)
            .await
    }

    async fn random_templates(
        &self,
        token: &str,
        size: usize,
        category: i64,
    ) -> Result<Vec<TemplateSummary>, GenerationError> {
        self.call(
            "randomTemplates",
            "/api/ppt/randomTemplates",
            token,
            &json!({ "size": size, "filters": { "type": category } }),
        )
        .await
    }

    async fn generate_pptx(
        &self,
        token: &str,
        request: &PptxRequest,
    ) -> Result<PptInfo, GenerationError> {
        let generated: GeneratedPptx = self
            .call("generatePptx", "/api/ppt/generatePptx", token, request)
            .await?;
        Ok(generated.ppt_info)
    }

    async fn direct_generate_pptx(
        &self,
        token: &str,
        request: &DirectPptxRequest,
    ) -> Result<PptInfo, GenerationError> {
        let body = DirectBody {
            stream: false,
            request,
        };
        let generated: GeneratedPptx = self
            .call("directGeneratePptx", DIRECT_PATH, token, &body)
            .await?;
        Ok(generated.ppt_info)
    }

    async fn direct_generate_pptx_stream(
        &self,
        token: &str,
        request: &DirectPptxRequest,
    ) -> Result<ByteStream, GenerationError> {
        let body = DirectBody {
            stream: true,
            request,
        };
        self.open_stream("directGeneratePptx", DIRECT_PATH, token, &body)
            .await
    }

    async fn download_pptx(&self, token: &str, ppt_id: &str) -> Result<String, GenerationError> {
        let info: DownloadInfo = self
            .call(
                "downloadPptx",
                "/api/ppt/downloadPptx",
                token,
                &json!({ "id": ppt_id }),
            )
            .await?;
        Ok(info.file_url)
    }

    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>, GenerationError> {
        const OPERATION: &str = "fetchFile";
        let response =
            http::send_bounded(OPERATION, self.http_client.get(url), self.request_timeout).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::transport(OPERATION, e))?;
        Ok(bytes.to_vec())
    }
}

impl std::fmt::Debug for DocmeeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocmeeClient").finish_non_exhaustive()
    }
}
