//! Shared HTTP plumbing for provider clients

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response};

use crate::error::{map_http_error, GenerationError};
use crate::streaming::ByteStream;

/// Connect timeout for every provider client
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Whole-call bound for request/response calls, body included
///
/// Streamed bodies are not bounded; they end when the provider closes them
/// or the caller goes away.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build a client for provider calls
///
/// Only connection setup is bounded here. Request/response calls add their
/// own bound through [`send_bounded`].
///
/// # Errors
///
/// Returns [`GenerationError::Transport`] if the TLS backend cannot be
/// initialised.
pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| GenerationError::transport("client", e))
}

/// Send a request and reject non-success statuses
pub(crate) async fn send(
    operation: &str,
    request: RequestBuilder,
) -> Result<Response, GenerationError> {
    let response = request
        .send()
        .await
        .map_err(|e| map_http_error(operation, &e))?;
    response
        .error_for_status()
        .map_err(|e| map_http_error(operation, &e))
}

/// [`send`] with a bound on the whole call
pub(crate) async fn send_bounded(
    operation: &str,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<Response, GenerationError> {
    send(operation, request.timeout(timeout)).await
}

/// Whether the response declares a JSON body
pub(crate) fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/json"))
}

/// Incremental body as a [`ByteStream`]
pub(crate) fn byte_stream(operation: &'static str, response: Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(move |chunk| {
        chunk
            .map(|bytes| bytes.to_vec())
            .map_err(|e| map_http_error(operation, &e))
    }))
}

/// Join a configured base URL and an absolute path
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Path component of a URL, lowercased, without query or fragment
pub(crate) fn url_path_lower(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
