//! Response envelopes
//!
//! The presentation provider wraps every answer in `{code, message, data}`
//! and reports failures with a non-zero `code` on HTTP 200. The OCR provider
//! wraps answers in `{code, msg, data}` with a string code.

use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::error::Category;

use crate::error::GenerationError;

/// `{code, message, data}` envelope
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Payload, or a provider error when `code` is non-zero or data is absent
    pub fn into_data(self, operation: &str) -> Result<T, GenerationError> {
        if self.code != 0 {
            let message = self
                .message
                .unwrap_or_else(|| format!("provider code {}", self.code));
            return Err(GenerationError::provider(operation, message));
        }
        self.data
            .ok_or_else(|| GenerationError::provider(operation, "response carried no data"))
    }
}

/// `{code, msg, data}` envelope with a string code
#[derive(Debug, Deserialize)]
pub(crate) struct TaskEnvelope<T> {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> TaskEnvelope<T> {
    /// Payload, or a provider error when data is absent
    pub fn into_data(self, operation: &str) -> Result<T, GenerationError> {
        match self.data {
            Some(data) => Ok(data),
            None => {
                let message = self
                    .msg
                    .or(self.code)
                    .unwrap_or_else(|| "response carried no data".to_string());
                Err(GenerationError::provider(operation, message))
            }
        }
    }
}

/// Read a body as JSON
pub(crate) async fn read_json<T: DeserializeOwned>(
    operation: &str,
    response: Response,
) -> Result<T, GenerationError> {
    let body = response
        .text()
        .await
        .map_err(|e| GenerationError::transport(operation, e))?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::debug!(operation, error = %e, body = %body, "Undecodable provider response");
        undecodable(operation, &e)
    })
}

/// Provider error for a body that is not the expected JSON
///
/// Only the decode category is reported; the body itself stays in logs.
fn undecodable(operation: &str, error: &serde_json::Error) -> GenerationError {
    let category = match error.classify() {
        Category::Io => "io",
        Category::Syntax => "syntax",
        Category::Data => "data",
        Category::Eof => "eof",
    };
    GenerationError::provider(
        operation,
        format!("undecodable response ({category} error)"),
    )
}

/// Read a `{code, message, data}` body and unwrap its payload
pub(crate) async fn read_envelope<T: DeserializeOwned>(
    operation: &str,
    response: Response,
) -> Result<T, GenerationError> {
    read_json::<ApiEnvelope<T>>(operation, response)
        .await?
        .into_data(operation)
}
