//! HTTP client for a running `office2pdf serve`.
//!
//! One method per endpoint. Non-success answers are decoded from the
//! server's `{message, error}` body into [`Office2PdfError::Http`].

use crate::config::ClientConfig;
use crate::error::Office2PdfError;
use crate::job::{ConversionJob, JobResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of a successful cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

/// Body of `POST /api/download/zip`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipRequest {
    pub file_ids: Vec<u64>,
}

/// Thin typed wrapper over the server's HTTP API.
#[derive(Debug, Clone)]
pub struct ConverterClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ConverterClient {
    pub fn new(config: &ClientConfig) -> Result<Self, Office2PdfError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("office2pdf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Office2PdfError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.server_url.clone(),
            timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a server path such as a `pdfUrl`.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Upload one document and wait for its conversion.
    pub async fn submit(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<JobResult, Office2PdfError> {
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime.essence_str())
            .map_err(|e| Office2PdfError::Internal(format!("multipart: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = self.url("/api/conversion");
        debug!("POST {} ({})", url, file_name);
        let response = self.send(self.http.post(&url).multipart(form), &url).await?;
        decode_json(response, &url).await
    }

    /// Ask the server to cancel a job; returns the server's message.
    pub async fn cancel(&self, job_id: u64) -> Result<String, Office2PdfError> {
        let url = self.url(&format!("/api/conversion/{job_id}/cancel"));
        let response = self.send(self.http.post(&url), &url).await?;
        let body: MessageBody = decode_json(response, &url).await?;
        Ok(body.message)
    }

    pub async fn job(&self, job_id: u64) -> Result<ConversionJob, Office2PdfError> {
        let url = self.url(&format!("/api/conversion/{job_id}"));
        let response = self.send(self.http.get(&url), &url).await?;
        decode_json(response, &url).await
    }

    pub async fn jobs(&self) -> Result<Vec<ConversionJob>, Office2PdfError> {
        let url = self.url("/api/conversion");
        let response = self.send(self.http.get(&url), &url).await?;
        decode_json(response, &url).await
    }

    /// ZIP bytes for the outputs of `job_ids`.
    pub async fn download_zip(&self, job_ids: &[u64]) -> Result<Bytes, Office2PdfError> {
        let url = self.url("/api/download/zip");
        let body = ZipRequest {
            file_ids: job_ids.to_vec(),
        };
        let response = self.send(self.http.post(&url).json(&body), &url).await?;
        read_bytes(response, &url).await
    }

    /// Bytes of one converted PDF, addressed by its `pdfUrl`.
    pub async fn download(&self, pdf_url: &str) -> Result<Bytes, Office2PdfError> {
        let url = self.url(pdf_url);
        let response = self.send(self.http.get(&url), &url).await?;
        read_bytes(response, &url).await
    }

    /// Send with the per-request timeout and turn error statuses into errors.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, Office2PdfError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(e, url))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => body.error.unwrap_or(body.message),
            Err(_) if text.trim().is_empty() => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            Err(_) => text,
        };
        Err(Office2PdfError::Http {
            status: status.as_u16(),
            message,
        })
    }

    fn request_error(&self, e: reqwest::Error, url: &str) -> Office2PdfError {
        if e.is_timeout() {
            Office2PdfError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            Office2PdfError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
) -> Result<T, Office2PdfError> {
    response
        .json::<T>()
        .await
        .map_err(|e| Office2PdfError::RequestFailed {
            url: url.to_string(),
            reason: format!("invalid response body: {e}"),
        })
}

async fn read_bytes(response: reqwest::Response, url: &str) -> Result<Bytes, Office2PdfError> {
    response
        .bytes()
        .await
        .map_err(|e| Office2PdfError::RequestFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ConverterClient {
        let config = ClientConfig::builder()
            .server_url("http://localhost:5000/")
            .build()
            .unwrap();
        ConverterClient::new(&config).unwrap()
    }

    #[test]
    fn url_joins_relative_paths() {
        let c = client();
        assert_eq!(
            c.url("/api/files/1/a.pdf"),
            "http://localhost:5000/api/files/1/a.pdf"
        );
        assert_eq!(c.url("api/conversion"), "http://localhost:5000/api/conversion");
        assert_eq!(c.url("https://cdn.example/x.pdf"), "https://cdn.example/x.pdf");
    }

    #[test]
    fn zip_request_uses_camel_case() {
        let body = serde_json::to_value(ZipRequest {
            file_ids: vec![1, 2],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"fileIds": [1, 2]}));
    }

    #[test]
    fn error_body_error_field_optional() {
        let b: ErrorBody = serde_json::from_str(r#"{"message":"File not found"}"#).unwrap();
        assert_eq!(b.error, None);
    }

    #[tokio::test]
    async fn unreachable_server_is_request_failure() {
        let config = ClientConfig::builder()
            .server_url("http://127.0.0.1:9")
            .request_timeout_secs(2)
            .build()
            .unwrap();
        let c = ConverterClient::new(&config).unwrap();
        let err = c.jobs().await.unwrap_err();
        assert!(matches!(
            err,
            Office2PdfError::RequestFailed { .. } | Office2PdfError::Timeout { .. }
        ));
    }
}
