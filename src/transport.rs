//! Single HTTP exchanges, with no knowledge of sessions or retries.
//!
//! [`Transport::execute`] sends one request and either returns the raw successful response or a
//! [`TransportFailure`]. Failure responses carrying the vCloud error envelope are parsed here so
//! the classifier and the executor never re-read the body.

use crate::constants::{media_type, REQUEST_ID_HEADER};
use crate::model::VcdError;
use crate::{Error, Result};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, StatusCode};
use std::time::{Duration, Instant};
use url::Url;

/// A fully prepared request: absolute URL, final headers, serialized body.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl TransportRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// A 2xx response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
    pub latency: Duration,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// A non-2xx response, with the error envelope parsed when the content type announces one.
#[derive(Debug, Clone)]
pub struct FailedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub raw_body: String,
    pub envelope: Option<VcdError>,
}

impl FailedResponse {
    fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    fn request_id(&self) -> Option<String> {
        self.headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Converts this failure into the crate error.
    ///
    /// Envelope bodies become [`Error::Server`] with `vcd_error`; `text/plain` and `text/xml`
    /// bodies become [`Error::Server`] with `message`; an empty body on a 4xx/5xx becomes a bare
    /// [`Error::Server`]; anything else is [`Error::ResponseProcessing`].
    pub fn into_error(self) -> Error {
        let request_id = self.request_id();
        let content_type = self.content_type().to_ascii_lowercase();

        if content_type.contains(media_type::ERROR) {
            return match self.envelope {
                Some(envelope) => Error::Server {
                    status: self.status,
                    request_id,
                    vcd_error: Some(envelope),
                    message: None,
                    raw_response: self.raw_body,
                    headers: Box::new(self.headers),
                },
                None => Error::ResponseProcessing {
                    status: self.status,
                    request_id,
                    raw_response: self.raw_body,
                    reason: "malformed error envelope".to_string(),
                },
            };
        }

        let is_text = content_type.starts_with(media_type::TEXT_PLAIN)
            || content_type.starts_with(media_type::TEXT_XML);
        let is_failure = self.status.is_client_error() || self.status.is_server_error();

        if is_text || (self.raw_body.trim().is_empty() && is_failure) {
            let message = (!self.raw_body.trim().is_empty()).then(|| self.raw_body.clone());
            return Error::Server {
                status: self.status,
                request_id,
                vcd_error: None,
                message,
                raw_response: self.raw_body,
                headers: Box::new(self.headers),
            };
        }

        Error::ResponseProcessing {
            status: self.status,
            request_id,
            raw_response: self.raw_body,
            reason: format!("unrecognized content type '{content_type}'"),
        }
    }
}

/// Why a single exchange did not produce a 2xx response.
#[derive(Debug)]
pub enum TransportFailure {
    /// No response was received.
    Network(reqwest::Error),
    /// The server answered with a non-2xx status.
    Status(FailedResponse),
}

impl TransportFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportFailure::Network(_) => None,
            TransportFailure::Status(response) => Some(response.status),
        }
    }

    pub fn into_error(self) -> Error {
        match self {
            TransportFailure::Network(e) if e.is_timeout() => Error::Timeout,
            TransportFailure::Network(e) => Error::Network(e),
            TransportFailure::Status(response) => response.into_error(),
        }
    }
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportFailure::Network(e) => write!(f, "network error: {e}"),
            TransportFailure::Status(response) => write!(f, "HTTP status {}", response.status),
        }
    }
}

/// Connection and deadline settings for the underlying HTTP engine.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for a whole exchange.
    pub timeout: Duration,
    /// Deadline for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
    pub user_agent: Option<String>,
    /// Accept self-signed certificates. Lab setups only.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(30),
            user_agent: None,
            accept_invalid_certs: false,
        }
    }
}

/// Performs single HTTP exchanges.
#[derive(Debug, Clone)]
pub struct Transport {
    http_client: reqwest::Client,
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let http_client = builder.build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { http_client })
    }

    /// Sends one request. Never retries.
    pub async fn execute(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<RawResponse, TransportFailure> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            "Executing HTTP request"
        );

        let start = Instant::now();
        let mut builder = self
            .http_client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(TransportFailure::Network)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(TransportFailure::Network)?;
        let latency = start.elapsed();

        tracing::info!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            "Received HTTP response"
        );

        if status.is_success() {
            return Ok(RawResponse {
                status,
                headers,
                body,
                latency,
            });
        }

        let is_envelope = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(media_type::ERROR));
        let envelope = if is_envelope {
            serde_json::from_str::<VcdError>(&body).ok()
        } else {
            None
        };

        if status.is_client_error() {
            tracing::error!(status = status.as_u16(), response = %body, "Client error (4xx)");
        } else {
            tracing::warn!(status = status.as_u16(), response = %body, "Server error");
        }

        Err(TransportFailure::Status(FailedResponse {
            status,
            headers,
            raw_body: body,
            envelope,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn failure(status: StatusCode, content_type: Option<&str>, body: &str) -> FailedResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
        let envelope = serde_json::from_str(body).ok();
        FailedResponse {
            status,
            headers,
            raw_body: body.to_string(),
            envelope,
        }
    }

    #[test]
    fn test_envelope_becomes_server_error() {
        let err = failure(
            StatusCode::BAD_REQUEST,
            Some("application/vnd.vmware.vcloud.error+json;version=36.0"),
            r#"{"message":"bad","majorErrorCode":400,"minorErrorCode":"BAD_REQUEST"}"#,
        )
        .into_error();
        match err {
            Error::Server {
                vcd_error: Some(e),
                request_id,
                ..
            } => {
                assert_eq!(e.message.as_deref(), Some("bad"));
                assert_eq!(e.major_error_code, 400);
                assert_eq!(e.minor_error_code.as_deref(), Some("BAD_REQUEST"));
                assert_eq!(request_id.as_deref(), Some("abc-123"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_text_body_becomes_message() {
        let err = failure(StatusCode::NOT_FOUND, Some("text/plain"), "not here").into_error();
        assert!(matches!(
            err,
            Error::Server { message: Some(ref m), vcd_error: None, .. } if m == "not here"
        ));
    }

    #[test]
    fn test_empty_body_becomes_bare_server_error() {
        let err = failure(StatusCode::INTERNAL_SERVER_ERROR, None, "").into_error();
        assert!(matches!(
            err,
            Error::Server {
                message: None,
                vcd_error: None,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_body_is_processing_error() {
        let err = failure(StatusCode::BAD_GATEWAY, Some("text/html"), "<html/>").into_error();
        assert!(matches!(err, Error::ResponseProcessing { .. }));
        assert_eq!(err.request_id(), Some("abc-123"));
    }
}
