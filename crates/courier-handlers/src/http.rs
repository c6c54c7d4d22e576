// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared outbound HTTP client for channel handlers.
//!
//! One pooled [`reqwest::Client`] serves every handler. Each exchange is
//! recorded into the caller's [`ChannelLog`], successful or not, before the
//! outcome is classified into a [`SendError`].

use std::time::Instant;

use courier_config::model::HttpConfig;
use courier_core::{ChannelLog, CourierError, HttpTrace, SendError};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Pooled HTTP client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, CourierError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CourierError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Builds a request with a URL-encoded form body.
    pub fn form<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        form: &T,
    ) -> Result<RequestBuilder, SendError> {
        let body = serde_urlencoded::to_string(form)
            .map_err(|e| SendError::Internal(format!("unable to encode form: {e}")))?;
        Ok(self
            .request(method, url)
            .header(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_FORM))
            .body(body))
    }

    /// Builds a request with a JSON body.
    pub fn json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        payload: &T,
    ) -> Result<RequestBuilder, SendError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| SendError::Internal(format!("unable to encode JSON: {e}")))?;
        Ok(self
            .request(method, url)
            .header(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON))
            .body(body))
    }

    /// Performs the request and records it into `clog`.
    ///
    /// Only transport failures are errors here; any HTTP status comes back as
    /// an [`HttpResponse`] for the handler to judge.
    pub async fn execute(
        &self,
        builder: RequestBuilder,
        clog: &mut ChannelLog,
    ) -> Result<HttpResponse, SendError> {
        let request = builder
            .build()
            .map_err(|e| SendError::MessageInvalid(format!("unable to build request: {e}")))?;
        let method = request.method().to_string();
        let url = request.url().to_string();
        let request_body = request
            .body()
            .and_then(|b| b.as_bytes())
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        let started = Instant::now();
        let result = self.client.execute(request).await;
        let (status, response_body) = match result {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.bytes().await {
                    Ok(bytes) => (Some(status), Ok(bytes.to_vec())),
                    Err(e) => (Some(status), Err(e)),
                }
            }
            Err(e) => (None, Err(e)),
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let response = response_body.as_deref().map(<[u8]>::to_vec).unwrap_or_default();
        clog.record_http(HttpTrace {
            method,
            url,
            status_code: status,
            request: request_body,
            response: response.clone(),
            elapsed_ms,
        });

        match (status, response_body) {
            (Some(status), Ok(_)) => {
                debug!(status, elapsed_ms, "provider responded");
                Ok(HttpResponse {
                    status,
                    body: response,
                })
            }
            (_, Err(e)) if e.is_timeout() => {
                Err(SendError::ConnectionFailed("request timed out".into()))
            }
            (_, Err(e)) => Err(SendError::ConnectionFailed(transport_error(&e))),
            (None, Ok(_)) => Err(SendError::Internal("response without status".into())),
        }
    }
}

/// Describes a transport failure without the request URL, which may carry credentials.
fn transport_error(e: &reqwest::Error) -> String {
    let mut source: Option<&dyn std::error::Error> = std::error::Error::source(e);
    let mut detail = None;
    while let Some(err) = source {
        detail = Some(err.to_string());
        source = err.source();
    }
    if e.is_connect() {
        format!("connection failed: {}", detail.unwrap_or_default())
    } else {
        detail.unwrap_or_else(|| "request failed".into())
    }
}

/// A provider response that arrived in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Classifies non-2xx statuses: 429 throttles, 5xx is transient, the rest fail.
    pub fn error_for_status(&self) -> Result<(), SendError> {
        match self.status {
            200..=299 => Ok(()),
            429 => Err(SendError::Throttled),
            500..=599 => Err(SendError::ConnectionFailed(format!(
                "server responded with status {}",
                self.status
            ))),
            status => Err(SendError::ResponseStatus(status)),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SendError> {
        serde_json::from_slice(&self.body).map_err(|e| SendError::ResponseUnparseable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ChannelLogType, HttpOutcome};
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(&HttpConfig::default()).unwrap()
    }

    fn clog() -> ChannelLog {
        ChannelLog::new(ChannelLogType::MsgSend, None, &["s3cret".to_string()])
    }

    #[test]
    fn status_classification() {
        let response = |status| HttpResponse { status, body: Vec::new() };
        assert!(response(201).error_for_status().is_ok());
        assert!(matches!(response(429).error_for_status(), Err(SendError::Throttled)));
        assert!(response(503).error_for_status().unwrap_err().is_retryable());
        assert!(matches!(
            response(400).error_for_status(),
            Err(SendError::ResponseStatus(400))
        ));
    }

    #[tokio::test]
    async fn form_request_is_recorded_redacted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("content-type", CONTENT_TYPE_FORM))
            .and(body_string("to=%2B250788383383&key=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&server)
            .await;

        let client = client();
        let mut clog = clog();
        let builder = client
            .form(
                Method::POST,
                &format!("{}/send", server.uri()),
                &[("to", "+250788383383"), ("key", "s3cret")],
            )
            .unwrap();
        let response = client.execute(builder, &mut clog).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "OK");
        assert_eq!(clog.http_logs.len(), 1);
        let log = &clog.http_logs[0];
        assert_eq!(log.outcome, HttpOutcome::Success);
        assert!(!log.request.contains("s3cret"));
        assert!(log.request.contains("to=%2B250788383383"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connection_failure() {
        let client = client();
        let mut clog = clog();
        // Nothing listens on port 9 on loopback.
        let builder = client.request(Method::GET, "http://127.0.0.1:9/unreachable");
        let err = client.execute(builder, &mut clog).await.unwrap_err();

        assert!(matches!(err, SendError::ConnectionFailed(_)));
        assert_eq!(clog.http_logs[0].status_code, None);
        assert_eq!(clog.http_logs[0].outcome, HttpOutcome::ConnectionFailure);
    }
}
