//! reqwest-backed transport

use ccm_core::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// `HttpTransport` over a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create transport with a default client
    ///
    /// # Errors
    /// `TransportError::InvalidRequest` if the client cannot be built
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ccm-alert/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn headers(request: &HttpRequest) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(&request.url)
            .headers(headers(request)?)
            .json(&request.body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }
                } else if e.is_builder() {
                    TransportError::InvalidRequest(e.to_string())
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        Ok(HttpResponse {
            status: response.status().as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_header_names() {
        let request = HttpRequest::post_json("https://x.test", serde_json::Value::Null)
            .with_header("bad header", "v");
        assert!(matches!(
            headers(&request),
            Err(TransportError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn malformed_url_is_not_retryable() {
        let transport = ReqwestTransport::new().unwrap();
        let request = HttpRequest::post_json("not a url", serde_json::json!({}));
        let err = transport
            .post(&request, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
