//! Outbound HTTP and alert-sending seams
//!
//! Channels only need "POST a JSON body, 2xx means success", so the
//! transport trait is deliberately that narrow.

use crate::alert::{AlertDeliveryResult, AlertPayload};
use crate::error::TransportError;
use std::sync::Arc;
use std::time::Duration;

/// JSON POST request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl HttpRequest {
    /// POST `body` to `url`
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// Add header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response status as seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
}

impl HttpResponse {
    /// 2xx
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 4xx
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// 5xx
    #[inline]
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// POST-JSON transport
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    /// Send one request; `timeout` is a hint for transports that can apply it natively
    async fn post(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// Shared transport handle
pub type SharedTransport = Arc<dyn HttpTransport>;

/// Alert fan-out capability, implemented by the dispatcher
#[async_trait::async_trait]
pub trait AlertSender: Send + Sync {
    /// Deliver across the severity's channel set; never fails
    async fn send_alert(&self, payload: AlertPayload) -> AlertDeliveryResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert!(HttpResponse { status: 204 }.is_success());
        assert!(!HttpResponse { status: 302 }.is_success());
        assert!(HttpResponse { status: 404 }.is_client_error());
        assert!(!HttpResponse { status: 503 }.is_client_error());
        assert!(HttpResponse { status: 503 }.is_server_error());
        assert!(!HttpResponse { status: 302 }.is_server_error());
    }
}
