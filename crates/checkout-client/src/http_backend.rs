//! # HTTP Checkout Backend
//!
//! POSTs the full checkout payload to one session-creation endpoint and
//! classifies the outcome. The primary and secondary (mirror) steps of
//! the fallback chain are two instances of this type pointed at
//! different URLs — identical payload, identical validation.

use checkout_core::{
    CheckoutBackend, CheckoutError, CheckoutPayload, CheckoutResult, RedirectTarget,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

/// Session-creation response shape expected from our endpoints
#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "redirectUrl")]
    redirect_url: String,
}

/// Structured error body our endpoints emit on 4xx
#[derive(Debug, Deserialize)]
struct EndpointError {
    message: String,
    #[serde(default)]
    #[allow(dead_code)]
    code: Option<u16>,
}

/// One of our own session-creation endpoints
pub struct HttpCheckoutBackend {
    name: String,
    endpoint: String,
    client: Client,
}

impl HttpCheckoutBackend {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client,
        }
    }
}

/// A degraded backend often answers 200 with an error page. Markup is
/// never a valid session response, so it must be caught before any JSON
/// parse is attempted.
pub(crate) fn looks_like_markup(body: &str) -> bool {
    // A JSON session response can never open with '<'; doctype, html and
    // stray tags all do.
    body.trim_start().starts_with('<')
}

/// Classify a response body + status into a redirect target or an error.
///
/// Shared by the endpoint backends and the emergency probe so every step
/// of the chain applies the same rules:
/// - markup body -> retryable `MalformedResponse`, regardless of status
/// - 2xx JSON missing the session fields -> retryable `MalformedResponse`
/// - 4xx with a structured body -> terminal `InvalidRequest`
/// - 4xx without one -> retryable `MalformedResponse`
/// - 5xx -> retryable `UpstreamUnavailable`
pub(crate) fn classify_response(
    backend: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> CheckoutResult<RedirectTarget> {
    if looks_like_markup(body) {
        return Err(CheckoutError::MalformedResponse {
            backend: backend.to_string(),
            message: format!("markup body with HTTP {}", status.as_u16()),
        });
    }

    if status.is_success() {
        return match serde_json::from_str::<SessionResponse>(body) {
            Ok(session) if !session.session_id.is_empty() => Ok(RedirectTarget {
                session_id: Some(session.session_id),
                redirect_url: session.redirect_url,
            }),
            Ok(_) => Err(CheckoutError::MalformedResponse {
                backend: backend.to_string(),
                message: "success response with empty session identifier".to_string(),
            }),
            Err(e) => Err(CheckoutError::MalformedResponse {
                backend: backend.to_string(),
                message: format!("success response missing session fields: {}", e),
            }),
        };
    }

    if status.is_client_error() {
        return match serde_json::from_str::<EndpointError>(body) {
            Ok(err) => Err(CheckoutError::InvalidRequest(err.message)),
            Err(_) => Err(CheckoutError::MalformedResponse {
                backend: backend.to_string(),
                message: format!("unparsable HTTP {} body", status.as_u16()),
            }),
        };
    }

    Err(CheckoutError::UpstreamUnavailable {
        backend: backend.to_string(),
        message: format!("HTTP {}", status.as_u16()),
    })
}

#[async_trait::async_trait]
impl CheckoutBackend for HttpCheckoutBackend {
    #[instrument(skip(self, payload), fields(backend = %self.name, items = payload.line_items.len()))]
    async fn attempt(&self, payload: &CheckoutPayload) -> CheckoutResult<RedirectTarget> {
        debug!("POST {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| CheckoutError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CheckoutError::Network(e.to_string()))?;

        let result = classify_response(&self.name, status, &body);
        if let Err(e) = &result {
            warn!("{} failed: {}", self.name, e);
        }
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_markup_detection() {
        assert!(looks_like_markup("<!DOCTYPE html><html>..."));
        assert!(looks_like_markup("  <html><body>maintenance</body>"));
        assert!(looks_like_markup("<br>oops"));
        assert!(!looks_like_markup("{\"sessionId\":\"cks_1\"}"));
        assert!(!looks_like_markup("plain text error"));
    }

    #[test]
    fn test_markup_with_200_is_retryable() {
        let err = classify_response("primary", StatusCode::OK, "<html>down</html>").unwrap_err();
        assert!(matches!(err, CheckoutError::MalformedResponse { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_success_parses_session() {
        let target = classify_response(
            "primary",
            StatusCode::OK,
            r#"{"sessionId":"cks_1","redirectUrl":"https://pay.test/pay/cks_1"}"#,
        )
        .unwrap();
        assert_eq!(target.session_id.as_deref(), Some("cks_1"));
    }

    #[test]
    fn test_success_missing_session_field_is_retryable() {
        let err =
            classify_response("primary", StatusCode::OK, r#"{"ok":true}"#).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_structured_4xx_is_terminal() {
        let err = classify_response(
            "primary",
            StatusCode::BAD_REQUEST,
            r#"{"message":"malformed cart","code":400}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidRequest(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unstructured_4xx_is_retryable() {
        let err =
            classify_response("primary", StatusCode::BAD_REQUEST, "Bad Request").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_5xx_is_retryable() {
        let err = classify_response(
            "primary",
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"message":"overloaded"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CheckoutError::UpstreamUnavailable { .. }));
        assert!(err.is_retryable());
    }
}
