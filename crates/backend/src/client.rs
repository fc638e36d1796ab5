use std::time::Duration;

pub use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::Snafu;

use super::model::Model;

/// Detail used whenever a failure carries nothing more specific.
pub const GENERIC_FAILURE_DETAIL: &str = "Request failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL without a trailing slash, e.g. `http://127.0.0.1:8000`.
    pub endpoint: String,
    /// Transport-level timeout applied to every call. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl BackendConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: normalize_endpoint(&endpoint.into()),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }
}

fn normalize_endpoint(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub query: String,
    pub model: String,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: model.into(),
        }
    }
}

/// Which model answered and how long the backend took, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyMetadata {
    pub model: String,
    pub duration: f64,
}

impl ReplyMetadata {
    pub fn new(model: impl Into<String>, duration: f64) -> Self {
        Self {
            model: model.into(),
            duration,
        }
    }
}

/// Decoded success body of `POST /chat`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub response: String,
    pub metadata: Option<ReplyMetadata>,
}

impl ChatReply {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ReplyMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Decodes a 2xx `/chat` body. A body without a string `response` is malformed;
/// a missing or undecodable `metadata` object is dropped.
pub fn parse_chat_reply(payload: &str) -> BackendResult<ChatReply> {
    let value: Value = serde_json::from_str(payload).map_err(|source| {
        MalformedBodySnafu {
            stage: "parse-chat-reply",
            details: source.to_string(),
        }
        .build()
    })?;

    let Some(response) = value.get("response").and_then(Value::as_str) else {
        return MalformedBodySnafu {
            stage: "parse-chat-reply-response",
            details: "missing string field `response`",
        }
        .fail();
    };

    let metadata = value
        .get("metadata")
        .filter(|metadata| !metadata.is_null())
        .and_then(|metadata| {
            serde_json::from_value::<ReplyMetadata>(metadata.clone())
                .inspect_err(|error| {
                    tracing::debug!(error = %error, "dropping undecodable reply metadata");
                })
                .ok()
        });

    Ok(ChatReply {
        response: response.to_string(),
        metadata,
    })
}

/// Extracts `detail` from an error body when it is a non-empty string.
pub fn parse_error_detail(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value
        .get("detail")
        .and_then(Value::as_str)
        .filter(|detail| !detail.trim().is_empty())
        .map(str::to_string)
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("failed to build HTTP client on `{stage}`: {details}"))]
    BuildClient { stage: &'static str, details: String },
    #[snafu(display("transport failed on `{stage}`: {details}"))]
    Transport { stage: &'static str, details: String },
    #[snafu(display("backend returned status {status} on `{stage}`"))]
    Status {
        stage: &'static str,
        status: u16,
        detail: Option<String>,
    },
    #[snafu(display("malformed response body on `{stage}`: {details}"))]
    MalformedBody { stage: &'static str, details: String },
    #[snafu(display("request on `{stage}` was interrupted before a response arrived"))]
    Interrupted { stage: &'static str },
}

impl BackendError {
    /// Human-readable detail suitable for the chat transcript.
    pub fn user_detail(&self) -> String {
        match self {
            Self::BuildClient { details, .. } | Self::Transport { details, .. }
                if !details.trim().is_empty() =>
            {
                details.clone()
            }
            Self::Status {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.clone(),
            _ => GENERIC_FAILURE_DETAIL.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client side of the SQL copilot backend.
pub trait CopilotBackend: Send + Sync {
    /// Base URL the backend is reached on.
    fn endpoint(&self) -> &str;
    /// `GET /`; returns the backend's banner message.
    fn health<'a>(&'a self) -> BoxFuture<'a, BackendResult<String>>;
    /// `GET /models`.
    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, BackendResult<Vec<Model>>>;
    /// `POST /chat`.
    fn chat<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, BackendResult<ChatReply>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_trimmed() {
        let config = BackendConfig::new(" http://127.0.0.1:8000/ ");
        assert_eq!(config.endpoint, "http://127.0.0.1:8000");
        assert_eq!(config.url("/chat"), "http://127.0.0.1:8000/chat");
        assert_eq!(config.url("models"), "http://127.0.0.1:8000/models");
    }

    #[test]
    fn chat_reply_keeps_metadata() {
        let reply =
            parse_chat_reply(r#"{"response":"42 films","metadata":{"model":"x","duration":1.2}}"#)
                .unwrap();

        assert_eq!(
            reply,
            ChatReply::new("42 films").with_metadata(ReplyMetadata::new("x", 1.2))
        );
    }

    #[test]
    fn chat_reply_drops_undecodable_metadata() {
        let reply = parse_chat_reply(r#"{"response":"ok","metadata":{"model":3}}"#).unwrap();
        assert_eq!(reply, ChatReply::new("ok"));

        let reply = parse_chat_reply(r#"{"response":"ok","metadata":null}"#).unwrap();
        assert_eq!(reply.metadata, None);
    }

    #[test]
    fn chat_reply_without_response_is_malformed() {
        for payload in [r#"{"metadata":{}}"#, r#"{"response":null}"#, "not json"] {
            let error = parse_chat_reply(payload).unwrap_err();
            assert!(
                matches!(error, BackendError::MalformedBody { .. }),
                "{payload}"
            );
            assert_eq!(error.user_detail(), GENERIC_FAILURE_DETAIL);
        }
    }

    #[test]
    fn error_detail_requires_non_empty_string() {
        assert_eq!(
            parse_error_detail(r#"{"detail":"db down"}"#),
            Some("db down".to_string())
        );
        assert_eq!(parse_error_detail(r#"{"detail":""}"#), None);
        assert_eq!(
            parse_error_detail(r#"{"detail":[{"loc":["body","query"]}]}"#),
            None
        );
        assert_eq!(parse_error_detail("Internal Server Error"), None);
    }

    #[test]
    fn user_detail_prefers_specific_text() {
        let status = BackendError::Status {
            stage: "test",
            status: 500,
            detail: Some("db down".to_string()),
        };
        assert_eq!(status.user_detail(), "db down");
        assert_eq!(status.status(), Some(500));

        let bare_status = BackendError::Status {
            stage: "test",
            status: 502,
            detail: None,
        };
        assert_eq!(bare_status.user_detail(), GENERIC_FAILURE_DETAIL);

        let transport = BackendError::Transport {
            stage: "test",
            details: "connection refused".to_string(),
        };
        assert_eq!(transport.user_detail(), "connection refused");
        assert_eq!(transport.status(), None);

        let silent = BackendError::Transport {
            stage: "test",
            details: String::new(),
        };
        assert_eq!(silent.user_detail(), GENERIC_FAILURE_DETAIL);

        let interrupted = BackendError::Interrupted { stage: "test" };
        assert_eq!(interrupted.user_detail(), GENERIC_FAILURE_DETAIL);
    }
}
