//! Wire client for the SQL copilot backend: `GET /`, `GET /models` and `POST /chat`.

use std::sync::Arc;

mod client;
mod http;
mod model;

pub use client::{
    BackendConfig, BackendError, BackendResult, BoxFuture, ChatReply, ChatRequest,
    CopilotBackend, GENERIC_FAILURE_DETAIL, ReplyMetadata, parse_chat_reply, parse_error_detail,
};
pub use http::HttpBackend;
pub use model::{DEFAULT_MODEL_ID, Model, parse_model_list};

/// Base URL used when nothing is configured.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";

pub fn create_backend(config: BackendConfig) -> BackendResult<Arc<dyn CopilotBackend>> {
    let config = if config.endpoint.is_empty() {
        BackendConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            ..config
        }
    } else {
        config
    };

    tracing::info!(endpoint = %config.endpoint, "creating HTTP backend client");
    Ok(Arc::new(HttpBackend::new(config)?))
}
