use std::error::Error as StdError;

use futures::FutureExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use super::client::{
    BackendConfig, BackendError, BackendResult, BoxFuture, BuildClientSnafu, ChatReply,
    ChatRequest, CopilotBackend, MalformedBodySnafu, StatusSnafu, TransportSnafu,
    parse_chat_reply, parse_error_detail,
};
use super::model::{Model, parse_model_list};

/// `CopilotBackend` over plain HTTP/JSON.
pub struct HttpBackend {
    config: BackendConfig,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|source| {
            BuildClientSnafu {
                stage: "build-client",
                details: describe_error(&source),
            }
            .build()
        })?;

        Ok(Self { config, client })
    }

    /// Reads the whole body, keeping the status for the caller to judge.
    async fn read_body(
        response: Response,
        stage: &'static str,
    ) -> BackendResult<(StatusCode, String)> {
        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|source| transport_error(stage, &source))?;
        Ok((status, payload))
    }

    fn ensure_success(
        status: StatusCode,
        payload: &str,
        stage: &'static str,
    ) -> BackendResult<()> {
        if status.is_success() {
            return Ok(());
        }

        let detail = parse_error_detail(payload);
        tracing::warn!(
            stage,
            status = status.as_u16(),
            detail = detail.as_deref().unwrap_or(""),
            "backend answered with an error status"
        );
        StatusSnafu {
            stage,
            status: status.as_u16(),
            detail,
        }
        .fail()
    }

    async fn fetch_banner(&self) -> BackendResult<String> {
        let response = self
            .client
            .get(self.config.url("/"))
            .send()
            .await
            .map_err(|source| transport_error("send-health-request", &source))?;
        let (status, payload) = Self::read_body(response, "read-health-response").await?;
        Self::ensure_success(status, &payload, "health-http-status")?;

        let value: Value = serde_json::from_str(&payload).map_err(|source| {
            MalformedBodySnafu {
                stage: "parse-health-response",
                details: source.to_string(),
            }
            .build()
        })?;

        match value.get("message").and_then(Value::as_str) {
            Some(message) => Ok(message.to_string()),
            None => MalformedBodySnafu {
                stage: "parse-health-message",
                details: "missing string field `message`",
            }
            .fail(),
        }
    }

    async fn fetch_models_from_backend(&self) -> BackendResult<Vec<Model>> {
        let response = self
            .client
            .get(self.config.url("/models"))
            .send()
            .await
            .map_err(|source| transport_error("send-model-request", &source))?;
        let (status, payload) = Self::read_body(response, "read-model-response").await?;
        Self::ensure_success(status, &payload, "model-http-status")?;

        let models = parse_model_list(&payload)?;
        tracing::debug!(model_count = models.len(), "fetched model catalog");
        Ok(models)
    }

    async fn send_chat(&self, request: ChatRequest) -> BackendResult<ChatReply> {
        tracing::debug!(
            model_id = %request.model,
            query_len = request.query.len(),
            "sending chat request"
        );

        let response = self
            .client
            .post(self.config.url("/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|source| transport_error("send-chat-request", &source))?;
        let (status, payload) = Self::read_body(response, "read-chat-response").await?;
        Self::ensure_success(status, &payload, "chat-http-status")?;

        parse_chat_reply(&payload)
    }
}

impl CopilotBackend for HttpBackend {
    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, BackendResult<String>> {
        self.fetch_banner().boxed()
    }

    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, BackendResult<Vec<Model>>> {
        self.fetch_models_from_backend().boxed()
    }

    fn chat<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, BackendResult<ChatReply>> {
        self.send_chat(request).boxed()
    }
}

fn transport_error(stage: &'static str, source: &reqwest::Error) -> BackendError {
    let details = describe_error(source);
    tracing::warn!(stage, error = %details, "backend transport failure");
    TransportSnafu { stage, details }.build()
}

/// Flattens an error and its sources into one line, since reqwest keeps the
/// useful part (e.g. "Connection refused") in the source chain.
fn describe_error(error: &(dyn StdError + 'static)) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !cause_text.is_empty() && !description.contains(&cause_text) {
            description.push_str(": ");
            description.push_str(&cause_text);
        }
        source = cause.source();
    }
    description
}
