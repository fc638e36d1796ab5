use copilot_backend::{BackendError, BackendResult, ChatReply, ChatRequest};

use crate::message::{Message, MessageLog};

/// Identifies one submission; changes on every submit so late completions can
/// be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Submitting(RequestId),
}

/// How a submission ended. Every variant has already appended exactly one
/// assistant message by the time it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Succeeded,
    HttpFailure { status: u16 },
    TransportFailure,
    MalformedResponse,
    Interrupted,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    fn from_error(error: &BackendError) -> Self {
        match error {
            BackendError::Status { status, .. } => Self::HttpFailure { status: *status },
            BackendError::Transport { .. } | BackendError::BuildClient { .. } => {
                Self::TransportFailure
            }
            BackendError::MalformedBody { .. } => Self::MalformedResponse,
            BackendError::Interrupted { .. } => Self::Interrupted,
        }
    }
}

/// Rejection reason for illegal lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRejection {
    EmptyQuery,
    AlreadySubmitting { active: RequestId },
    NoActiveRequest,
    RequestMismatch {
        active: RequestId,
        attempted: RequestId,
    },
}

/// A submission that has entered `Submitting` and still needs its network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    pub id: RequestId,
    pub request: ChatRequest,
}

/// Formats the assistant message used for every failed submission.
pub fn failure_message(detail: &str, endpoint: &str) -> String {
    format!("Error: {detail}. Please ensure the backend is running on {endpoint}.")
}

/// Single in-flight request discipline: `Idle -> Submitting -> Idle`, with the
/// terminal outcome recorded as a log append.
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    endpoint: String,
    state: RequestState,
    next_id: u64,
    last_outcome: Option<RequestOutcome>,
}

impl RequestLifecycle {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: RequestState::Idle,
            next_id: 1,
            last_outcome: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, RequestState::Submitting(_))
    }

    pub fn last_outcome(&self) -> Option<RequestOutcome> {
        self.last_outcome
    }

    /// Appends the user message and enters `Submitting`.
    ///
    /// The message content is the query exactly as typed; only the emptiness
    /// check trims it.
    pub fn begin(
        &mut self,
        query: impl Into<String>,
        model_id: impl Into<String>,
        log: &mut MessageLog,
    ) -> Result<PendingSubmission, RequestRejection> {
        if let RequestState::Submitting(active) = self.state {
            return Err(RequestRejection::AlreadySubmitting { active });
        }

        let query = query.into();
        if query.trim().is_empty() {
            return Err(RequestRejection::EmptyQuery);
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;

        log.append(Message::user(query.clone()));
        self.state = RequestState::Submitting(id);

        let request = ChatRequest::new(query, model_id);
        tracing::info!(
            request_id = id.0,
            model_id = %request.model,
            "submitting query"
        );
        Ok(PendingSubmission { id, request })
    }

    /// Records the outcome of request `id` as exactly one assistant message and
    /// returns to `Idle`.
    pub fn finish(
        &mut self,
        id: RequestId,
        result: BackendResult<ChatReply>,
        log: &mut MessageLog,
    ) -> Result<RequestOutcome, RequestRejection> {
        match self.state {
            RequestState::Submitting(active) if active == id => {}
            RequestState::Submitting(active) => {
                return Err(RequestRejection::RequestMismatch {
                    active,
                    attempted: id,
                });
            }
            RequestState::Idle => return Err(RequestRejection::NoActiveRequest),
        }

        let outcome = match result {
            Ok(reply) => {
                log.append(Message::assistant_reply(reply.response, reply.metadata));
                RequestOutcome::Succeeded
            }
            Err(error) => {
                tracing::warn!(request_id = id.0, error = %error, "query failed");
                log.append(Message::assistant(failure_message(
                    &error.user_detail(),
                    &self.endpoint,
                )));
                RequestOutcome::from_error(&error)
            }
        };

        self.state = RequestState::Idle;
        self.last_outcome = Some(outcome);
        tracing::debug!(request_id = id.0, ?outcome, "request settled");
        Ok(outcome)
    }
}
