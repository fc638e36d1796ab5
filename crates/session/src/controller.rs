use std::sync::Arc;

use copilot_backend::{CopilotBackend, Model};
use tokio::sync::mpsc;

use crate::catalog::ModelCatalogCache;
use crate::events::{CompletionGuard, SessionChange, SessionEvent};
use crate::message::{Message, MessageLog};
use crate::request::{PendingSubmission, RequestLifecycle, RequestOutcome};

/// Everything the presentation layer is allowed to read.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub models: Vec<Model>,
    pub selected_model_id: String,
    pub draft: String,
    pub is_request_in_flight: bool,
    pub is_catalog_loading: bool,
    /// How the most recent submission ended; `None` before the first reply.
    pub last_outcome: Option<RequestOutcome>,
}

/// Sole owner and mutation surface of the conversation state.
///
/// Network calls run on spawned Tokio tasks that only report back through a
/// channel; their results are applied on the caller's task by
/// [`next_change`](Self::next_change), [`poll_changes`](Self::poll_changes) or
/// [`settle`](Self::settle). `submit_draft` and `load_models` must therefore be
/// called from within a Tokio runtime.
pub struct SessionController {
    backend: Arc<dyn CopilotBackend>,
    log: MessageLog,
    catalog: ModelCatalogCache,
    requests: RequestLifecycle,
    draft: String,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn CopilotBackend>, default_model_id: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let requests = RequestLifecycle::new(backend.endpoint());

        Self {
            backend,
            log: MessageLog::initialize(),
            catalog: ModelCatalogCache::new(default_model_id),
            requests,
            draft: String::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn backend(&self) -> &Arc<dyn CopilotBackend> {
        &self.backend
    }

    pub fn endpoint(&self) -> &str {
        self.requests.endpoint()
    }

    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    pub fn models(&self) -> &[Model] {
        self.catalog.models()
    }

    pub fn selected_model_id(&self) -> &str {
        self.catalog.selected_model_id()
    }

    pub fn selected_model(&self) -> Option<&Model> {
        self.catalog.selected_model()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_request_in_flight(&self) -> bool {
        self.requests.is_in_flight()
    }

    pub fn is_catalog_loading(&self) -> bool {
        self.catalog.is_loading()
    }

    pub fn has_work_in_flight(&self) -> bool {
        self.is_request_in_flight() || self.is_catalog_loading()
    }

    pub fn last_outcome(&self) -> Option<RequestOutcome> {
        self.requests.last_outcome()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.log.messages().to_vec(),
            models: self.catalog.models().to_vec(),
            selected_model_id: self.catalog.selected_model_id().to_string(),
            draft: self.draft.clone(),
            is_request_in_flight: self.is_request_in_flight(),
            is_catalog_loading: self.is_catalog_loading(),
            last_outcome: self.last_outcome(),
        }
    }

    pub fn update_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Submits the draft with the selected model.
    ///
    /// Returns `false` without touching any state when the draft is blank or a
    /// request is already in flight; the draft is kept in both cases.
    pub fn submit_draft(&mut self) -> bool {
        if self.draft.trim().is_empty() {
            return false;
        }
        if self.requests.is_in_flight() {
            tracing::debug!("submit ignored while a request is in flight");
            return false;
        }

        let model_id = self.catalog.selected_model_id().to_string();
        match self
            .requests
            .begin(self.draft.as_str(), model_id, &mut self.log)
        {
            Ok(pending) => {
                self.draft.clear();
                self.spawn_chat(pending);
                true
            }
            Err(rejection) => {
                tracing::debug!(?rejection, "submission rejected");
                false
            }
        }
    }

    /// Starts the one catalog fetch of the session. Returns `false` when a
    /// fetch is already running or the catalog is populated.
    pub fn load_models(&mut self) -> bool {
        let Some(ticket) = self.catalog.begin_load() else {
            return false;
        };

        tracing::info!(ticket = ticket.0, "loading model catalog");
        let backend = Arc::clone(&self.backend);
        let guard = CompletionGuard::new(
            self.events_tx.clone(),
            ticket,
            SessionEvent::CatalogFetched,
        );
        tokio::spawn(async move {
            let result = backend.fetch_models().await;
            guard.complete(result);
        });
        true
    }

    pub fn select_model(&mut self, model_id: &str) -> bool {
        let selected = self.catalog.select_model(model_id);
        if selected {
            tracing::info!(model_id, "model selected");
        }
        selected
    }

    /// Waits for the next in-flight operation to settle and applies it.
    ///
    /// Returns `None` right away when nothing is in flight.
    pub async fn next_change(&mut self) -> Option<SessionChange> {
        while self.has_work_in_flight() {
            let event = self.events_rx.recv().await?;
            if let Some(change) = self.apply(event) {
                return Some(change);
            }
        }
        None
    }

    /// Applies every completion that has already arrived, without waiting.
    pub fn poll_changes(&mut self) -> Vec<SessionChange> {
        let mut changes = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            changes.extend(self.apply(event));
        }
        changes
    }

    /// Applies completions until nothing is in flight.
    pub async fn settle(&mut self) -> Vec<SessionChange> {
        let mut changes = Vec::new();
        while let Some(change) = self.next_change().await {
            changes.push(change);
        }
        changes
    }

    fn spawn_chat(&self, pending: PendingSubmission) {
        let backend = Arc::clone(&self.backend);
        let guard = CompletionGuard::new(
            self.events_tx.clone(),
            pending.id,
            SessionEvent::ChatCompleted,
        );
        tokio::spawn(async move {
            let result = backend.chat(pending.request).await;
            guard.complete(result);
        });
    }

    fn apply(&mut self, event: SessionEvent) -> Option<SessionChange> {
        match event {
            SessionEvent::ChatCompleted(id, result) => {
                match self.requests.finish(id, result, &mut self.log) {
                    Ok(outcome) => Some(SessionChange::Reply { id, outcome }),
                    Err(rejection) => {
                        tracing::warn!(?rejection, "dropping completion for inactive request");
                        None
                    }
                }
            }
            SessionEvent::CatalogFetched(ticket, result) => self
                .catalog
                .finish_load(ticket, result, &mut self.log)
                .map(|outcome| SessionChange::Catalog { ticket, outcome }),
        }
    }
}
