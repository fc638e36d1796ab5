use copilot_backend::{BackendError, BackendResult, ChatReply, Model};
use tokio::sync::mpsc;

use crate::catalog::{CatalogOutcome, CatalogTicket};
use crate::request::{RequestId, RequestOutcome};

/// Completion posted by a network worker back to the controller's task.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    ChatCompleted(RequestId, BackendResult<ChatReply>),
    CatalogFetched(CatalogTicket, BackendResult<Vec<Model>>),
}

/// State change applied by the controller, reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// A submission settled and its assistant message is in the log.
    Reply {
        id: RequestId,
        outcome: RequestOutcome,
    },
    /// A catalog fetch settled.
    Catalog {
        ticket: CatalogTicket,
        outcome: CatalogOutcome,
    },
}

/// Delivers exactly one completion for an in-flight operation.
///
/// A worker that is dropped before calling [`CompletionGuard::complete`]
/// (panic, runtime shutdown) still reports an `Interrupted` failure, so loading
/// flags cannot stay set.
pub(crate) struct CompletionGuard<K: Copy, T> {
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    key: K,
    wrap: fn(K, BackendResult<T>) -> SessionEvent,
}

impl<K: Copy, T> CompletionGuard<K, T> {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<SessionEvent>,
        key: K,
        wrap: fn(K, BackendResult<T>) -> SessionEvent,
    ) -> Self {
        Self {
            events: Some(events),
            key,
            wrap,
        }
    }

    pub(crate) fn complete(mut self, result: BackendResult<T>) {
        self.send(result);
    }

    fn send(&mut self, result: BackendResult<T>) {
        if let Some(events) = self.events.take() {
            // The controller is gone when the receiver is closed; nothing left to update.
            let _ = events.send((self.wrap)(self.key, result));
        }
    }
}

impl<K: Copy, T> Drop for CompletionGuard<K, T> {
    fn drop(&mut self) {
        if self.events.is_some() {
            tracing::warn!("network worker ended without reporting a result");
            self.send(Err(BackendError::Interrupted {
                stage: "completion-guard-drop",
            }));
        }
    }
}
