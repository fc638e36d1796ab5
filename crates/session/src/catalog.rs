use std::collections::HashSet;

use copilot_backend::{BackendResult, Model};

use crate::message::{Message, MessageLog};

/// Appended to the log whenever a catalog fetch fails for any reason.
pub const CATALOG_FAILURE_NOTICE: &str = "I could not fetch models right now.";

/// Tags one catalog fetch so a late completion can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogTicket(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOutcome {
    /// The catalog now holds `count` models.
    Loaded { count: usize },
    /// The backend answered with no models; the catalog stays empty.
    Empty,
    /// The fetch failed and a notice was appended to the log.
    Failed,
}

/// Lazily fetched list of selectable models plus the current selection.
///
/// The catalog is either empty or a non-empty list with unique ids, and once
/// populated it is never fetched again for the rest of the session.
#[derive(Debug, Clone)]
pub struct ModelCatalogCache {
    models: Vec<Model>,
    selected_model_id: String,
    loading: Option<CatalogTicket>,
    next_ticket: u64,
}

impl ModelCatalogCache {
    pub fn new(default_model_id: impl Into<String>) -> Self {
        Self {
            models: Vec::new(),
            selected_model_id: default_model_id.into(),
            loading: None,
            next_ticket: 1,
        }
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn selected_model_id(&self) -> &str {
        &self.selected_model_id
    }

    pub fn selected_model(&self) -> Option<&Model> {
        self.find(&self.selected_model_id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        !self.models.is_empty()
    }

    /// Starts a fetch. Returns `None` while a fetch is in flight or once the
    /// catalog is populated.
    pub fn begin_load(&mut self) -> Option<CatalogTicket> {
        if let Some(active) = self.loading {
            tracing::debug!(ticket = active.0, "catalog load already in flight");
            return None;
        }
        if self.is_loaded() {
            tracing::debug!(
                model_count = self.models.len(),
                "catalog already loaded, skipping fetch"
            );
            return None;
        }

        let ticket = CatalogTicket(self.next_ticket);
        self.next_ticket += 1;
        self.loading = Some(ticket);
        Some(ticket)
    }

    /// Applies the result of the fetch identified by `ticket`.
    ///
    /// Returns `None` for a ticket that is not the active one. The loading flag
    /// is cleared for every outcome.
    pub fn finish_load(
        &mut self,
        ticket: CatalogTicket,
        result: BackendResult<Vec<Model>>,
        log: &mut MessageLog,
    ) -> Option<CatalogOutcome> {
        if self.loading != Some(ticket) {
            tracing::warn!(
                ticket = ticket.0,
                active = ?self.loading,
                "ignoring completion for inactive catalog load"
            );
            return None;
        }

        let outcome = match result {
            Ok(models) => self.replace_models(models),
            Err(error) => {
                tracing::warn!(error = %error, "model catalog fetch failed");
                log.append(Message::assistant(CATALOG_FAILURE_NOTICE));
                CatalogOutcome::Failed
            }
        };
        self.loading = None;
        Some(outcome)
    }

    /// Selects `model_id` when the catalog offers it. Unknown ids are rejected.
    pub fn select_model(&mut self, model_id: &str) -> bool {
        if self.find(model_id).is_none() {
            tracing::warn!(model_id, "rejecting selection of a model outside the catalog");
            return false;
        }

        self.selected_model_id = model_id.to_string();
        true
    }

    fn find(&self, model_id: &str) -> Option<&Model> {
        self.models.iter().find(|model| model.id == model_id)
    }

    fn replace_models(&mut self, mut models: Vec<Model>) -> CatalogOutcome {
        let mut seen = HashSet::new();
        models.retain(|model| seen.insert(model.id.clone()));

        let Some(first) = models.first() else {
            tracing::info!("backend returned an empty model catalog");
            return CatalogOutcome::Empty;
        };

        // Selection matches on id only; display names may repeat.
        if !models.iter().any(|model| model.id == self.selected_model_id) {
            tracing::info!(
                previous = %self.selected_model_id,
                selected = %first.id,
                "selected model not offered by catalog, falling back to first entry"
            );
            self.selected_model_id = first.id.clone();
        }

        let count = models.len();
        self.models = models;
        CatalogOutcome::Loaded { count }
    }
}
