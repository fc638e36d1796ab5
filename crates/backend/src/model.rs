use serde_json::Value;

use crate::client::{BackendResult, MalformedBodySnafu};

/// Model the backend falls back to when the caller does not pick one.
pub const DEFAULT_MODEL_ID: &str = "mistralai/mistral-7b-instruct:free";

/// One selectable inference model as advertised by `GET /models`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// Stable identifier sent on the wire with every query.
    pub id: String,
    /// Optional display label.
    pub name: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Label shown in pickers; falls back to the id when no name was provided.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Decodes a `/models` payload.
///
/// Only a body that is not JSON at all is an error. A missing or non-array
/// `models` field decodes to an empty list, and entries without a string `id`
/// are skipped.
pub fn parse_model_list(payload: &str) -> BackendResult<Vec<Model>> {
    let value: Value = serde_json::from_str(payload).map_err(|source| {
        MalformedBodySnafu {
            stage: "parse-model-list",
            details: source.to_string(),
        }
        .build()
    })?;

    let Some(entries) = value.get("models").and_then(Value::as_array) else {
        tracing::debug!("model payload has no `models` array, treating as empty");
        return Ok(Vec::new());
    };

    Ok(entries.iter().filter_map(model_from_entry).collect())
}

fn model_from_entry(entry: &Value) -> Option<Model> {
    let id = entry.get("id").and_then(Value::as_str)?;
    if id.trim().is_empty() {
        return None;
    }

    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Some(Model {
        id: id.to_string(),
        name,
    })
}
