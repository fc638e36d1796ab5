//! Plain-text rendering of session state. Everything here is a pure function
//! of a [`SessionSnapshot`] or one of its parts.

use copilot_backend::{Model, ReplyMetadata};
use copilot_session::{Message, RequestOutcome, Role, SessionSnapshot};

pub const THINKING_INDICATOR: &str = "Thinking…";
pub const LOADING_MODELS: &str = "Loading…";
pub const LOAD_MODELS_HINT: &str = "Load Free Models (type /models)";
pub const PROMPT: &str = "> ";

pub const HELP: &str = "\
Type a question and press Enter to ask the assistant.
  /models        load the model catalog, or list it once loaded
  /model <id>    switch the model used for the next question
  /status        show the backend endpoint, its health and the session state
  /save          remember the selected model as the default
  /help          show this help
  /quit          leave
An empty line resends a draft that could not be sent yet.";

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "assistant",
    }
}

pub fn render_metadata(metadata: &ReplyMetadata) -> String {
    format!("{} • {}s", metadata.model, metadata.duration)
}

pub fn render_message(message: &Message) -> String {
    let mut out = format!("[{}]", role_label(message.role));
    for line in message.content.lines() {
        out.push_str("\n  ");
        out.push_str(line);
    }
    if let Some(metadata) = &message.metadata {
        out.push_str("\n  ");
        out.push_str(&render_metadata(metadata));
    }
    out
}

pub fn render_transcript(snapshot: &SessionSnapshot) -> String {
    let mut blocks: Vec<String> = snapshot.messages.iter().map(render_message).collect();
    if snapshot.is_request_in_flight {
        blocks.push(THINKING_INDICATOR.to_string());
    }
    blocks.join("\n\n")
}

fn render_model_entry(model: &Model, selected_model_id: &str) -> String {
    let marker = if model.id == selected_model_id { '*' } else { ' ' };
    let name = model.display_name();
    if name == model.id {
        format!("{marker} {}", model.id)
    } else {
        format!("{marker} {name} ({})", model.id)
    }
}

/// The model picker: a load hint until the catalog is populated, then one
/// line per model with the selection marked.
pub fn render_models(snapshot: &SessionSnapshot) -> String {
    if snapshot.models.is_empty() {
        return if snapshot.is_catalog_loading {
            LOADING_MODELS.to_string()
        } else {
            format!("{LOAD_MODELS_HINT}\nusing {}", snapshot.selected_model_id)
        };
    }

    snapshot
        .models
        .iter()
        .map(|model| render_model_entry(model, &snapshot.selected_model_id))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_outcome(outcome: Option<RequestOutcome>) -> String {
    match outcome {
        None => "none yet".to_string(),
        Some(outcome) if outcome.is_success() => "answered".to_string(),
        Some(RequestOutcome::HttpFailure { status }) => format!("failed (HTTP {status})"),
        Some(RequestOutcome::TransportFailure) => "failed (backend unreachable)".to_string(),
        Some(RequestOutcome::MalformedResponse) => "failed (malformed response)".to_string(),
        Some(_) => "failed (interrupted)".to_string(),
    }
}

pub fn render_status(snapshot: &SessionSnapshot, endpoint: &str, health: &str) -> String {
    let request = if snapshot.is_request_in_flight {
        "waiting for a reply"
    } else {
        "idle"
    };
    let catalog = if snapshot.is_catalog_loading {
        "loading".to_string()
    } else if snapshot.models.is_empty() {
        "not loaded".to_string()
    } else {
        format!("{} models", snapshot.models.len())
    };

    format!(
        "endpoint: {endpoint} ({health})\nmodel: {}\nrequest: {request}\nlast reply: {}\ncatalog: {catalog}\nmessages: {}",
        snapshot.selected_model_id,
        render_outcome(snapshot.last_outcome),
        snapshot.messages.len()
    )
}
