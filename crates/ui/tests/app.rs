use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use copilot_backend::{
    BackendError, BackendResult, BoxFuture, ChatReply, ChatRequest, CopilotBackend,
    DEFAULT_MODEL_ID, Model, ReplyMetadata,
};
use copilot_session::SessionController;
use sql_copilot::settings::SettingsStore;
use sql_copilot::{CopilotApp, Flow, InputLines};
use tempfile::TempDir;
use tokio::sync::mpsc;

const ENDPOINT: &str = "http://copilot.test:8000";

#[derive(Default)]
struct ScriptedBackend {
    chat_replies: Mutex<VecDeque<BackendResult<ChatReply>>>,
    models: Mutex<Option<BackendResult<Vec<Model>>>>,
    requests: Mutex<Vec<ChatRequest>>,
    silent_health: bool,
}

impl ScriptedBackend {
    fn with_chat(self, reply: BackendResult<ChatReply>) -> Self {
        self.chat_replies.lock().unwrap().push_back(reply);
        self
    }

    fn with_models(self, models: Vec<Model>) -> Self {
        *self.models.lock().unwrap() = Some(Ok(models));
        self
    }

    /// Health checks never answer.
    fn silent(mut self) -> Self {
        self.silent_health = true;
        self
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CopilotBackend for ScriptedBackend {
    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, BackendResult<String>> {
        if self.silent_health {
            return Box::pin(std::future::pending());
        }
        Box::pin(async { Ok("Pagila copilot is up".to_string()) })
    }

    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, BackendResult<Vec<Model>>> {
        Box::pin(async move {
            self.models
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(Vec::new()))
        })
    }

    fn chat<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, BackendResult<ChatReply>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            self.chat_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatReply::new("ok")))
        })
    }
}

fn app_with(backend: &Arc<ScriptedBackend>, dir: &TempDir) -> CopilotApp<Vec<u8>> {
    let settings = SettingsStore::new(dir.path().join("settings.json"));
    let controller = SessionController::new(backend.clone(), DEFAULT_MODEL_ID);
    CopilotApp::new(controller, settings, Vec::new())
}

fn input(lines: &[&str]) -> InputLines {
    let (lines_tx, lines_rx) = mpsc::unbounded_channel();
    for line in lines {
        lines_tx.send(Ok(line.to_string())).unwrap();
    }
    lines_rx
}

fn output_of(app: CopilotApp<Vec<u8>>) -> String {
    String::from_utf8(app.into_output()).unwrap()
}

#[tokio::test]
async fn greeting_is_printed_on_start() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let mut app = app_with(&backend, &dir);

    app.run(input(&[])).await.unwrap();

    let output = output_of(app);
    assert!(output.starts_with("[assistant]\n  Hello! I am your Pagila Database Assistant."));
    assert!(output.contains("Load Free Models (type /models)"));
}

#[tokio::test]
async fn question_is_answered_before_exit() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default().with_chat(Ok(
        ChatReply::new("There are 1000 films.").with_metadata(ReplyMetadata::new("gpt-4o", 0.8)),
    )));
    let mut app = app_with(&backend, &dir);

    app.run(input(&["How many films?"])).await.unwrap();

    assert_eq!(
        backend.requests(),
        vec![ChatRequest::new("How many films?", DEFAULT_MODEL_ID)]
    );
    assert!(!app.controller().is_request_in_flight());

    let output = output_of(app);
    let question = output.find("[you]\n  How many films?").unwrap();
    let thinking = output.find("Thinking…").unwrap();
    let answer = output
        .find("[assistant]\n  There are 1000 films.\n  gpt-4o • 0.8s")
        .unwrap();
    assert!(question < thinking && thinking < answer);
}

#[tokio::test]
async fn backend_failure_is_shown_with_endpoint() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default().with_chat(Err(BackendError::Status {
        stage: "test-status",
        status: 500,
        detail: Some("relation \"films\" does not exist".to_string()),
    })));
    let mut app = app_with(&backend, &dir);

    app.run(input(&["List the films"])).await.unwrap();

    let output = output_of(app);
    assert!(output.contains(
        "Error: relation \"films\" does not exist. Please ensure the backend is running on http://copilot.test:8000."
    ));
}

#[tokio::test]
async fn quit_stops_reading_input() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let mut app = app_with(&backend, &dir);

    app.run(input(&["/quit", "never sent"])).await.unwrap();

    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn models_can_be_loaded_selected_and_saved() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default().with_models(vec![
        Model::new("openai/gpt-4o", "GPT-4o"),
        Model::from_id("meta/llama-3-8b"),
    ]));
    let mut app = app_with(&backend, &dir);

    app.run(input(&["/models"])).await.unwrap();
    assert_eq!(app.controller().models().len(), 2);
    assert_eq!(app.controller().selected_model_id(), "openai/gpt-4o");

    assert_eq!(
        app.handle_line("/model meta/llama-3-8b").await.unwrap(),
        Flow::Continue
    );
    assert_eq!(app.controller().selected_model_id(), "meta/llama-3-8b");
    app.handle_line("/model missing/model").await.unwrap();
    assert_eq!(app.controller().selected_model_id(), "meta/llama-3-8b");
    app.handle_line("/save").await.unwrap();

    let reloaded = SettingsStore::new(dir.path().join("settings.json"));
    assert_eq!(reloaded.settings().default_model, "meta/llama-3-8b");

    let output = output_of(app);
    assert!(output.contains("Loading…"));
    assert!(output.contains("* GPT-4o (openai/gpt-4o)\n  meta/llama-3-8b"));
    assert!(output.contains("Using meta/llama-3-8b."));
    assert!(output.contains("No model with id missing/model."));
    assert!(output.contains("Saved meta/llama-3-8b as the default model."));
}

#[tokio::test]
async fn status_reports_backend_health() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let mut app = app_with(&backend, &dir);

    app.handle_line("/status").await.unwrap();
    app.run(input(&["How many actors?"])).await.unwrap();
    app.handle_line("/status").await.unwrap();

    let output = output_of(app);
    assert!(output.contains("endpoint: http://copilot.test:8000 (reachable: Pagila copilot is up)"));
    assert!(output.contains("request: idle"));
    let first = output.find("last reply: none yet").unwrap();
    let second = output.find("last reply: answered").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn status_reports_failed_last_reply() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default().with_chat(Err(BackendError::Status {
        stage: "test-status",
        status: 503,
        detail: None,
    })));
    let mut app = app_with(&backend, &dir);

    app.run(input(&["How many rentals?"])).await.unwrap();
    app.handle_line("/status").await.unwrap();

    assert!(output_of(app).contains("last reply: failed (HTTP 503)"));
}

#[tokio::test(start_paused = true)]
async fn status_gives_up_on_a_silent_backend() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default().silent());
    let mut app = app_with(&backend, &dir);

    assert_eq!(app.handle_line("/status").await.unwrap(), Flow::Continue);
    assert_eq!(app.handle_line("/quit").await.unwrap(), Flow::Quit);

    let output = output_of(app);
    assert!(output.contains("(unreachable: no answer within 5s)"));
}

#[tokio::test]
async fn blank_line_without_draft_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let mut app = app_with(&backend, &dir);

    app.run(input(&["", "   "])).await.unwrap();

    assert!(backend.requests().is_empty());
    assert_eq!(app.controller().messages().len(), 1);
}
