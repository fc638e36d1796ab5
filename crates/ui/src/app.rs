use std::io::Write;
use std::time::Duration;

use copilot_backend::{BackendError, create_backend};
use copilot_session::{CatalogOutcome, SessionChange, SessionController};
use snafu::{ResultExt, Snafu};
use tokio::sync::mpsc;

use crate::render;
use crate::settings::{ClientSettings, SettingsStore};

/// Upper bound on the `/status` health check, which runs on the input task.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Help,
    Models,
    SelectModel(String),
    Status,
    Save,
    /// Blank line: send the retained draft, if any.
    Resubmit,
    Query(String),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Resubmit;
        }
        if !trimmed.starts_with('/') {
            return Self::Query(line.trim_end_matches(['\r', '\n']).to_string());
        }

        let (name, argument) = match trimmed.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (trimmed, ""),
        };
        match name {
            "/quit" | "/exit" => Self::Quit,
            "/help" => Self::Help,
            "/models" => Self::Models,
            "/model" if argument.is_empty() => Self::Models,
            "/model" => Self::SelectModel(argument.to_string()),
            "/status" => Self::Status,
            "/save" => Self::Save,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

pub type InputLines = mpsc::UnboundedReceiver<std::io::Result<String>>;

/// Reads stdin on a plain thread. Tokio's own stdin handle would keep the
/// runtime from shutting down while a read is pending.
pub fn spawn_stdin_reader() -> InputLines {
    let (lines_tx, lines_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let failed = line.is_err();
            if lines_tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    lines_rx
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented chat front end over a [`SessionController`].
///
/// Input lines and settled network work are handled on the same task, so the
/// controller is never touched concurrently.
pub struct CopilotApp<W> {
    controller: SessionController,
    settings: SettingsStore,
    output: W,
    rendered_messages: usize,
}

impl CopilotApp<std::io::Stdout> {
    pub fn from_settings(settings: SettingsStore) -> AppResult<Self> {
        let current = settings.settings();
        let backend = create_backend(current.to_backend_config()).context(CreateBackendSnafu {
            stage: "create-backend",
        })?;
        let controller = SessionController::new(backend, current.default_model.clone());
        Ok(Self::new(controller, settings, std::io::stdout()))
    }
}

impl<W: Write> CopilotApp<W> {
    pub fn new(controller: SessionController, settings: SettingsStore, output: W) -> Self {
        Self {
            controller,
            settings,
            output,
            rendered_messages: 0,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs until `/quit` or end of input. At end of input, work already in
    /// flight is settled and printed before returning.
    pub async fn run(&mut self, mut input: InputLines) -> AppResult<()> {
        self.print_new_messages()?;
        self.print(&render::render_models(&self.controller.snapshot()))?;
        self.print("Type /help for commands.")?;
        self.prompt()?;

        loop {
            tokio::select! {
                biased;

                Some(change) = self.controller.next_change(), if self.controller.has_work_in_flight() => {
                    self.handle_change(change)?;
                    self.prompt()?;
                }
                line = input.recv() => {
                    let Some(line) = line else {
                        break;
                    };
                    let line = line.context(ReadInputSnafu { stage: "read-input-line" })?;
                    if self.handle_line(&line).await? == Flow::Quit {
                        return Ok(());
                    }
                    self.prompt()?;
                }
            }
        }

        while let Some(change) = self.controller.next_change().await {
            self.handle_change(change)?;
        }
        Ok(())
    }

    pub async fn handle_line(&mut self, line: &str) -> AppResult<Flow> {
        match Command::parse(line) {
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => self.print(render::HELP)?,
            Command::Models => self.show_models()?,
            Command::SelectModel(model_id) => self.select_model(&model_id)?,
            Command::Status => self.show_status().await?,
            Command::Save => self.save_default_model()?,
            Command::Resubmit => {
                if !self.controller.draft().trim().is_empty() {
                    self.submit()?;
                }
            }
            Command::Query(text) => {
                self.controller.update_draft(text);
                self.submit()?;
            }
            Command::Unknown(name) => {
                self.print(&format!("Unknown command {name}. Type /help for commands."))?
            }
        }
        Ok(Flow::Continue)
    }

    pub fn handle_change(&mut self, change: SessionChange) -> AppResult<()> {
        match change {
            SessionChange::Reply { id, outcome } => {
                tracing::debug!(request = id.0, ?outcome, "reply settled");
                self.print_new_messages()
            }
            SessionChange::Catalog { outcome, .. } => match outcome {
                CatalogOutcome::Loaded { .. } => {
                    self.print(&render::render_models(&self.controller.snapshot()))
                }
                CatalogOutcome::Empty => {
                    self.print("The backend offered no models. Type /models to try again.")
                }
                CatalogOutcome::Failed => self.print_new_messages(),
            },
        }
    }

    fn submit(&mut self) -> AppResult<()> {
        if self.controller.submit_draft() {
            self.print_new_messages()?;
            return self.print(render::THINKING_INDICATOR);
        }
        if self.controller.is_request_in_flight() {
            self.print("Still waiting for the previous answer. Press Enter to send this one once it arrives.")?;
        }
        Ok(())
    }

    fn show_models(&mut self) -> AppResult<()> {
        self.controller.load_models();
        self.print(&render::render_models(&self.controller.snapshot()))
    }

    fn select_model(&mut self, model_id: &str) -> AppResult<()> {
        if self.controller.select_model(model_id) {
            let label = self
                .controller
                .selected_model()
                .map(|model| model.display_name().to_string())
                .unwrap_or_else(|| model_id.to_string());
            return self.print(&format!("Using {label}."));
        }

        if self.controller.models().is_empty() {
            self.print("No models loaded yet. Type /models to load them.")
        } else {
            self.print(&format!("No model with id {model_id}. Type /models to list them."))
        }
    }

    async fn show_status(&mut self) -> AppResult<()> {
        let probe = self.controller.backend().health();
        let health = match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe).await {
            Ok(Ok(message)) if message.is_empty() => "reachable".to_string(),
            Ok(Ok(message)) => format!("reachable: {message}"),
            Ok(Err(error)) => format!("unreachable: {}", error.user_detail()),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = HEALTH_CHECK_TIMEOUT.as_secs(),
                    "health check timed out"
                );
                format!(
                    "unreachable: no answer within {}s",
                    HEALTH_CHECK_TIMEOUT.as_secs()
                )
            }
        };
        let status = render::render_status(
            &self.controller.snapshot(),
            self.controller.endpoint(),
            &health,
        );
        self.print(&status)?;
        self.print(&format!("settings: {:?}", self.settings.config_path()))
    }

    fn save_default_model(&mut self) -> AppResult<()> {
        let updated = ClientSettings {
            default_model: self.controller.selected_model_id().to_string(),
            ..(*self.settings.settings()).clone()
        };

        match self.settings.update(updated) {
            Ok(()) => self.print(&format!(
                "Saved {} as the default model.",
                self.controller.selected_model_id()
            )),
            Err(error) => {
                tracing::error!(%error, "failed to save settings");
                self.print(&format!("Could not save settings: {error}"))
            }
        }
    }

    fn print_new_messages(&mut self) -> AppResult<()> {
        let messages = self.controller.messages();
        let start = self.rendered_messages.min(messages.len());
        let blocks: Vec<String> = messages[start..].iter().map(render::render_message).collect();
        self.rendered_messages = messages.len();

        for block in blocks {
            self.print(&block)?;
        }
        Ok(())
    }

    fn print(&mut self, text: &str) -> AppResult<()> {
        writeln!(self.output, "{text}").context(WriteOutputSnafu {
            stage: "write-output",
        })
    }

    fn prompt(&mut self) -> AppResult<()> {
        write!(self.output, "{}", render::PROMPT)
            .and_then(|()| self.output.flush())
            .context(WriteOutputSnafu {
                stage: "write-prompt",
            })
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to create backend client on `{stage}`: {source}"))]
    CreateBackend {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;
