use sql_copilot::app::{AppError, CopilotApp, spawn_stdin_reader};
use sql_copilot::settings::SettingsStore;
use tracing_subscriber::EnvFilter;

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Stdout belongs to the conversation; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let settings = SettingsStore::load();
    tracing::info!(path = ?settings.config_path(), "settings loaded");

    let mut app = CopilotApp::from_settings(settings)?;
    app.run(spawn_stdin_reader()).await
}
