use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use copilot_backend::{BackendConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL_ID};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "sql-copilot";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
/// Environment variables with this prefix override the settings file,
/// e.g. `SQL_COPILOT_ENDPOINT`.
pub const ENV_PREFIX: &str = "SQL_COPILOT_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Base URL of the copilot backend.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model id sent with queries until the catalog is loaded.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Transport timeout for backend calls; unset waits indefinitely.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            default_model: default_model(),
            request_timeout_secs: None,
        }
    }
}

impl ClientSettings {
    pub fn normalized(mut self) -> Self {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        self.endpoint = if endpoint.is_empty() {
            default_endpoint()
        } else {
            endpoint.to_string()
        };

        self.default_model = if self.default_model.trim().is_empty() {
            default_model()
        } else {
            self.default_model.trim().to_string()
        };

        // A zero timeout would fail every call immediately.
        self.request_timeout_secs = self.request_timeout_secs.filter(|secs| *secs > 0);
        self
    }

    pub fn to_backend_config(&self) -> BackendConfig {
        let config = BackendConfig::new(&self.endpoint);
        match self.request_timeout_secs {
            Some(secs) => config.with_request_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".sql-copilot"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_layered(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update(&self, settings: ClientSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Defaults, then the JSON file (if present), then `SQL_COPILOT_*` variables.
    fn load_layered(path: &Path) -> ClientSettings {
        if !path.exists() {
            tracing::info!(path = ?path, "no client settings file, using defaults and environment");
        }

        let figment = Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "ignoring unreadable client settings");
                ClientSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        let path = self.config_path.as_path();
        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory).context(CreateSettingsDirSnafu {
                stage: "ensure-copilot-config-dir",
                directory: directory.to_path_buf(),
            })?;
        }

        let mut encoded = serde_json::to_vec_pretty(settings).context(EncodeSettingsSnafu {
            stage: "encode-client-settings",
        })?;
        encoded.push(b'\n');

        // Readers only ever see the old file or the complete new one.
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, &encoded).context(WriteStagingSnafu {
            stage: "write-staged-client-settings",
            staging: staging.clone(),
        })?;
        std::fs::rename(&staging, path).context(ReplaceSettingsSnafu {
            stage: "swap-in-client-settings",
            staging,
            target: path.to_path_buf(),
        })?;

        tracing::info!(
            path = ?path,
            endpoint = %settings.endpoint,
            default_model = %settings.default_model,
            "client settings saved"
        );
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("cannot create copilot config directory {directory:?} ({stage}): {source}"))]
    CreateSettingsDir {
        stage: &'static str,
        directory: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode client settings as JSON ({stage}): {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot write staged client settings to {staging:?} ({stage}): {source}"))]
    WriteStaging {
        stage: &'static str,
        staging: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "cannot move staged client settings {staging:?} over {target:?} ({stage}): {source}"
    ))]
    ReplaceSettings {
        stage: &'static str,
        staging: PathBuf,
        target: PathBuf,
        source: std::io::Error,
    },
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL_ID.to_string()
}
