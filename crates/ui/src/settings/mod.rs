pub mod state;

pub use state::{ClientSettings, ENV_PREFIX, SettingsError, SettingsStore};
