#![deny(unsafe_code)]

//! Terminal front end for the SQL copilot backend.

pub mod app;
/// Pure text rendering of session state.
pub mod render;
/// Settings persistence: defaults, settings file and environment overrides.
pub mod settings;

pub use app::{AppError, AppResult, Command, CopilotApp, Flow, InputLines, spawn_stdin_reader};
