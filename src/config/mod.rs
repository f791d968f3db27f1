//! Configuration module for polyquery.
//!
//! Handles the settings file, environment variable expansion, and the
//! per-type source definitions the static catalog is built from.

mod settings;

pub use settings::{expand_env_vars, CompilerSettings, Settings, SettingsError, TypeSettings};
