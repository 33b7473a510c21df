use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create config directory: {0}")]
    CreateDir(std::io::Error),
}

/// External-tool invocation errors
///
/// Internal to the transfer client; converted into outcome status codes at
/// the client boundary so they never cross into the presenters.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to spawn '{tool}': {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("Tool I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse tool output: {0}")]
    Parse(String),
}
