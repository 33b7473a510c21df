//! External tool configuration stored in tools.toml

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "portage", "portage").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the tool config file
pub fn tools_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("tools.toml"))
}

/// Ensure the config directory exists with proper permissions
pub fn ensure_config_dir() -> std::io::Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine config directory",
        )
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        }
    }

    Ok(dir)
}

fn default_scp() -> String {
    "scp".to_string()
}

fn default_ssh() -> String {
    "ssh".to_string()
}

fn default_sshpass() -> String {
    "sshpass".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

/// Paths and options for the external copy/listing tools.
///
/// The engine never speaks a wire protocol itself; it invokes the binaries
/// named here and parses their output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Copy tool binary (OpenSSH scp compatible)
    #[serde(default = "default_scp")]
    pub scp_path: String,

    /// Remote-listing tool binary (OpenSSH ssh compatible)
    #[serde(default = "default_ssh")]
    pub ssh_path: String,

    /// Wrapper used to feed a password to the tools non-interactively
    #[serde(default = "default_sshpass")]
    pub sshpass_path: String,

    /// Extra arguments appended to every tool invocation
    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            scp_path: default_scp(),
            ssh_path: default_ssh(),
            sshpass_path: default_sshpass(),
            extra_args: Vec::new(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ToolConfig {
    /// Load from file, creating default if not exists
    pub fn load() -> Result<Self, ConfigError> {
        let path = tools_file().ok_or_else(|| ConfigError::ReadFile {
            path: PathBuf::from("tools.toml"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config file path",
            ),
        })?;

        if !path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Save to file
    pub fn save(&self) -> Result<(), ConfigError> {
        ensure_config_dir().map_err(ConfigError::CreateDir)?;

        let path = tools_file().ok_or_else(|| ConfigError::WriteFile {
            path: PathBuf::from("tools.toml"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config file path",
            ),
        })?;

        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, content).map_err(|e| ConfigError::WriteFile { path, source: e })
    }
}
