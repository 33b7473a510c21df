//! Connection parameters for one remote session

use std::path::PathBuf;

use secrecy::SecretString;
use uuid::Uuid;

/// Connection and authentication data for one remote host.
///
/// Credentials are replaceable: an authentication retry updates the
/// username/password held by the owning browser presenter before the
/// listing is re-issued.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    /// Display name, e.g. "build-box"
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<SecretString>,
    pub identity_file: Option<PathBuf>,
}

impl SessionInfo {
    pub fn new(name: impl Into<String>, host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            host: host.into(),
            port: 22,
            username: username.into(),
            password: None,
            identity_file: None,
        }
    }

    /// "user@host" form used on tool command lines
    pub fn user_at_host(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}
