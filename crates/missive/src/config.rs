//! SMTP session configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{OnceLock, PoisonError, RwLock};
use tracing::debug;

/// Default SMTP host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default SMTP port.
pub const DEFAULT_PORT: u16 = 25;

/// How to reach an SMTP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Domain used for generated Message-IDs.
    pub domain: Option<String>,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Upgrade with STARTTLS when the server offers it.
    pub enable_tls: bool,
    /// Fail unless STARTTLS succeeds.
    pub require_tls: bool,
    /// Connect with implicit TLS.
    pub enable_ssl: bool,
    /// Authenticate with the username and password.
    pub auth: bool,
    /// Name of a registered session to use instead of host and port.
    pub session_name: Option<String>,
    /// Connection timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            domain: None,
            username: None,
            password: None,
            enable_tls: false,
            require_tls: false,
            enable_ssl: false,
            auth: false,
            session_name: None,
            timeout_secs: None,
        }
    }
}

impl SessionConfig {
    /// Configuration for `host:port` with every toggle off.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Configuration resolving to a registered session.
    #[must_use]
    pub fn named(session_name: impl Into<String>) -> Self {
        Self {
            session_name: Some(session_name.into()),
            ..Self::default()
        }
    }

    /// Sets username and password and turns authentication on.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self.auth = true;
        self
    }

    /// Returns the registered session name, if one is set.
    #[must_use]
    pub fn session_name(&self) -> Option<&str> {
        self.session_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// A configuration is usable when it names a session, or has a host and
    /// a non-zero port.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.session_name().is_some() || (!self.host.trim().is_empty() && self.port > 0)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the
    /// configuration is not valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Unable to read {}: {e}", path.display()))
        })?;
        let config = Self::from_json(&text)?;
        debug!(path = %path.display(), host = %config.host, port = config.port, "Loaded session configuration");
        Ok(config)
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the configuration is not
    /// valid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if !config.is_valid() {
            return Err(Error::Config(
                "A session name, or a host and port, is required".to_string(),
            ));
        }
        Ok(config)
    }
}

type Registry = RwLock<HashMap<String, lettre::SmtpTransport>>;

fn registry() -> &'static Registry {
    static SESSIONS: OnceLock<Registry> = OnceLock::new();
    SESSIONS.get_or_init(Registry::default)
}

/// Registers a pre-configured SMTP session under `name`, replacing any
/// previous one.
pub fn register_session(name: impl Into<String>, session: lettre::SmtpTransport) {
    let name = name.into();
    debug!(%name, "Registered mail session");
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name, session);
}

/// Removes a registered session, returning it.
pub fn unregister_session(name: &str) -> Option<lettre::SmtpTransport> {
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(name)
}

/// Looks up a registered session.
///
/// # Errors
///
/// Returns [`Error::Config`] if no session has that name.
pub fn lookup_session(name: &str) -> Result<lettre::SmtpTransport> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned()
        .ok_or_else(|| Error::Config(format!("Unable to find mail session {name:?}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 25);
        assert!(!config.enable_tls && !config.require_tls && !config.enable_ssl && !config.auth);
        assert!(config.is_valid());
    }

    #[test]
    fn test_validity() {
        assert!(!SessionConfig::new("", 25).is_valid());
        assert!(!SessionConfig::new("  ", 25).is_valid());
        assert!(!SessionConfig::new("smtp.example.com", 0).is_valid());

        let mut named = SessionConfig::new("", 0);
        named.session_name = Some("outbound".to_string());
        assert!(named.is_valid());

        named.session_name = Some("   ".to_string());
        assert!(!named.is_valid());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = SessionConfig::from_json(r#"{"host":"smtp.example.com","enableTls":true}"#).unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 25);
        assert!(config.enable_tls);
        assert!(config.session_name().is_none());
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let err = SessionConfig::from_json(r#"{"host":"","port":25}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(matches!(SessionConfig::from_json("{"), Err(Error::Serde(_))));
    }

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let config = SessionConfig::new("mail.example.com", 587).with_credentials("u", "p");
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        assert_eq!(SessionConfig::load(&path).unwrap(), config);
        assert!(matches!(
            SessionConfig::load(dir.path().join("missing.json")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_registry() {
        let session = lettre::SmtpTransport::builder_dangerous("localhost").port(2525).build();
        register_session("config-tests", session);
        assert!(lookup_session("config-tests").is_ok());
        assert!(unregister_session("config-tests").is_some());
        assert!(matches!(lookup_session("config-tests"), Err(Error::Config(_))));
    }
}
