//! SMTP delivery through lettre.

use super::Transport;
use crate::config::{SessionConfig, lookup_session};
use crate::error::{Error, Result};
use crate::message::EmailMessage;
use crate::tree::{AssembledMessage, AssemblyOptions, assemble};
use lettre::Transport as _;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use std::time::Duration;
use tracing::{debug, info};

/// Sends messages over SMTP.
#[derive(Clone)]
pub struct SmtpTransport {
    inner: lettre::SmtpTransport,
    domain: Option<String>,
}

impl std::fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl SmtpTransport {
    /// Wraps an existing lettre session. `domain` is used for generated
    /// Message-IDs.
    #[must_use]
    pub const fn new(session: lettre::SmtpTransport, domain: Option<String>) -> Self {
        Self {
            inner: session,
            domain,
        }
    }

    /// Builds a transport from a session configuration.
    ///
    /// A configured session name is resolved through the session registry;
    /// otherwise a connection is described from host, port and the TLS and
    /// authentication toggles. No connection is opened until a message is
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid, names an
    /// unknown session, or TLS parameters cannot be built for the host.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        if let Some(name) = config.session_name() {
            debug!(%name, "Using registered mail session");
            return Ok(Self::new(lookup_session(name)?, config.domain.clone()));
        }
        if !config.is_valid() {
            return Err(Error::Config(
                "A session name, or a host and port, is required".to_string(),
            ));
        }

        let tls = if config.enable_ssl || config.enable_tls || config.require_tls {
            let parameters = TlsParameters::new(config.host.clone())
                .map_err(|e| Error::Config(format!("Invalid TLS parameters for {}: {e}", config.host)))?;
            if config.enable_ssl {
                Tls::Wrapper(parameters)
            } else if config.require_tls {
                Tls::Required(parameters)
            } else {
                Tls::Opportunistic(parameters)
            }
        } else {
            Tls::None
        };

        let mut builder = lettre::SmtpTransport::builder_dangerous(config.host.as_str())
            .port(config.port)
            .tls(tls);

        if config.auth {
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
        }
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Some(Duration::from_secs(secs)));
        }

        debug!(
            host = %config.host,
            port = config.port,
            ssl = config.enable_ssl,
            starttls = config.enable_tls || config.require_tls,
            auth = config.auth,
            "Configured SMTP transport"
        );
        Ok(Self::new(builder.build(), config.domain.clone()))
    }

    fn envelope(assembled: &AssembledMessage) -> Result<lettre::address::Envelope> {
        let sender = assembled
            .envelope
            .sender
            .as_ref()
            .ok_or_else(|| Error::send("No sender address: set envelope-from or From"))?;
        if assembled.envelope.recipients.is_empty() {
            return Err(Error::send("No recipients: set To, Cc or Bcc"));
        }

        let from = sender
            .email()
            .parse::<lettre::Address>()
            .map_err(|e| Error::send_failed(format!("Unusable sender {}", sender.email()), e))?;
        let to = assembled
            .envelope
            .recipients
            .iter()
            .map(|r| {
                r.email()
                    .parse::<lettre::Address>()
                    .map_err(|e| Error::send_failed(format!("Unusable recipient {}", r.email()), e))
            })
            .collect::<Result<Vec<_>>>()?;

        lettre::address::Envelope::new(Some(from), to)
            .map_err(|e| Error::send_failed("Invalid envelope", e))
    }
}

impl Transport for SmtpTransport {
    fn send(&self, message: &EmailMessage) -> Result<EmailMessage> {
        let options = AssemblyOptions {
            domain: self.domain.clone(),
            date: None,
        };
        let assembled = assemble(message, &options)?;
        let envelope = Self::envelope(&assembled)?;
        let bytes = assembled.to_transport_bytes()?;

        self.inner
            .send_raw(&envelope, &bytes)
            .map_err(|e| Error::send_failed("SMTP delivery failed", e))?;

        info!(
            message_id = %assembled.message_id,
            recipients = assembled.envelope.recipients.len(),
            size = bytes.len(),
            "Message sent"
        );

        let mut sent = message.clone();
        sent.message_id = Some(assembled.message_id);
        Ok(sent)
    }
}
