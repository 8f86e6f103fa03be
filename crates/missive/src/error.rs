//! Error types for the composition library.

use thiserror::Error;

/// Boxed cause carried by wrapping variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while composing or sending a message.
#[derive(Debug, Error)]
pub enum Error {
    /// An address literal or contact could not be parsed.
    #[error(
        "Invalid address {literal:?}{}: must be in format of a@b.com or Name <a@b.com>",
        position_suffix(.index)
    )]
    InvalidAddress {
        /// The offending input.
        literal: String,
        /// Position of the input within a list, when one was given.
        index: Option<usize>,
    },

    /// Attachment bytes could not be materialized.
    #[error("Attachment error: {message}")]
    Attachment {
        /// What was being read or fetched.
        message: String,
        /// Underlying I/O or HTTP failure.
        #[source]
        source: Option<BoxError>,
    },

    /// A content disposition other than attachment or inline.
    #[error("Unsupported content disposition: {0}")]
    UnsupportedDisposition(String),

    /// Template rendering failed.
    #[error("Templating error: {message}")]
    Templating {
        /// Description of the failure.
        message: String,
        /// Engine error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Building the MIME tree failed.
    #[error("Unable to assemble {field}")]
    Assembly {
        /// The field being assembled (e.g. "recipient To").
        field: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// Delivery failed.
    #[error("Send failed: {message}")]
    Send {
        /// Description of the failure.
        message: String,
        /// Underlying transport or assembly failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Session configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// MIME toolkit error.
    #[error("MIME error: {0}")]
    Mime(#[from] missive_mime::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates an [`Error::InvalidAddress`].
    pub fn invalid_address(literal: impl Into<String>) -> Self {
        Self::InvalidAddress {
            literal: literal.into(),
            index: None,
        }
    }

    /// Records the list position of an address error.
    #[must_use]
    pub fn at_index(self, position: usize) -> Self {
        match self {
            Self::InvalidAddress { literal, .. } => Self::InvalidAddress {
                literal,
                index: Some(position),
            },
            other => other,
        }
    }

    /// Creates an [`Error::Attachment`] with a cause.
    pub fn attachment(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Attachment {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an [`Error::Templating`] without a cause.
    pub fn templating(message: impl Into<String>) -> Self {
        Self::Templating {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an [`Error::Templating`] wrapping an engine error.
    pub fn templating_failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Templating {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an [`Error::Assembly`] naming the field being built.
    pub fn assembly(field: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Assembly {
            field: field.into(),
            source: source.into(),
        }
    }

    /// Creates an [`Error::Send`] without a cause.
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps any error as a delivery failure.
    pub fn send_failed(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Send {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

#[allow(clippy::ref_option)]
fn position_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" at position {i}")).unwrap_or_default()
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
