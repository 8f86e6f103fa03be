//! In-memory delivery for tests and dry runs.

use super::Transport;
use crate::error::Result;
use crate::message::EmailMessage;
use crate::tree::{AssembledMessage, AssemblyOptions, assemble};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Assembles messages and keeps them instead of delivering them.
///
/// Clones share one mailbox.
///
/// ```
/// use missive::message::EmailMessage;
/// use missive::transport::{MemoryTransport, Transport};
///
/// let transport = MemoryTransport::new();
/// let sent = transport.send(&EmailMessage::new())?;
/// assert!(sent.message_id.is_some());
/// assert_eq!(transport.len(), 1);
/// # Ok::<(), missive::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    options: AssemblyOptions,
    mailbox: Arc<Mutex<Vec<AssembledMessage>>>,
}

impl MemoryTransport {
    /// Creates an empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty mailbox assembling with `options`.
    #[must_use]
    pub fn with_options(options: AssemblyOptions) -> Self {
        Self {
            options,
            mailbox: Arc::default(),
        }
    }

    /// Every message sent so far, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<AssembledMessage> {
        self.mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recently sent message.
    #[must_use]
    pub fn last(&self) -> Option<AssembledMessage> {
        self.mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Number of messages sent.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the mailbox.
    pub fn clear(&self) {
        self.mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Transport for MemoryTransport {
    fn send(&self, message: &EmailMessage) -> Result<EmailMessage> {
        let assembled = assemble(message, &self.options)?;
        debug!(message_id = %assembled.message_id, "Recorded message");

        let mut sent = message.clone();
        sent.message_id = Some(assembled.message_id.clone());
        self.mailbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(assembled);
        Ok(sent)
    }
}
