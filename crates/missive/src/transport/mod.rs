//! Message delivery.
//!
//! A [`Transport`] assembles an [`EmailMessage`] and delivers it, returning
//! the message with the Message-ID it was sent under.

mod memory;
mod smtp;

pub use memory::MemoryTransport;
pub use smtp::SmtpTransport;

use crate::error::Result;
use crate::message::EmailMessage;

/// Delivers assembled messages.
pub trait Transport {
    /// Sends a message.
    ///
    /// # Errors
    ///
    /// Returns an error if assembly or delivery fails.
    fn send(&self, message: &EmailMessage) -> Result<EmailMessage>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, message: &EmailMessage) -> Result<EmailMessage> {
        (**self).send(message)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, message: &EmailMessage) -> Result<EmailMessage> {
        (**self).send(message)
    }
}
