//! Contributor reminders: HTML email over SMTP and WhatsApp deep links.

pub mod dispatch;
pub mod email;
pub mod whatsapp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SmtpConfig;

pub use dispatch::{DispatchReport, Dispatcher, WhatsAppLink};
pub use email::{LogMailer, SmtpMailer, reminder_email};
pub use whatsapp::{reminder_text, whatsapp_link};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid address {0:?}: {1}")]
    Address(String, lettre::address::AddressError),

    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp transport: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("message rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotifyError>;
}

/// SMTP host `log` swaps the transport for one that only writes to the log.
pub fn mailer_from_config(cfg: &SmtpConfig) -> Result<Arc<dyn Mailer>, NotifyError> {
    if cfg.host == "log" {
        return Ok(Arc::new(LogMailer));
    }
    Ok(Arc::new(SmtpMailer::from_config(cfg)?))
}
