//! Purchase receipts and the notifier trait that delivers them.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use domain::{Purchaser, Ticket};
use serde::Serialize;
use thiserror::Error;

/// A receipt could not be delivered.
#[derive(Debug, Error)]
#[error("Notification to {recipient} failed: {reason}")]
pub struct NotifyError {
    pub recipient: String,
    pub reason: String,
}

/// Purchase confirmation sent after a ticket is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Receipt {
    /// Renders the receipt for a freshly issued ticket.
    pub fn for_ticket(ticket: &Ticket, purchaser: &Purchaser) -> Self {
        let body = format!(
            "Hello {name},\n\n\
             Thank you for your purchase.\n\n\
             Ticket code: {code}\n\
             Purchaser: {email}\n\
             Total: {amount}\n\
             Date: {date}\n",
            name = purchaser.display_name(),
            code = ticket.code(),
            email = ticket.purchaser(),
            amount = ticket.amount(),
            date = ticket.purchase_datetime().to_rfc3339(),
        );

        Self {
            recipient: purchaser.email.clone(),
            subject: format!("Your purchase ticket {}", ticket.code()),
            body,
        }
    }
}

/// Delivers receipts to purchasers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), NotifyError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), NotifyError> {
        (**self).send_receipt(receipt).await
    }
}

/// Notifier that writes the receipt to the log instead of sending mail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %receipt.recipient,
            subject = %receipt.subject,
            body = %receipt.body,
            "receipt dispatched"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Receipt>,
    fail_on_send: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send fail.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_send = fail;
    }

    /// Receipts delivered so far.
    pub fn sent(&self) -> Vec<Receipt> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.fail_on_send {
            return Err(NotifyError {
                recipient: receipt.recipient.clone(),
                reason: "mail server unavailable".to_string(),
            });
        }

        state.sent.push(receipt.clone());
        Ok(())
    }
}
