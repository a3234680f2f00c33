//! Ticket issuance.

use std::sync::Arc;

use chrono::Utc;
use common::TicketId;
use domain::{NewTicket, Ticket, TicketCode};
use store::{StoreError, TicketRepository};

use crate::error::{CheckoutError, Result};

/// How many generated codes are tried before giving up.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Produces candidate ticket codes.
pub type CodeSource = Arc<dyn Fn() -> TicketCode + Send + Sync>;

/// Issues purchase tickets with unique codes.
///
/// Generated codes that collide with an existing ticket are replaced and
/// the insert retried, up to [`MAX_CODE_ATTEMPTS`] times. A code supplied
/// by the caller is used as is.
#[derive(Clone)]
pub struct TicketIssuer<S> {
    store: S,
    codes: CodeSource,
}

impl<S: TicketRepository> TicketIssuer<S> {
    /// Creates an issuer drawing random codes.
    pub fn new(store: S) -> Self {
        Self::with_code_source(
            store,
            Arc::new(|| TicketCode::generate(&mut rand::thread_rng())),
        )
    }

    /// Creates an issuer with a custom code source.
    pub fn with_code_source(store: S, codes: CodeSource) -> Self {
        Self { store, codes }
    }

    /// Persists a new ticket, filling in code and timestamp when absent.
    #[tracing::instrument(skip(self, request), fields(purchaser = %request.purchaser, amount = %request.amount))]
    pub async fn issue(&self, request: NewTicket) -> Result<Ticket> {
        let purchase_datetime = request.purchase_datetime.unwrap_or_else(Utc::now);
        let caller_code = request.code.is_some();
        let mut code = request.code.unwrap_or_else(|| (self.codes)());
        let mut attempt = 1;

        loop {
            let ticket = Ticket::new(
                TicketId::new(),
                code,
                purchase_datetime,
                request.amount,
                request.purchaser.clone(),
            );

            match self.store.insert_ticket(&ticket).await {
                Ok(()) => {
                    tracing::info!(ticket_id = %ticket.id(), code = %ticket.code(), "ticket issued");
                    return Ok(ticket);
                }
                Err(StoreError::DuplicateTicketCode(taken))
                    if !caller_code && attempt < MAX_CODE_ATTEMPTS =>
                {
                    metrics::counter!("ticket_code_collisions_total").increment(1);
                    tracing::warn!(code = %taken, attempt, "ticket code collision, retrying");
                    attempt += 1;
                    code = (self.codes)();
                }
                Err(e) => {
                    if matches!(e, StoreError::DuplicateTicketCode(_)) {
                        metrics::counter!("ticket_code_collisions_total").increment(1);
                    }
                    tracing::error!(error = %e, attempt, "ticket creation failed");
                    return Err(CheckoutError::TicketCreation(e));
                }
            }
        }
    }
}
