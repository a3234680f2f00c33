//! Purchase tickets.

use chrono::{DateTime, Utc};
use common::TicketId;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TicketCodeError;
use crate::value_objects::Money;

/// Literal prefix of every ticket code.
pub const TICKET_CODE_PREFIX: &str = "C-";

/// Number of digits after the prefix.
pub const TICKET_CODE_DIGITS: usize = 12;

/// Human-readable ticket code: `C-` followed by 12 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketCode(String);

impl TicketCode {
    /// Draws a random code. Uniqueness is enforced by the store, not here.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut code = String::with_capacity(TICKET_CODE_PREFIX.len() + TICKET_CODE_DIGITS);
        code.push_str(TICKET_CODE_PREFIX);
        for _ in 0..TICKET_CODE_DIGITS {
            let digit: u8 = rng.gen_range(0..10);
            code.push(char::from(b'0' + digit));
        }
        Self(code)
    }

    /// Validates an existing code.
    pub fn parse(code: &str) -> Result<Self, TicketCodeError> {
        let invalid = |reason| TicketCodeError {
            code: code.to_string(),
            reason,
        };

        let digits = code
            .strip_prefix(TICKET_CODE_PREFIX)
            .ok_or_else(|| invalid("missing 'C-' prefix"))?;
        if digits.len() != TICKET_CODE_DIGITS {
            return Err(invalid("expected 12 digits"));
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("non-digit characters"));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TicketCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TicketCode {
    type Error = TicketCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TicketCode::parse(&value)
    }
}

impl From<TicketCode> for String {
    fn from(code: TicketCode) -> Self {
        code.0
    }
}

/// Immutable record of a completed (possibly partial) purchase.
///
/// Fields are private and there are no setters; a ticket is written once
/// and only ever read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    id: TicketId,
    code: TicketCode,
    purchase_datetime: DateTime<Utc>,
    amount: Money,
    purchaser: String,
}

impl Ticket {
    pub fn new(
        id: TicketId,
        code: TicketCode,
        purchase_datetime: DateTime<Utc>,
        amount: Money,
        purchaser: impl Into<String>,
    ) -> Self {
        Self {
            id,
            code,
            purchase_datetime,
            amount,
            purchaser: purchaser.into(),
        }
    }

    pub fn id(&self) -> TicketId {
        self.id
    }

    pub fn code(&self) -> &TicketCode {
        &self.code
    }

    pub fn purchase_datetime(&self) -> DateTime<Utc> {
        self.purchase_datetime
    }

    /// Amount actually charged.
    pub fn amount(&self) -> Money {
        self.amount
    }

    /// Email of the purchaser.
    pub fn purchaser(&self) -> &str {
        &self.purchaser
    }
}

/// Request to issue a ticket.
///
/// Code and timestamp are optional; whatever the caller leaves out is
/// generated at issuance time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub amount: Money,
    pub purchaser: String,
    pub code: Option<TicketCode>,
    pub purchase_datetime: Option<DateTime<Utc>>,
}

impl NewTicket {
    pub fn new(amount: Money, purchaser: impl Into<String>) -> Self {
        Self {
            amount,
            purchaser: purchaser.into(),
            code: None,
            purchase_datetime: None,
        }
    }

    pub fn with_code(mut self, code: TicketCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_purchase_datetime(mut self, at: DateTime<Utc>) -> Self {
        self.purchase_datetime = Some(at);
        self
    }
}
