//! Checkout stages.

use serde::{Deserialize, Serialize};

/// Where a checkout is, or where it failed.
///
/// Stage order:
/// ```text
/// Start ──► ValidateCart ──► Reconcile ──► PersistStock ──► PersistCart
///       ──► IssueTicket ──► Notify ──► Respond
/// ```
/// Any of `ValidateCart` through `IssueTicket` can abort the checkout;
/// `Notify` never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage {
    #[default]
    Start,
    ValidateCart,
    Reconcile,
    PersistStock,
    PersistCart,
    IssueTicket,
    Notify,
    Respond,
}

impl CheckoutStage {
    /// True for `Respond`, the only successful end state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutStage::Respond)
    }

    /// True for stages whose failure leaves committed writes to undo.
    pub fn needs_compensation(&self) -> bool {
        matches!(
            self,
            CheckoutStage::PersistStock | CheckoutStage::PersistCart | CheckoutStage::IssueTicket
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::Start => "start",
            CheckoutStage::ValidateCart => "validate_cart",
            CheckoutStage::Reconcile => "reconcile",
            CheckoutStage::PersistStock => "persist_stock",
            CheckoutStage::PersistCart => "persist_cart",
            CheckoutStage::IssueTicket => "issue_ticket",
            CheckoutStage::Notify => "notify",
            CheckoutStage::Respond => "respond",
        }
    }
}

impl std::fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
