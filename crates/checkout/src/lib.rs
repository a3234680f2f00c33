//! Checkout orchestration for carts.
//!
//! A checkout walks these stages:
//! 1. Validate the cart (exists, not empty)
//! 2. Reconcile cart lines against live stock
//! 3. Persist stock decrements
//! 4. Persist the reduced cart
//! 5. Issue the ticket
//! 6. Send the receipt (best-effort)
//!
//! If a persisting stage fails, every mutation already committed is
//! compensated in reverse order before the error is returned.

pub mod coordinator;
pub mod error;
pub mod issuer;
pub mod locks;
pub mod services;
pub mod stage;

pub use coordinator::{CheckoutCoordinator, CheckoutReceipt};
pub use error::{CheckoutError, Result};
pub use issuer::{CodeSource, MAX_CODE_ATTEMPTS, TicketIssuer};
pub use locks::CartLocks;
pub use services::{InMemoryNotifier, LogNotifier, Notifier, NotifyError, Receipt};
pub use stage::CheckoutStage;
