//! Domain layer for the storefront backend.
//!
//! This crate provides:
//! - Value objects (`ProductId`, `Money`) and the product catalog entry
//! - The shopping cart with its line-item invariants
//! - Purchase tickets and their human-readable codes
//! - The stock reconciliation engine that turns a cart into a purchase
//!
//! Nothing here performs I/O; persistence lives in the `store` crate.

pub mod cart;
pub mod error;
pub mod identity;
pub mod product;
pub mod reconcile;
pub mod ticket;
pub mod value_objects;

pub use cart::{Cart, CartLineItem};
pub use error::{CartError, ProductError, ReconcileError, TicketCodeError};
pub use identity::{Purchaser, Role};
pub use product::Product;
pub use reconcile::{
    ALL_ITEMS_APPROVED, FulfillmentStatus, Reconciliation, ReconciliationOutcome, StockLevel,
    StockUpdate, reconcile,
};
pub use ticket::{NewTicket, TICKET_CODE_DIGITS, TICKET_CODE_PREFIX, Ticket, TicketCode};
pub use value_objects::{Money, ProductId};
