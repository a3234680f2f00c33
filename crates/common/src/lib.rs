//! Identifier types shared by every layer of the storefront backend.

pub mod types;

pub use types::{CartId, TicketId};
