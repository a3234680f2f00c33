//! Domain error types.

use thiserror::Error;

use crate::value_objects::{Money, ProductId};

/// Errors raised by cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The product is not in the cart.
    #[error("Item not found in cart: {product_id}")]
    ItemNotFound { product_id: ProductId },

    /// Quantity must be at least one when adding.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Merging into an existing line would exceed the largest quantity.
    #[error("Quantity for {product_id} would exceed {max}", max = u32::MAX)]
    QuantityOverflow { product_id: ProductId },
}

/// Errors raised when a product breaks a catalog rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Product {product_id} has a negative price: {price}")]
    NegativePrice { product_id: ProductId, price: Money },
}

/// Errors raised by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The cart has no line items to purchase.
    #[error("Cart is empty")]
    EmptyCart,

    /// A line item references a product that could not be found.
    #[error("Product lookup failed: {product_id}")]
    ProductLookup { product_id: ProductId },

    /// A product carries a negative unit price.
    #[error("Product {product_id} has a negative price")]
    NegativePrice { product_id: ProductId },

    /// Charged amount or remaining quantity does not fit its type.
    #[error("Amount or quantity overflow for product {product_id}")]
    Overflow { product_id: ProductId },
}

/// A string that is not a well-formed ticket code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid ticket code '{code}': {reason}")]
pub struct TicketCodeError {
    pub code: String,
    pub reason: &'static str,
}
