//! Checkout error types.

use common::CartId;
use domain::{ProductId, ReconcileError};
use store::StoreError;
use thiserror::Error;

use crate::stage::CheckoutStage;

/// Errors that abort a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart does not exist.
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// The cart has nothing to purchase.
    #[error("Cart {0} is empty")]
    EmptyCart(CartId),

    /// A cart line references a product that does not exist.
    #[error("Product lookup failed: {product_id}")]
    ProductLookup { product_id: ProductId },

    /// Reading current stock levels failed.
    #[error("Stock lookup failed: {0}")]
    StockLookup(#[source] StoreError),

    /// A product in the cart carries a negative price.
    #[error("Product {product_id} has a negative price")]
    InvalidPrice { product_id: ProductId },

    /// A line amount or the ticket total does not fit in the money range.
    #[error("Amount overflow while pricing product {product_id}")]
    AmountOverflow { product_id: ProductId },

    /// Taking units out of stock failed.
    #[error("Stock update failed for product {product_id}: {source}")]
    StockUpdate {
        product_id: ProductId,
        #[source]
        source: StoreError,
    },

    /// Writing the reduced cart failed.
    #[error("Cart update failed for cart {cart_id}: {source}")]
    CartUpdate {
        cart_id: CartId,
        #[source]
        source: StoreError,
    },

    /// The ticket could not be persisted.
    #[error("Ticket creation failed: {0}")]
    TicketCreation(#[source] StoreError),

    /// Loading checkout inputs failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// The stage this error aborted.
    pub fn stage(&self) -> CheckoutStage {
        match self {
            CheckoutError::CartNotFound(_)
            | CheckoutError::EmptyCart(_)
            | CheckoutError::Store(_) => CheckoutStage::ValidateCart,
            CheckoutError::ProductLookup { .. }
            | CheckoutError::StockLookup(_)
            | CheckoutError::InvalidPrice { .. }
            | CheckoutError::AmountOverflow { .. } => CheckoutStage::Reconcile,
            CheckoutError::StockUpdate { .. } => CheckoutStage::PersistStock,
            CheckoutError::CartUpdate { .. } => CheckoutStage::PersistCart,
            CheckoutError::TicketCreation(_) => CheckoutStage::IssueTicket,
        }
    }

    /// True when a concurrent checkout took the stock first.
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(
            self,
            CheckoutError::StockUpdate {
                source: StoreError::InsufficientStock { .. },
                ..
            }
        )
    }

    /// Builds the error from a reconciliation failure.
    pub fn from_reconcile(cart_id: CartId, err: ReconcileError) -> Self {
        match err {
            ReconcileError::EmptyCart => CheckoutError::EmptyCart(cart_id),
            ReconcileError::ProductLookup { product_id } => {
                CheckoutError::ProductLookup { product_id }
            }
            ReconcileError::NegativePrice { product_id } => {
                CheckoutError::InvalidPrice { product_id }
            }
            ReconcileError::Overflow { product_id } => CheckoutError::AmountOverflow { product_id },
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
