use domain::{CartError, ProductError, ProductId, TicketCode};
use thiserror::Error;

/// Errors that can occur when interacting with a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional stock decrement found less stock than requested.
    /// Nothing was changed.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Another ticket already carries this code.
    #[error("Ticket code already exists: {0}")]
    DuplicateTicketCode(TicketCode),

    /// A cart mutation broke a cart rule.
    #[error("Cart operation rejected: {0}")]
    Cart(#[from] CartError),

    /// A product record broke a catalog rule.
    #[error("Product rejected: {0}")]
    Product(#[from] ProductError),

    /// The backend refused the operation (used by the in-memory failure switches).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a data file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn product_not_found(id: &ProductId) -> Self {
        StoreError::NotFound {
            entity: "Product",
            id: id.to_string(),
        }
    }

    pub fn cart_not_found(id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            entity: "Cart",
            id: id.to_string(),
        }
    }

    /// True for "record does not exist", whichever record it was.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
