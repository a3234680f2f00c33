use async_trait::async_trait;
use common::{CartId, TicketId};
use domain::{Cart, CartError, Product, ProductId, Ticket};

use crate::{Result, StoreError};

/// Catalog and inventory access.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Loads a product. Returns None if it doesn't exist.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Lists the catalog ordered by product id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Inserts or replaces a product.
    async fn save_product(&self, product: Product) -> Result<()>;

    /// Sets the stock of a product to an absolute value.
    ///
    /// Idempotent: applying the same value twice changes nothing.
    async fn update_stock(&self, id: &ProductId, new_stock: u32) -> Result<()>;

    /// Atomically takes `quantity` units out of stock if at least that many
    /// are available, returning the new stock.
    ///
    /// The check and the write happen as one step, so two concurrent
    /// checkouts cannot both take the last unit. Fails with
    /// `InsufficientStock` and leaves the stock untouched otherwise.
    async fn decrement_stock(&self, id: &ProductId, quantity: u32) -> Result<u32>;

    /// Puts `quantity` units back into stock, returning the new stock.
    async fn increment_stock(&self, id: &ProductId, quantity: u32) -> Result<u32>;
}

/// Shopping cart access.
///
/// Quantity updates and removals are idempotent for a given target value.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Creates and persists an empty cart.
    async fn create_cart(&self) -> Result<Cart>;

    /// Loads a cart. Returns None if it doesn't exist.
    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>>;

    async fn list_carts(&self) -> Result<Vec<Cart>>;

    /// Inserts or replaces a whole cart.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    /// Adds units of an existing product, merging with its line if present.
    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart>;

    /// Sets the quantity of a line; zero removes it.
    async fn update_cart_quantity(
        &self,
        product_id: &ProductId,
        cart_id: CartId,
        quantity: u32,
    ) -> Result<Cart>;

    /// Removes the line for a product; removing an absent line is a no-op.
    async fn remove_cart_item(&self, product_id: &ProductId, cart_id: CartId) -> Result<Cart>;

    /// Empties a cart.
    async fn clear_cart(&self, cart_id: CartId) -> Result<Cart>;
}

/// Append-only ticket log.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Persists a new ticket.
    ///
    /// Fails with `DuplicateTicketCode` (storing nothing) if the code is
    /// already taken.
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()>;

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>>;

    async fn list_tickets(&self) -> Result<Vec<Ticket>>;
}

/// A complete backend: products, carts and tickets behind one handle.
pub trait Store: ProductRepository + CartRepository + TicketRepository + Clone + 'static {}

impl<T> Store for T where T: ProductRepository + CartRepository + TicketRepository + Clone + 'static {}

/// Quantity update with the idempotent-zero rule shared by the
/// document-style backends.
pub(crate) fn apply_quantity(
    cart: &mut Cart,
    product_id: &ProductId,
    quantity: u32,
) -> std::result::Result<(), CartError> {
    match cart.set_quantity(product_id, quantity) {
        Err(CartError::ItemNotFound { .. }) if quantity == 0 => Ok(()),
        other => other,
    }
}

/// Removal that treats an absent line as already removed.
pub(crate) fn apply_removal(cart: &mut Cart, product_id: &ProductId) {
    if let Err(CartError::ItemNotFound { .. }) = cart.remove_item(product_id) {
        tracing::debug!(cart_id = %cart.id(), %product_id, "cart line already absent");
    }
}

/// Builds the rejection for a conditional decrement and counts it.
pub(crate) fn insufficient_stock(
    product_id: &ProductId,
    requested: u32,
    available: u32,
) -> StoreError {
    metrics::counter!("stock_decrement_rejected_total").increment(1);
    tracing::debug!(%product_id, requested, available, "stock decrement rejected");
    StoreError::InsufficientStock {
        product_id: product_id.clone(),
        requested,
        available,
    }
}
