use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::{CartId, TicketId};
use domain::{Cart, Product, ProductId, Ticket};
use tokio::sync::RwLock;

use crate::repository::{
    CartRepository, ProductRepository, TicketRepository, apply_quantity, apply_removal,
    insufficient_stock,
};
use crate::{Result, StoreError};

#[derive(Debug, Default)]
struct InMemoryState {
    products: BTreeMap<ProductId, Product>,
    carts: Vec<Cart>,
    tickets: Vec<Ticket>,
}

impl InMemoryState {
    fn cart_mut(&mut self, id: CartId) -> Result<&mut Cart> {
        self.carts
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| StoreError::cart_not_found(id))
    }

    fn product_mut(&mut self, id: &ProductId) -> Result<&mut Product> {
        self.products
            .get_mut(id)
            .ok_or_else(|| StoreError::product_not_found(id))
    }
}

/// Switches that make individual operations fail, for exercising
/// rollback paths.
#[derive(Debug, Default)]
struct FailureSwitches {
    decrement_for: HashSet<ProductId>,
    increment: bool,
    cart_update: bool,
    ticket_insert: bool,
}

/// In-memory store for tests and local runs.
///
/// One lock guards all collections, so every operation (including the
/// conditional stock decrement) is atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InMemoryState>>,
    failures: Arc<Mutex<FailureSwitches>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with products.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write().await;
            for product in products {
                state.products.insert(product.id.clone(), product);
            }
        }
        store
    }

    /// Makes `decrement_stock` fail for one product.
    pub fn set_fail_on_decrement(&self, product_id: impl Into<ProductId>) {
        self.switches().decrement_for.insert(product_id.into());
    }

    /// Makes `increment_stock` fail, which breaks stock compensation.
    pub fn set_fail_on_increment(&self, fail: bool) {
        self.switches().increment = fail;
    }

    /// Makes `update_cart_quantity` and `remove_cart_item` fail.
    pub fn set_fail_on_cart_update(&self, fail: bool) {
        self.switches().cart_update = fail;
    }

    /// Makes `insert_ticket` fail.
    pub fn set_fail_on_ticket_insert(&self, fail: bool) {
        self.switches().ticket_insert = fail;
    }

    /// Returns the number of stored tickets.
    pub async fn ticket_count(&self) -> usize {
        self.state.read().await.tickets.len()
    }

    fn switches(&self) -> std::sync::MutexGuard<'_, FailureSwitches> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_cart_update(&self) -> Result<()> {
        if self.switches().cart_update {
            return Err(StoreError::Unavailable("cart update rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.state.read().await.products.values().cloned().collect())
    }

    async fn save_product(&self, product: Product) -> Result<()> {
        product.validate()?;
        let mut state = self.state.write().await;
        state.products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn update_stock(&self, id: &ProductId, new_stock: u32) -> Result<()> {
        let mut state = self.state.write().await;
        state.product_mut(id)?.stock = new_stock;
        Ok(())
    }

    async fn decrement_stock(&self, id: &ProductId, quantity: u32) -> Result<u32> {
        if self.switches().decrement_for.contains(id) {
            return Err(StoreError::Unavailable(format!(
                "stock decrement rejected for {id}"
            )));
        }

        let mut state = self.state.write().await;
        let product = state.product_mut(id)?;
        if product.stock < quantity {
            return Err(insufficient_stock(id, quantity, product.stock));
        }
        product.stock -= quantity;
        Ok(product.stock)
    }

    async fn increment_stock(&self, id: &ProductId, quantity: u32) -> Result<u32> {
        if self.switches().increment {
            return Err(StoreError::Unavailable(format!(
                "stock increment rejected for {id}"
            )));
        }

        let mut state = self.state.write().await;
        let product = state.product_mut(id)?;
        product.stock = product.stock.saturating_add(quantity);
        Ok(product.stock)
    }
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn create_cart(&self) -> Result<Cart> {
        let cart = Cart::new(CartId::new());
        self.state.write().await.carts.push(cart.clone());
        Ok(cart)
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state.carts.iter().find(|c| c.id() == id).cloned())
    }

    async fn list_carts(&self) -> Result<Vec<Cart>> {
        Ok(self.state.read().await.carts.clone())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut state = self.state.write().await;
        match state.carts.iter_mut().find(|c| c.id() == cart.id()) {
            Some(existing) => *existing = cart.clone(),
            None => state.carts.push(cart.clone()),
        }
        Ok(())
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(product_id) {
            return Err(StoreError::product_not_found(product_id));
        }
        let cart = state.cart_mut(cart_id)?;
        cart.add_item(product_id.clone(), quantity)?;
        Ok(cart.clone())
    }

    async fn update_cart_quantity(
        &self,
        product_id: &ProductId,
        cart_id: CartId,
        quantity: u32,
    ) -> Result<Cart> {
        self.check_cart_update()?;
        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;
        apply_quantity(cart, product_id, quantity)?;
        Ok(cart.clone())
    }

    async fn remove_cart_item(&self, product_id: &ProductId, cart_id: CartId) -> Result<Cart> {
        self.check_cart_update()?;
        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;
        apply_removal(cart, product_id);
        Ok(cart.clone())
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<Cart> {
        let mut state = self.state.write().await;
        let cart = state.cart_mut(cart_id)?;
        cart.clear();
        Ok(cart.clone())
    }
}

#[async_trait]
impl TicketRepository for InMemoryStore {
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        if self.switches().ticket_insert {
            return Err(StoreError::Unavailable("ticket insert rejected".to_string()));
        }

        let mut state = self.state.write().await;
        if state.tickets.iter().any(|t| t.code() == ticket.code()) {
            return Err(StoreError::DuplicateTicketCode(ticket.code().clone()));
        }
        state.tickets.push(ticket.clone());
        Ok(())
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        let state = self.state.read().await;
        Ok(state.tickets.iter().find(|t| t.id() == id).cloned())
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>> {
        Ok(self.state.read().await.tickets.clone())
    }
}
