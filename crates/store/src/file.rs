use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartId, TicketId};
use domain::{Cart, Product, ProductId, Ticket};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::repository::{
    CartRepository, ProductRepository, TicketRepository, apply_quantity, apply_removal,
    insufficient_stock,
};
use crate::{Result, StoreError};

const PRODUCTS_FILE: &str = "products.json";
const CARTS_FILE: &str = "carts.json";
const TICKETS_FILE: &str = "tickets.json";

/// Filesystem store keeping each collection as a JSON array in its own file.
///
/// Every operation holds one async mutex for its whole read-modify-write,
/// so operations are atomic with respect to each other within the process.
/// Files are replaced via write-to-temp-then-rename, so a crash never
/// leaves a half-written collection behind.
#[derive(Clone)]
pub struct FileStore {
    dir: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Opens (creating if needed) a data directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "file store opened");
        Ok(Self {
            dir: Arc::new(dir),
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// Returns the data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize>(&self, file: &str, records: &[T]) -> Result<()> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        let bytes = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Loads the carts, applies `f` to one of them, and writes them back.
    async fn modify_cart<F>(&self, cart_id: CartId, f: F) -> Result<Cart>
    where
        F: FnOnce(&mut Cart) -> Result<()> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut carts: Vec<Cart> = self.read(CARTS_FILE).await?;
        let cart = carts
            .iter_mut()
            .find(|c| c.id() == cart_id)
            .ok_or_else(|| StoreError::cart_not_found(cart_id))?;
        f(cart)?;
        let updated = cart.clone();
        self.write(CARTS_FILE, &carts).await?;
        Ok(updated)
    }

    /// Loads the products, applies `f` to one of them, and writes them back.
    async fn modify_product<F>(&self, id: &ProductId, f: F) -> Result<u32>
    where
        F: FnOnce(&mut Product) -> Result<()> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut products: Vec<Product> = self.read(PRODUCTS_FILE).await?;
        let product = products
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| StoreError::product_not_found(id))?;
        f(product)?;
        let stock = product.stock;
        self.write(PRODUCTS_FILE, &products).await?;
        Ok(stock)
    }
}

#[async_trait]
impl ProductRepository for FileStore {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let _guard = self.lock.lock().await;
        let products: Vec<Product> = self.read(PRODUCTS_FILE).await?;
        Ok(products.into_iter().find(|p| &p.id == id))
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let _guard = self.lock.lock().await;
        let mut products: Vec<Product> = self.read(PRODUCTS_FILE).await?;
        products.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(products)
    }

    async fn save_product(&self, product: Product) -> Result<()> {
        product.validate()?;
        let _guard = self.lock.lock().await;
        let mut products: Vec<Product> = self.read(PRODUCTS_FILE).await?;
        match products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product,
            None => products.push(product),
        }
        self.write(PRODUCTS_FILE, &products).await
    }

    async fn update_stock(&self, id: &ProductId, new_stock: u32) -> Result<()> {
        self.modify_product(id, |p| {
            p.stock = new_stock;
            Ok(())
        })
        .await
        .map(|_| ())
    }

    async fn decrement_stock(&self, id: &ProductId, quantity: u32) -> Result<u32> {
        self.modify_product(id, |p| {
            if p.stock < quantity {
                return Err(insufficient_stock(&p.id, quantity, p.stock));
            }
            p.stock -= quantity;
            Ok(())
        })
        .await
    }

    async fn increment_stock(&self, id: &ProductId, quantity: u32) -> Result<u32> {
        self.modify_product(id, |p| {
            p.stock = p.stock.saturating_add(quantity);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CartRepository for FileStore {
    async fn create_cart(&self) -> Result<Cart> {
        let _guard = self.lock.lock().await;
        let mut carts: Vec<Cart> = self.read(CARTS_FILE).await?;
        let cart = Cart::new(CartId::new());
        carts.push(cart.clone());
        self.write(CARTS_FILE, &carts).await?;
        Ok(cart)
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let _guard = self.lock.lock().await;
        let carts: Vec<Cart> = self.read(CARTS_FILE).await?;
        Ok(carts.into_iter().find(|c| c.id() == id))
    }

    async fn list_carts(&self) -> Result<Vec<Cart>> {
        let _guard = self.lock.lock().await;
        self.read(CARTS_FILE).await
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut carts: Vec<Cart> = self.read(CARTS_FILE).await?;
        match carts.iter_mut().find(|c| c.id() == cart.id()) {
            Some(existing) => *existing = cart.clone(),
            None => carts.push(cart.clone()),
        }
        self.write(CARTS_FILE, &carts).await
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        if self.get_product(product_id).await?.is_none() {
            return Err(StoreError::product_not_found(product_id));
        }
        let product_id = product_id.clone();
        self.modify_cart(cart_id, move |cart| {
            cart.add_item(product_id, quantity)?;
            Ok(())
        })
        .await
    }

    async fn update_cart_quantity(
        &self,
        product_id: &ProductId,
        cart_id: CartId,
        quantity: u32,
    ) -> Result<Cart> {
        self.modify_cart(cart_id, |cart| {
            apply_quantity(cart, product_id, quantity)?;
            Ok(())
        })
        .await
    }

    async fn remove_cart_item(&self, product_id: &ProductId, cart_id: CartId) -> Result<Cart> {
        self.modify_cart(cart_id, |cart| {
            apply_removal(cart, product_id);
            Ok(())
        })
        .await
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<Cart> {
        self.modify_cart(cart_id, |cart| {
            cart.clear();
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl TicketRepository for FileStore {
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut tickets: Vec<Ticket> = self.read(TICKETS_FILE).await?;
        if tickets.iter().any(|t| t.code() == ticket.code()) {
            return Err(StoreError::DuplicateTicketCode(ticket.code().clone()));
        }
        tickets.push(ticket.clone());
        self.write(TICKETS_FILE, &tickets).await
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        let _guard = self.lock.lock().await;
        let tickets: Vec<Ticket> = self.read(TICKETS_FILE).await?;
        Ok(tickets.into_iter().find(|t| t.id() == id))
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>> {
        let _guard = self.lock.lock().await;
        self.read(TICKETS_FILE).await
    }
}
