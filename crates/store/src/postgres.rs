use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, TicketId};
use domain::{Cart, CartError, CartLineItem, Money, Product, ProductId, Ticket, TicketCode};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::repository::{CartRepository, ProductRepository, TicketRepository, insufficient_stock};
use crate::{Result, StoreError};

/// PostgreSQL-backed store.
///
/// Stock decrements are a single conditional `UPDATE`, so the database
/// serializes concurrent checkouts on the same row.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: to_u32(row.try_get("stock")?)?,
            owner: row.try_get("owner")?,
            category: row.try_get("category")?,
            status: row.try_get("status")?,
        })
    }

    fn row_to_ticket(row: PgRow) -> Result<Ticket> {
        let code: String = row.try_get("code")?;
        let code = TicketCode::parse(&code).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Ticket::new(
            TicketId::from_uuid(row.try_get::<Uuid, _>("id")?),
            code,
            row.try_get::<DateTime<Utc>, _>("purchase_datetime")?,
            Money::from_cents(row.try_get("amount_cents")?),
            row.try_get::<String, _>("purchaser")?,
        ))
    }

    fn row_to_line(row: &PgRow) -> Result<CartLineItem> {
        Ok(CartLineItem {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: to_u32(row.try_get("quantity")?)?,
        })
    }

    async fn load_cart<'e, E>(executor: E, id: CartId) -> Result<Option<Cart>>
    where
        E: sqlx::PgExecutor<'e> + Copy,
    {
        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(executor)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(executor)
        .await?;

        let items = rows
            .iter()
            .map(Self::row_to_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Cart::from_items(id, items)?))
    }

    async fn require_cart(&self, id: CartId) -> Result<Cart> {
        Self::load_cart(&self.pool, id)
            .await?
            .ok_or_else(|| StoreError::cart_not_found(id))
    }

    async fn ensure_cart_exists(&self, id: CartId) -> Result<()> {
        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StoreError::cart_not_found(id)),
        }
    }

    async fn write_cart_items(
        tx: &mut Transaction<'_, Postgres>,
        cart: &Cart,
    ) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id().as_uuid())
            .execute(&mut **tx)
            .await?;

        for item in cart.items() {
            sqlx::query(
                r#"
                INSERT INTO cart_items (cart_id, product_id, quantity)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(cart.id().as_uuid())
            .bind(item.product_id.as_str())
            .bind(i64::from(item.quantity))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))
}

#[async_trait]
impl ProductRepository for PostgresStore {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, title, description, price_cents, stock, owner, category, status
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, price_cents, stock, owner, category, status
            FROM products
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn save_product(&self, product: Product) -> Result<()> {
        product.validate()?;
        sqlx::query(
            r#"
            INSERT INTO products (id, title, description, price_cents, stock, owner, category, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                owner = EXCLUDED.owner,
                category = EXCLUDED.category,
                status = EXCLUDED.status
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .bind(&product.owner)
        .bind(&product.category)
        .bind(product.status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_stock(&self, id: &ProductId, new_stock: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(i64::from(new_stock))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::product_not_found(id));
        }
        Ok(())
    }

    async fn decrement_stock(&self, id: &ProductId, quantity: u32) -> Result<u32> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(stock) = updated {
            return to_u32(stock);
        }

        // Nothing matched: either the product is gone or the stock is short.
        let current: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match current {
            Some(stock) => Err(insufficient_stock(id, quantity, to_u32(stock)?)),
            None => Err(StoreError::product_not_found(id)),
        }
    }

    async fn increment_stock(&self, id: &ProductId, quantity: u32) -> Result<u32> {
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE products SET stock = stock + $2 WHERE id = $1 RETURNING stock",
        )
        .bind(id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(stock) => to_u32(stock),
            None => Err(StoreError::product_not_found(id)),
        }
    }
}

#[async_trait]
impl CartRepository for PostgresStore {
    async fn create_cart(&self) -> Result<Cart> {
        let cart = Cart::new(CartId::new());
        sqlx::query("INSERT INTO carts (id) VALUES ($1)")
            .bind(cart.id().as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(cart)
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        Self::load_cart(&self.pool, id).await
    }

    async fn list_carts(&self) -> Result<Vec<Cart>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM carts ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT cart_id, product_id, quantity
            FROM cart_items
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<Uuid, Vec<CartLineItem>> = HashMap::new();
        for row in &rows {
            let cart_id: Uuid = row.try_get("cart_id")?;
            lines.entry(cart_id).or_default().push(Self::row_to_line(row)?);
        }

        let carts = ids
            .into_iter()
            .map(|id| {
                let items = lines.remove(&id).unwrap_or_default();
                Cart::from_items(CartId::from_uuid(id), items)
            })
            .collect::<std::result::Result<Vec<_>, CartError>>()?;
        Ok(carts)
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO carts (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(cart.id().as_uuid())
            .execute(&mut *tx)
            .await?;
        Self::write_cart_items(&mut tx, cart).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity }.into());
        }
        if self.get_product(product_id).await?.is_none() {
            return Err(StoreError::product_not_found(product_id));
        }
        self.ensure_cart_exists(cart_id).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id) DO UPDATE SET
                quantity = cart_items.quantity + EXCLUDED.quantity
            WHERE cart_items.quantity + EXCLUDED.quantity <= $4
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .bind(i64::from(u32::MAX))
        .execute(&self.pool)
        .await?;

        // The guarded upsert touches nothing when the merged line would overflow.
        if result.rows_affected() == 0 {
            return Err(CartError::QuantityOverflow {
                product_id: product_id.clone(),
            }
            .into());
        }

        self.require_cart(cart_id).await
    }

    async fn update_cart_quantity(
        &self,
        product_id: &ProductId,
        cart_id: CartId,
        quantity: u32,
    ) -> Result<Cart> {
        self.ensure_cart_exists(cart_id).await?;

        if quantity == 0 {
            return self.remove_cart_item(product_id, cart_id).await;
        }

        let result = sqlx::query(
            "UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart_id.as_uuid())
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CartError::ItemNotFound {
                product_id: product_id.clone(),
            }
            .into());
        }
        self.require_cart(cart_id).await
    }

    async fn remove_cart_item(&self, product_id: &ProductId, cart_id: CartId) -> Result<Cart> {
        self.ensure_cart_exists(cart_id).await?;

        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id.as_uuid())
            .bind(product_id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(%cart_id, %product_id, "cart line already absent");
        }
        self.require_cart(cart_id).await
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<Cart> {
        self.ensure_cart_exists(cart_id).await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(Cart::new(cart_id))
    }
}

#[async_trait]
impl TicketRepository for PostgresStore {
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, code, purchase_datetime, amount_cents, purchaser)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(ticket.id().as_uuid())
        .bind(ticket.code().as_str())
        .bind(ticket.purchase_datetime())
        .bind(ticket.amount().cents())
        .bind(ticket.purchaser())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_ticket_code")
            {
                return StoreError::DuplicateTicketCode(ticket.code().clone());
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, code, purchase_datetime, amount_cents, purchaser
            FROM tickets
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_ticket).transpose()
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, purchase_datetime, amount_cents, purchaser
            FROM tickets
            ORDER BY purchase_datetime ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_ticket).collect()
    }
}
