//! Persistence for products, carts and tickets.
//!
//! The repository traits in [`repository`] are the only thing the checkout
//! layer depends on. Three backends implement them:
//! - [`InMemoryStore`] for tests and throwaway runs
//! - [`FileStore`], one JSON document per collection on disk
//! - [`PostgresStore`], backed by `sqlx`

pub mod error;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{CartRepository, ProductRepository, Store, TicketRepository};
