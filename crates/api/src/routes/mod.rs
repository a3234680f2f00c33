pub mod carts;
pub mod health;
pub mod metrics;
pub mod products;
pub mod tickets;
