//! Per-cart serialization of checkouts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use common::CartId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async lock per cart.
///
/// A checkout holds its cart's guard from the first cart read until the
/// reduced cart and ticket are written, so two checkouts of the same cart
/// run one after the other. Checkouts of different carts never wait on
/// each other. The lock only covers checkouts running in this process.
#[derive(Debug, Default)]
pub struct CartLocks {
    inflight: Mutex<HashMap<CartId, Arc<AsyncMutex<()>>>>,
}

impl CartLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other checkout holds `cart_id`.
    pub async fn acquire(&self, cart_id: CartId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on are dropped.
            inflight.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                inflight
                    .entry(cart_id)
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_cart_waits_for_the_holder() {
        let locks = Arc::new(CartLocks::new());
        let cart_id = CartId::new();

        let held = locks.acquire(cart_id).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(cart_id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_carts_do_not_block() {
        let locks = CartLocks::new();
        let _first = locks.acquire(CartId::new()).await;
        let second =
            tokio::time::timeout(Duration::from_secs(1), locks.acquire(CartId::new())).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = CartLocks::new();
        for _ in 0..5 {
            let _guard = locks.acquire(CartId::new()).await;
        }
        let _last = locks.acquire(CartId::new()).await;
        assert_eq!(locks.inflight.lock().unwrap().len(), 1);
    }
}
