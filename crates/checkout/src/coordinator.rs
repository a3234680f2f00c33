//! Checkout coordinator: drives a cart through reconciliation, persistence,
//! ticket issuance and notification.

use std::collections::HashMap;
use std::time::Instant;

use common::CartId;
use domain::{
    Cart, CartLineItem, FulfillmentStatus, Money, NewTicket, ProductId, Purchaser,
    ReconciliationOutcome, StockLevel, Ticket, reconcile,
};
use serde::Serialize;
use store::Store;

use crate::error::{CheckoutError, Result};
use crate::issuer::TicketIssuer;
use crate::locks::CartLocks;
use crate::services::notifier::{Notifier, Receipt};
use crate::stage::CheckoutStage;

/// Result of a successful checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub ticket: Ticket,
    pub outcomes: Vec<ReconciliationOutcome>,
    pub total_amount: Money,
    /// Concatenated notices, or "All items approved." when there are none.
    pub message: String,
    /// Cart lines left for a later purchase.
    pub remaining_items: Vec<CartLineItem>,
}

/// Undo action for a committed write.
#[derive(Debug)]
enum Compensation {
    RestoreStock { product_id: ProductId, quantity: u32 },
    RestoreCart(Cart),
}

impl Compensation {
    fn name(&self) -> &'static str {
        match self {
            Compensation::RestoreStock { .. } => "restore_stock",
            Compensation::RestoreCart(_) => "restore_cart",
        }
    }
}

/// Orchestrates checkouts.
///
/// Every committed stock or cart write records a compensation. When a
/// later stage fails, compensations run in reverse order and the original
/// error is returned, so a failed checkout leaves stock and cart as they
/// were. Notification failures are logged and never fail the checkout.
///
/// Checkouts of the same cart are serialized: the second one starts from
/// the cart the first one left behind.
pub struct CheckoutCoordinator<S, N>
where
    S: Store,
    N: Notifier,
{
    store: S,
    issuer: TicketIssuer<S>,
    notifier: N,
    locks: CartLocks,
}

impl<S, N> CheckoutCoordinator<S, N>
where
    S: Store,
    N: Notifier,
{
    /// Creates a coordinator with a random-code ticket issuer.
    pub fn new(store: S, notifier: N) -> Self {
        let issuer = TicketIssuer::new(store.clone());
        Self::with_issuer(store, issuer, notifier)
    }

    /// Creates a coordinator with a custom ticket issuer.
    pub fn with_issuer(store: S, issuer: TicketIssuer<S>, notifier: N) -> Self {
        Self {
            store,
            issuer,
            notifier,
            locks: CartLocks::new(),
        }
    }

    /// Purchases whatever the cart's current stock allows.
    #[tracing::instrument(skip(self, purchaser), fields(purchaser = %purchaser.email))]
    pub async fn checkout(&self, cart_id: CartId, purchaser: &Purchaser) -> Result<CheckoutReceipt> {
        metrics::counter!("checkout_executions_total").increment(1);
        let started = Instant::now();

        let result = self.run(cart_id, purchaser).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("checkout_duration_seconds").record(duration);
        match &result {
            Ok(receipt) => {
                metrics::counter!("checkout_completed_total").increment(1);
                metrics::histogram!("checkout_amount_cents")
                    .record(receipt.total_amount.cents() as f64);
                tracing::info!(
                    %cart_id,
                    code = %receipt.ticket.code(),
                    amount = %receipt.total_amount,
                    duration,
                    "checkout completed"
                );
            }
            Err(e) => {
                let stage = e.stage();
                metrics::counter!("checkout_failed_total", "stage" => stage.as_str())
                    .increment(1);
                tracing::warn!(%cart_id, %stage, error = %e, "checkout failed");
            }
        }
        result
    }

    async fn run(&self, cart_id: CartId, purchaser: &Purchaser) -> Result<CheckoutReceipt> {
        let _claim = self.locks.acquire(cart_id).await;

        tracing::debug!(stage = %CheckoutStage::ValidateCart, "checkout stage");
        let cart = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or(CheckoutError::CartNotFound(cart_id))?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart(cart_id));
        }

        tracing::debug!(stage = %CheckoutStage::Reconcile, "checkout stage");
        let levels = self.stock_levels(&cart).await?;
        let reconciliation = reconcile(cart.items(), |id| levels.get(id).cloned())
            .map_err(|e| CheckoutError::from_reconcile(cart_id, e))?;

        let mut compensations: Vec<Compensation> = Vec::new();

        tracing::debug!(stage = %CheckoutStage::PersistStock, "checkout stage");
        for update in &reconciliation.stock_updates {
            match self
                .store
                .decrement_stock(&update.product_id, update.decrement)
                .await
            {
                Ok(new_stock) => {
                    tracing::debug!(
                        product_id = %update.product_id,
                        decrement = update.decrement,
                        new_stock,
                        "stock decremented"
                    );
                    compensations.push(Compensation::RestoreStock {
                        product_id: update.product_id.clone(),
                        quantity: update.decrement,
                    });
                }
                Err(source) => {
                    let err = CheckoutError::StockUpdate {
                        product_id: update.product_id.clone(),
                        source,
                    };
                    return Err(self.abort(cart_id, compensations, err).await);
                }
            }
        }

        tracing::debug!(stage = %CheckoutStage::PersistCart, "checkout stage");
        let cart_changes = reconciliation
            .outcomes
            .iter()
            .filter(|o| o.status != FulfillmentStatus::OutOfStock);
        let mut snapshot_taken = false;
        for outcome in cart_changes {
            if !snapshot_taken {
                compensations.push(Compensation::RestoreCart(cart.clone()));
                snapshot_taken = true;
            }
            let written = match outcome.status {
                FulfillmentStatus::Fulfilled => {
                    self.store
                        .remove_cart_item(&outcome.product_id, cart_id)
                        .await
                }
                _ => {
                    self.store
                        .update_cart_quantity(
                            &outcome.product_id,
                            cart_id,
                            outcome.remaining_quantity,
                        )
                        .await
                }
            };
            if let Err(source) = written {
                let err = CheckoutError::CartUpdate { cart_id, source };
                return Err(self.abort(cart_id, compensations, err).await);
            }
        }

        tracing::debug!(stage = %CheckoutStage::IssueTicket, "checkout stage");
        let request = NewTicket::new(reconciliation.total_amount, purchaser.email.clone());
        let ticket = match self.issuer.issue(request).await {
            Ok(ticket) => ticket,
            Err(err) => return Err(self.abort(cart_id, compensations, err).await),
        };

        tracing::debug!(stage = %CheckoutStage::Notify, "checkout stage");
        let receipt = Receipt::for_ticket(&ticket, purchaser);
        if let Err(e) = self.notifier.send_receipt(&receipt).await {
            metrics::counter!("notification_failures_total").increment(1);
            tracing::warn!(code = %ticket.code(), error = %e, "receipt not delivered");
        }

        tracing::debug!(stage = %CheckoutStage::Respond, "checkout stage");
        Ok(CheckoutReceipt {
            message: reconciliation.summary(),
            ticket,
            outcomes: reconciliation.outcomes,
            total_amount: reconciliation.total_amount,
            remaining_items: reconciliation.updated_cart,
        })
    }

    /// Looks up each distinct product of the cart, one at a time.
    ///
    /// Unknown products are left out; reconciliation reports them.
    async fn stock_levels(&self, cart: &Cart) -> Result<HashMap<ProductId, StockLevel>> {
        let mut levels = HashMap::new();
        for item in cart.items() {
            if levels.contains_key(&item.product_id) {
                continue;
            }
            let product = self
                .store
                .get_product(&item.product_id)
                .await
                .map_err(CheckoutError::StockLookup)?;
            if let Some(product) = product {
                levels.insert(item.product_id.clone(), product.stock_level());
            }
        }
        Ok(levels)
    }

    /// Runs compensations in reverse order and hands back the error.
    #[tracing::instrument(skip(self, compensations, err), fields(stage = %err.stage()))]
    async fn abort(
        &self,
        cart_id: CartId,
        compensations: Vec<Compensation>,
        err: CheckoutError,
    ) -> CheckoutError {
        if compensations.is_empty() {
            return err;
        }
        tracing::warn!(%cart_id, count = compensations.len(), error = %err, "compensating checkout");

        for compensation in compensations.into_iter().rev() {
            let name = compensation.name();
            let undone = match &compensation {
                Compensation::RestoreStock {
                    product_id,
                    quantity,
                } => self
                    .store
                    .increment_stock(product_id, *quantity)
                    .await
                    .map(|_| ()),
                Compensation::RestoreCart(snapshot) => self.store.save_cart(snapshot).await,
            };

            match undone {
                Ok(()) => {
                    metrics::counter!("checkout_compensations_total").increment(1);
                    tracing::debug!(compensation = name, "compensation applied");
                }
                Err(e) => {
                    metrics::counter!("checkout_compensation_failures_total").increment(1);
                    tracing::error!(
                        %cart_id,
                        compensation = name,
                        ?compensation,
                        error = %e,
                        "compensation failed"
                    );
                }
            }
        }
        err
    }
}
