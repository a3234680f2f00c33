//! Stock reconciliation: matching cart demand against live stock.
//!
//! [`reconcile`] is pure. It reads stock and prices through a lookup,
//! decides per line item how much can be fulfilled, and returns what the
//! caller has to persist: the new stock per product, the cart lines that
//! remain, and the amount to charge. Nothing is written here, so a failed
//! lookup always aborts before any mutation.
//!
//! Per line item, in cart order:
//!
//! | stock            | fulfilled  | cart line            | new stock         |
//! |------------------|------------|----------------------|-------------------|
//! | `0`              | 0          | unchanged            | unchanged         |
//! | `qty <= stock`   | `qty`      | removed              | `stock - qty`     |
//! | `qty > stock`    | `stock`    | reduced to remainder | `0`               |
//!
//! Zero stock is checked first. Quantity equal to stock is a full
//! fulfillment.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cart::CartLineItem;
use crate::error::ReconcileError;
use crate::value_objects::{Money, ProductId};

/// Fallback message when every line was fulfilled.
pub const ALL_ITEMS_APPROVED: &str = "All items approved.";

/// Live stock and price of one product, as seen at checkout time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub title: String,
    pub stock: u32,
    pub unit_price: Money,
}

/// How a line item was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    /// Requested quantity fully purchased; line removed from the cart.
    Fulfilled,
    /// Stock ran out; the remainder stays in the cart.
    PartiallyFulfilled,
    /// Nothing purchased; line left untouched.
    OutOfStock,
}

/// Per-line result of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub product_id: ProductId,
    pub title: String,
    pub requested_quantity: u32,
    pub fulfilled_quantity: u32,
    pub remaining_quantity: u32,
    pub unit_price: Money,
    pub status: FulfillmentStatus,
}

impl ReconciliationOutcome {
    /// Amount charged for this line, or `None` if it overflows.
    pub fn charged(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.fulfilled_quantity)
    }

    /// Notice shown to the purchaser; empty for a full fulfillment.
    pub fn status_message(&self) -> String {
        match self.status {
            FulfillmentStatus::Fulfilled => String::new(),
            FulfillmentStatus::OutOfStock => format!(
                "Product '{}' could not be purchased: out of stock.",
                self.title
            ),
            FulfillmentStatus::PartiallyFulfilled => format!(
                "The purchase could not be fully completed: stock of '{}' is exhausted. \
                 The quantity was reduced and the {} units that exceeded the stock remain in your cart.",
                self.title, self.remaining_quantity
            ),
        }
    }
}

/// Stock change for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub product_id: ProductId,
    pub previous_stock: u32,
    pub new_stock: u32,
    /// Units taken out of stock; always `previous_stock - new_stock`.
    pub decrement: u32,
}

/// Everything a checkout has to persist and report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// One entry per cart line, in cart order.
    pub outcomes: Vec<ReconciliationOutcome>,
    /// Sum of fulfilled quantity times unit price.
    pub total_amount: Money,
    /// Cart lines left after the purchase.
    pub updated_cart: Vec<CartLineItem>,
    /// Products whose stock changes, in order of first appearance.
    pub stock_updates: Vec<StockUpdate>,
}

impl Reconciliation {
    /// Non-empty notices, in cart order.
    pub fn notices(&self) -> impl Iterator<Item = String> + '_ {
        self.outcomes
            .iter()
            .map(ReconciliationOutcome::status_message)
            .filter(|m| !m.is_empty())
    }

    /// All notices concatenated, or [`ALL_ITEMS_APPROVED`] when there are none.
    pub fn summary(&self) -> String {
        let joined: String = self.notices().collect();
        if joined.is_empty() {
            ALL_ITEMS_APPROVED.to_string()
        } else {
            joined
        }
    }

    /// Stock per product after the purchase.
    pub fn stock_deltas(&self) -> HashMap<ProductId, u32> {
        self.stock_updates
            .iter()
            .map(|u| (u.product_id.clone(), u.new_stock))
            .collect()
    }
}

/// Reconciles cart lines against live stock.
///
/// `lookup` is called once per distinct product. Any product it cannot
/// resolve fails the whole reconciliation with
/// [`ReconcileError::ProductLookup`]; a negative unit price fails it with
/// [`ReconcileError::NegativePrice`].
///
/// Lines sharing a product (which a well-formed [`crate::Cart`] never
/// has) draw from the same working stock, so stock is never
/// over-committed, and their remainders are merged into one line.
pub fn reconcile<F>(items: &[CartLineItem], mut lookup: F) -> Result<Reconciliation, ReconcileError>
where
    F: FnMut(&ProductId) -> Option<StockLevel>,
{
    if items.is_empty() {
        return Err(ReconcileError::EmptyCart);
    }

    let mut order: Vec<ProductId> = Vec::new();
    let mut levels: HashMap<ProductId, StockLevel> = HashMap::new();
    for item in items {
        if levels.contains_key(&item.product_id) {
            continue;
        }
        let level = lookup(&item.product_id).ok_or_else(|| ReconcileError::ProductLookup {
            product_id: item.product_id.clone(),
        })?;
        if level.unit_price.is_negative() {
            return Err(ReconcileError::NegativePrice {
                product_id: item.product_id.clone(),
            });
        }
        order.push(item.product_id.clone());
        levels.insert(item.product_id.clone(), level);
    }
    let initial: HashMap<ProductId, u32> = levels
        .iter()
        .map(|(id, level)| (id.clone(), level.stock))
        .collect();

    let mut outcomes = Vec::with_capacity(items.len());
    let mut updated_cart: Vec<CartLineItem> = Vec::new();
    let mut total_amount = Money::zero();

    for item in items {
        let level = levels
            .get_mut(&item.product_id)
            .ok_or_else(|| ReconcileError::ProductLookup {
                product_id: item.product_id.clone(),
            })?;

        let (fulfilled, status) = if level.stock == 0 {
            (0, FulfillmentStatus::OutOfStock)
        } else if item.quantity <= level.stock {
            (item.quantity, FulfillmentStatus::Fulfilled)
        } else {
            (level.stock, FulfillmentStatus::PartiallyFulfilled)
        };

        let overflow = || ReconcileError::Overflow {
            product_id: item.product_id.clone(),
        };

        level.stock -= fulfilled;
        let remaining = item.quantity - fulfilled;
        if remaining > 0 {
            match updated_cart
                .iter_mut()
                .find(|line| line.product_id == item.product_id)
            {
                Some(line) => {
                    line.quantity = line.quantity.checked_add(remaining).ok_or_else(overflow)?;
                }
                None => updated_cart.push(CartLineItem {
                    product_id: item.product_id.clone(),
                    quantity: remaining,
                }),
            }
        }

        let outcome = ReconciliationOutcome {
            product_id: item.product_id.clone(),
            title: level.title.clone(),
            requested_quantity: item.quantity,
            fulfilled_quantity: fulfilled,
            remaining_quantity: remaining,
            unit_price: level.unit_price,
            status,
        };
        total_amount = outcome
            .charged()
            .and_then(|charged| total_amount.checked_add(charged))
            .ok_or_else(overflow)?;
        outcomes.push(outcome);
    }

    let stock_updates = order
        .into_iter()
        .filter_map(|product_id| {
            let previous_stock = *initial.get(&product_id)?;
            let new_stock = levels.get(&product_id)?.stock;
            (new_stock != previous_stock).then(|| StockUpdate {
                product_id,
                previous_stock,
                new_stock,
                decrement: previous_stock - new_stock,
            })
        })
        .collect();

    Ok(Reconciliation {
        outcomes,
        total_amount,
        updated_cart,
        stock_updates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(stock: u32, price: i64) -> StockLevel {
        StockLevel {
            title: "Widget".to_string(),
            stock,
            unit_price: Money::from_units(price),
        }
    }

    fn single(qty: u32, stock: u32) -> Reconciliation {
        let items = vec![CartLineItem::new("p", qty)];
        reconcile(&items, |_| Some(level(stock, 100))).unwrap()
    }

    #[test]
    fn empty_cart_is_rejected() {
        let result = reconcile(&[], |_| Some(level(1, 1)));
        assert_eq!(result.unwrap_err(), ReconcileError::EmptyCart);
    }

    #[test]
    fn missing_product_fails_the_whole_batch() {
        let items = vec![CartLineItem::new("known", 1), CartLineItem::new("ghost", 1)];
        let result = reconcile(&items, |id| (id.as_str() == "known").then(|| level(5, 10)));
        assert_eq!(
            result.unwrap_err(),
            ReconcileError::ProductLookup {
                product_id: ProductId::new("ghost")
            }
        );
    }

    #[test]
    fn quantity_equal_to_stock_is_a_full_fulfillment() {
        let r = single(4, 4);
        assert_eq!(r.outcomes[0].status, FulfillmentStatus::Fulfilled);
        assert_eq!(r.stock_updates[0].new_stock, 0);
        assert!(r.updated_cart.is_empty());
        assert_eq!(r.summary(), ALL_ITEMS_APPROVED);
    }

    #[test]
    fn zero_stock_takes_precedence() {
        let r = single(1, 0);
        assert_eq!(r.outcomes[0].status, FulfillmentStatus::OutOfStock);
        assert!(r.stock_updates.is_empty());
        assert_eq!(r.updated_cart, vec![CartLineItem::new("p", 1)]);
        assert!(r.total_amount.is_zero());
    }

    #[test]
    fn partial_fulfillment_keeps_the_remainder() {
        let r = single(5, 2);
        let outcome = &r.outcomes[0];
        assert_eq!(outcome.fulfilled_quantity, 2);
        assert_eq!(outcome.remaining_quantity, 3);
        assert_eq!(r.updated_cart, vec![CartLineItem::new("p", 3)]);
        assert_eq!(r.stock_updates[0].decrement, 2);
        assert!(outcome.status_message().contains("3 units"));
    }

    #[test]
    fn duplicate_lines_share_working_stock() {
        let items = vec![CartLineItem::new("p", 3), CartLineItem::new("p", 3)];
        let r = reconcile(&items, |_| Some(level(4, 10))).unwrap();

        assert_eq!(r.outcomes[0].fulfilled_quantity, 3);
        assert_eq!(r.outcomes[1].fulfilled_quantity, 1);
        assert_eq!(r.stock_updates.len(), 1);
        assert_eq!(r.stock_updates[0].previous_stock, 4);
        assert_eq!(r.stock_updates[0].new_stock, 0);
        assert_eq!(r.total_amount, Money::from_units(40));
    }

    #[test]
    fn duplicate_line_remainders_merge_into_one_line() {
        let items = vec![
            CartLineItem::new("p", 3),
            CartLineItem::new("q", 1),
            CartLineItem::new("p", 2),
        ];
        let r = reconcile(&items, |id| {
            Some(level(if id.as_str() == "p" { 1 } else { 5 }, 10))
        })
        .unwrap();

        assert_eq!(r.updated_cart, vec![CartLineItem::new("p", 4)]);
        assert_eq!(r.total_amount, Money::from_units(20));
    }

    #[test]
    fn negative_price_is_rejected_before_anything_is_decided() {
        let items = vec![CartLineItem::new("p", 2)];
        let result = reconcile(&items, |_| {
            Some(StockLevel {
                title: "Refund".to_string(),
                stock: 5,
                unit_price: Money::from_cents(-500),
            })
        });
        assert_eq!(
            result.unwrap_err(),
            ReconcileError::NegativePrice {
                product_id: ProductId::new("p")
            }
        );
    }

    #[test]
    fn amount_overflow_is_an_error() {
        let items = vec![CartLineItem::new("p", u32::MAX)];
        let result = reconcile(&items, |_| {
            Some(StockLevel {
                title: "Yacht".to_string(),
                stock: u32::MAX,
                unit_price: Money::from_cents(i64::MAX / 2),
            })
        });
        assert_eq!(
            result.unwrap_err(),
            ReconcileError::Overflow {
                product_id: ProductId::new("p")
            }
        );
    }

    #[test]
    fn lookup_runs_once_per_product() {
        let items = vec![CartLineItem::new("a", 1), CartLineItem::new("a", 1)];
        let mut calls = 0;
        reconcile(&items, |_| {
            calls += 1;
            Some(level(9, 1))
        })
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn stock_deltas_map_new_stock() {
        let r = single(3, 5);
        assert_eq!(r.stock_deltas().get(&ProductId::new("p")), Some(&2));
    }
}
