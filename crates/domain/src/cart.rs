//! Shopping cart and its line items.

use common::CartId;
use serde::{Deserialize, Serialize};

use crate::error::CartError;
use crate::value_objects::ProductId;

/// One (product, quantity) pairing inside a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartLineItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A shopping cart.
///
/// Line items keep insertion order and never share a product: adding a
/// product that is already present merges into the existing line. Every
/// line has a quantity of at least one. Carts are emptied, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CartRecord")]
pub struct Cart {
    id: CartId,
    items: Vec<CartLineItem>,
}

/// Stored shape of a cart; loading goes through `Cart::from_items`.
#[derive(Deserialize)]
struct CartRecord {
    id: CartId,
    #[serde(default)]
    items: Vec<CartLineItem>,
}

impl TryFrom<CartRecord> for Cart {
    type Error = CartError;

    fn try_from(record: CartRecord) -> Result<Self, Self::Error> {
        Cart::from_items(record.id, record.items)
    }
}

impl Cart {
    /// Creates an empty cart.
    pub fn new(id: CartId) -> Self {
        Self {
            id,
            items: Vec::new(),
        }
    }

    /// Rebuilds a cart from stored lines, re-establishing the invariants.
    pub fn from_items(id: CartId, items: Vec<CartLineItem>) -> Result<Self, CartError> {
        let mut cart = Self::new(id);
        cart.replace_items(items)?;
        Ok(cart)
    }

    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    pub fn get_item(&self, product_id: &ProductId) -> Option<&CartLineItem> {
        self.items.iter().find(|i| &i.product_id == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Adds `quantity` units of a product, merging with an existing line.
    ///
    /// A merge that would not fit in a `u32` fails and leaves the line as it was.
    pub fn add_item(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(quantity)
                    .ok_or(CartError::QuantityOverflow { product_id })?;
            }
            None => self.items.push(CartLineItem {
                product_id,
                quantity,
            }),
        }
        Ok(())
    }

    /// Removes the line for a product.
    pub fn remove_item(&mut self, product_id: &ProductId) -> Result<(), CartError> {
        let index = self.position(product_id)?;
        self.items.remove(index);
        Ok(())
    }

    /// Sets the quantity of an existing line; zero removes the line.
    ///
    /// Setting the same quantity twice leaves the cart unchanged.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: u32) -> Result<(), CartError> {
        let index = self.position(product_id)?;
        if quantity == 0 {
            self.items.remove(index);
        } else {
            self.items[index].quantity = quantity;
        }
        Ok(())
    }

    /// Replaces every line. Duplicate products are merged and zero
    /// quantities dropped.
    ///
    /// On error the cart keeps its previous lines.
    pub fn replace_items(&mut self, items: Vec<CartLineItem>) -> Result<(), CartError> {
        let mut replaced = Self::new(self.id);
        for item in items.into_iter().filter(|i| i.quantity > 0) {
            replaced.add_item(item.product_id, item.quantity)?;
        }
        self.items = replaced.items;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn position(&self, product_id: &ProductId) -> Result<usize, CartError> {
        self.items
            .iter()
            .position(|i| &i.product_id == product_id)
            .ok_or_else(|| CartError::ItemNotFound {
                product_id: product_id.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ProductId {
        ProductId::new(s)
    }

    #[test]
    fn add_item_merges_existing_line() {
        let mut cart = Cart::new(CartId::new());
        cart.add_item(pid("a"), 1).unwrap();
        cart.add_item(pid("b"), 2).unwrap();
        cart.add_item(pid("a"), 3).unwrap();

        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.get_item(&pid("a")).unwrap().quantity, 4);
        assert_eq!(cart.items()[0].product_id, pid("a"));
    }

    #[test]
    fn add_item_rejects_zero_quantity() {
        let mut cart = Cart::new(CartId::new());
        let err = cart.add_item(pid("a"), 0).unwrap_err();
        assert_eq!(err, CartError::InvalidQuantity { quantity: 0 });
        assert!(cart.is_empty());
    }

    #[test]
    fn remove_missing_item_fails() {
        let mut cart = Cart::new(CartId::new());
        assert!(matches!(
            cart.remove_item(&pid("x")),
            Err(CartError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn set_quantity_is_idempotent_and_zero_removes() {
        let mut cart = Cart::new(CartId::new());
        cart.add_item(pid("a"), 5).unwrap();

        cart.set_quantity(&pid("a"), 3).unwrap();
        let once = cart.clone();
        cart.set_quantity(&pid("a"), 3).unwrap();
        assert_eq!(cart, once);

        cart.set_quantity(&pid("a"), 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn from_items_merges_duplicates_and_drops_zeroes() {
        let cart = Cart::from_items(
            CartId::new(),
            vec![
                CartLineItem::new("a", 1),
                CartLineItem::new("b", 0),
                CartLineItem::new("a", 2),
            ],
        )
        .unwrap();
        assert_eq!(cart.items(), &[CartLineItem::new("a", 3)]);
    }

    #[test]
    fn add_item_overflow_keeps_the_line() {
        let mut cart = Cart::new(CartId::new());
        cart.add_item(pid("a"), u32::MAX).unwrap();

        let err = cart.add_item(pid("a"), 1).unwrap_err();
        assert_eq!(err, CartError::QuantityOverflow { product_id: pid("a") });
        assert_eq!(cart.get_item(&pid("a")).unwrap().quantity, u32::MAX);
    }

    #[test]
    fn from_items_rejects_merges_that_overflow() {
        let err = Cart::from_items(
            CartId::new(),
            vec![CartLineItem::new("a", u32::MAX), CartLineItem::new("a", 1)],
        )
        .unwrap_err();
        assert!(matches!(err, CartError::QuantityOverflow { .. }));
    }

    #[test]
    fn failed_replace_keeps_previous_lines() {
        let mut cart = Cart::new(CartId::new());
        cart.add_item(pid("b"), 2).unwrap();

        let result = cart.replace_items(vec![
            CartLineItem::new("a", u32::MAX),
            CartLineItem::new("a", u32::MAX),
        ]);
        assert!(result.is_err());
        assert_eq!(cart.items(), &[CartLineItem::new("b", 2)]);
    }

    #[test]
    fn deserializing_an_overflowing_cart_fails() {
        let id = CartId::new();
        let max = u32::MAX;
        let json = format!(
            r#"{{"id":"{id}","items":[{{"product_id":"a","quantity":{max}}},{{"product_id":"a","quantity":1}}]}}"#
        );
        assert!(serde_json::from_str::<Cart>(&json).is_err());
    }

    #[test]
    fn deserializing_restores_invariants() {
        let id = CartId::new();
        let json = format!(
            r#"{{"id":"{id}","items":[{{"product_id":"a","quantity":1}},{{"product_id":"a","quantity":1}}]}}"#
        );
        let cart: Cart = serde_json::from_str(&json).unwrap();
        assert_eq!(cart.items(), &[CartLineItem::new("a", 2)]);
    }

    #[test]
    fn clear_keeps_the_cart_id() {
        let id = CartId::new();
        let mut cart = Cart::new(id);
        cart.add_item(pid("a"), 1).unwrap();
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.id(), id);
    }
}
