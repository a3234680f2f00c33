//! Catalog entry.

use serde::{Deserialize, Serialize};

use crate::error::ProductError;
use crate::reconcile::StockLevel;
use crate::value_objects::{Money, ProductId};

fn default_owner() -> String {
    "admin".to_string()
}

fn default_status() -> bool {
    true
}

/// A product in the catalog.
///
/// `stock` is unsigned, so a negative inventory cannot be represented.
/// Negative prices are rejected on load and by [`Product::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProductRecord")]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    /// Email of the account that listed the product, or `admin`.
    pub owner: String,
    pub category: String,
    /// Whether the product is listed.
    pub status: bool,
}

/// Stored shape of a product; loading goes through `Product::validate`.
#[derive(Deserialize)]
struct ProductRecord {
    id: ProductId,
    title: String,
    #[serde(default)]
    description: String,
    price: Money,
    stock: u32,
    #[serde(default = "default_owner")]
    owner: String,
    #[serde(default)]
    category: String,
    #[serde(default = "default_status")]
    status: bool,
}

impl TryFrom<ProductRecord> for Product {
    type Error = ProductError;

    fn try_from(record: ProductRecord) -> Result<Self, Self::Error> {
        let product = Product {
            id: record.id,
            title: record.title,
            description: record.description,
            price: record.price,
            stock: record.stock,
            owner: record.owner,
            category: record.category,
            status: record.status,
        };
        product.validate()?;
        Ok(product)
    }
}

impl Product {
    /// Creates a listed product owned by `admin`.
    pub fn new(
        id: impl Into<ProductId>,
        title: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            price,
            stock,
            owner: default_owner(),
            category: String::new(),
            status: true,
        }
    }

    /// Checks the catalog rules a stored product must satisfy.
    pub fn validate(&self) -> Result<(), ProductError> {
        if self.price.is_negative() {
            return Err(ProductError::NegativePrice {
                product_id: self.id.clone(),
                price: self.price,
            });
        }
        Ok(())
    }

    /// Snapshot of the fields the reconciliation engine needs.
    pub fn stock_level(&self) -> StockLevel {
        StockLevel {
            title: self.title.clone(),
            stock: self.stock,
            unit_price: self.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_fields_take_defaults() {
        let json = r#"{"id":"p1","title":"Mate","price":1500,"stock":4}"#;
        let product: Product = serde_json::from_str(json).unwrap();
        assert_eq!(product.owner, "admin");
        assert!(product.status);
        assert!(product.description.is_empty());
        assert_eq!(product.price, Money::from_cents(1500));
    }

    #[test]
    fn negative_stock_is_rejected_on_load() {
        let json = r#"{"id":"p1","title":"Mate","price":1500,"stock":-1}"#;
        assert!(serde_json::from_str::<Product>(json).is_err());
    }

    #[test]
    fn negative_price_is_rejected_on_load() {
        let json = r#"{"id":"p1","title":"Mate","price":-500,"stock":5}"#;
        let err = serde_json::from_str::<Product>(json).unwrap_err();
        assert!(err.to_string().contains("negative price"));
    }

    #[test]
    fn validate_flags_negative_price() {
        let mut product = Product::new("p1", "Mate", Money::zero(), 4);
        assert!(product.validate().is_ok());

        product.price = Money::from_cents(-1);
        assert_eq!(
            product.validate(),
            Err(ProductError::NegativePrice {
                product_id: ProductId::new("p1"),
                price: Money::from_cents(-1),
            })
        );
    }

    #[test]
    fn stock_level_copies_price_and_stock() {
        let product = Product::new("p1", "Mate", Money::from_units(15), 4);
        let level = product.stock_level();
        assert_eq!(level.stock, 4);
        assert_eq!(level.unit_price, Money::from_units(15));
        assert_eq!(level.title, "Mate");
    }
}
