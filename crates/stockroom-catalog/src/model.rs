//! Catalog records and request shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Maximum length for a product or category name.
pub const MAX_NAME_LEN: usize = 255;
/// Maximum length for a product or category description.
pub const MAX_DESCRIPTION_LEN: usize = 4096;

/// A product in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
    /// IDs of the categories this product belongs to, ascending.
    pub categories: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// IDs of the products in this category, ascending.
    pub products: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub stock: i64,
    #[serde(default)]
    pub categories: Vec<i64>,
}

/// Partial update of a product. Only `Some` fields are applied.
///
/// `categories: Some(vec![])` clears every association, while `None` leaves
/// them untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub categories: Option<Vec<i64>>,
}

/// Parameters for creating a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub products: Vec<i64>,
}

/// Partial update of a category. Only `Some` fields are applied.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub products: Option<Vec<i64>>,
}

/// Scalar fields of a product captured before a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSnapshot {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
}

impl From<&Product> for ProductSnapshot {
    fn from(p: &Product) -> Self {
        Self {
            name: p.name.clone(),
            description: p.description.clone(),
            price: p.price,
            stock: p.stock,
        }
    }
}

/// A row of the product audit trail: the price and stock a product had
/// immediately before the change made at `changed_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub product_id: i64,
    pub price: f64,
    pub stock: i64,
    pub changed_at: DateTime<Utc>,
}

/// A history row that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryRecord {
    pub product_id: i64,
    pub price: f64,
    pub stock: i64,
    pub changed_at: DateTime<Utc>,
}

impl NewHistoryRecord {
    pub fn from_snapshot(product_id: i64, snapshot: &ProductSnapshot, changed_at: DateTime<Utc>) -> Self {
        Self {
            product_id,
            price: snapshot.price,
            stock: snapshot.stock,
            changed_at,
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), CatalogError> {
    if name.trim().is_empty() {
        return Err(CatalogError::Validation("name must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CatalogError::Validation(format!(
            "name exceeds {} bytes",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

pub(crate) fn validate_description(description: &str) -> Result<(), CatalogError> {
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(CatalogError::Validation(format!(
            "description exceeds {} bytes",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

pub(crate) fn validate_price(price: f64) -> Result<(), CatalogError> {
    if !price.is_finite() || price < 0.0 {
        return Err(CatalogError::Validation(
            "price must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_stock(stock: i64) -> Result<(), CatalogError> {
    if stock < 0 {
        return Err(CatalogError::Validation(
            "stock must not be negative".to_string(),
        ));
    }
    Ok(())
}
