//! The storage port used by the mutation pipeline, and its SQLite adapter.
//!
//! [`CatalogStore`] is implemented for [`rusqlite::Connection`], which also
//! covers a [`rusqlite::Transaction`] through `Deref`. The port itself opens
//! no transactions: every multi-statement write (association replacement in
//! particular) is only atomic when the caller runs it inside one, which is
//! what the `commit_*` wrappers in [`crate::pipeline`] do.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CatalogError, EntityKind};
use crate::model::{Category, HistoryRecord, NewCategory, NewHistoryRecord, NewProduct, Product};

/// Persistence operations the mutation pipeline depends on.
pub trait CatalogStore {
    /// Loads a product with its category IDs.
    fn get_product(&self, id: i64) -> Result<Product, CatalogError>;

    /// Returns the ID of the product holding exactly `name`, if any.
    fn find_product_by_name(&self, name: &str) -> Result<Option<i64>, CatalogError>;

    /// Inserts a product row (without associations) and returns its ID.
    fn insert_product(&self, product: &NewProduct, now: DateTime<Utc>) -> Result<i64, CatalogError>;

    /// Writes the scalar fields of `product` over the stored row.
    fn save_product(&self, product: &Product) -> Result<(), CatalogError>;

    /// Replaces the product's categories with those IDs that exist.
    /// Returns the resulting category IDs, ascending.
    fn replace_product_categories(
        &self,
        product_id: i64,
        category_ids: &[i64],
    ) -> Result<Vec<i64>, CatalogError>;

    /// Appends a row to the product audit trail.
    fn append_history(&self, record: &NewHistoryRecord) -> Result<HistoryRecord, CatalogError>;

    /// Loads a category with its product IDs.
    fn get_category(&self, id: i64) -> Result<Category, CatalogError>;

    /// Returns the ID of the category holding exactly `name`, if any.
    fn find_category_by_name(&self, name: &str) -> Result<Option<i64>, CatalogError>;

    /// Inserts a category row (without associations) and returns its ID.
    fn insert_category(&self, category: &NewCategory, now: DateTime<Utc>) -> Result<i64, CatalogError>;

    /// Writes the scalar fields of `category` over the stored row.
    fn save_category(&self, category: &Category) -> Result<(), CatalogError>;

    /// Replaces the category's products with those IDs that exist.
    /// Returns the resulting product IDs, ascending.
    fn replace_category_products(
        &self,
        category_id: i64,
        product_ids: &[i64],
    ) -> Result<Vec<i64>, CatalogError>;
}

/// Formats a timestamp the way every catalog table stores it.
///
/// Fixed-width RFC 3339 in UTC with microseconds, so text comparison in SQL
/// orders rows chronologically.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn map_row_to_product(row: &Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        stock: row.get(4)?,
        categories: Vec::new(),
        created_at: timestamp_column(row, 5)?,
        updated_at: timestamp_column(row, 6)?,
    })
}

pub(crate) fn map_row_to_category(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        products: Vec::new(),
        created_at: timestamp_column(row, 3)?,
        updated_at: timestamp_column(row, 4)?,
    })
}

pub(crate) fn map_row_to_history(row: &Row) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        id: row.get(0)?,
        product_id: row.get(1)?,
        price: row.get(2)?,
        stock: row.get(3)?,
        changed_at: timestamp_column(row, 4)?,
    })
}

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, name, description, price, stock, created_at, updated_at";
pub(crate) const CATEGORY_COLUMNS: &str = "id, name, description, created_at, updated_at";

fn collect_ids(conn: &Connection, sql: &str, owner_id: i64) -> Result<Vec<i64>, CatalogError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map([owner_id], |row| row.get(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

pub(crate) fn product_category_ids(conn: &Connection, product_id: i64) -> Result<Vec<i64>, CatalogError> {
    collect_ids(
        conn,
        "SELECT category_id FROM product_categories WHERE product_id = ?1 ORDER BY category_id",
        product_id,
    )
}

pub(crate) fn category_product_ids(conn: &Connection, category_id: i64) -> Result<Vec<i64>, CatalogError> {
    collect_ids(
        conn,
        "SELECT product_id FROM product_categories WHERE category_id = ?1 ORDER BY product_id",
        category_id,
    )
}

impl CatalogStore for Connection {
    fn get_product(&self, id: i64) -> Result<Product, CatalogError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let mut product = self
            .query_row(&sql, [id], map_row_to_product)
            .optional()?
            .ok_or(CatalogError::NotFound {
                kind: EntityKind::Product,
                id,
            })?;
        product.categories = product_category_ids(self, id)?;
        Ok(product)
    }

    fn find_product_by_name(&self, name: &str) -> Result<Option<i64>, CatalogError> {
        Ok(self
            .query_row("SELECT id FROM products WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn insert_product(&self, product: &NewProduct, now: DateTime<Utc>) -> Result<i64, CatalogError> {
        let ts = format_timestamp(now);
        self.execute(
            "INSERT INTO products (name, description, price, stock, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![product.name, product.description, product.price, product.stock, ts],
        )
        .map_err(|e| CatalogError::from_write(e, EntityKind::Product, &product.name))?;
        Ok(self.last_insert_rowid())
    }

    fn save_product(&self, product: &Product) -> Result<(), CatalogError> {
        let count = self
            .execute(
                "UPDATE products
                 SET name = ?1, description = ?2, price = ?3, stock = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    product.name,
                    product.description,
                    product.price,
                    product.stock,
                    format_timestamp(product.updated_at),
                    product.id,
                ],
            )
            .map_err(|e| CatalogError::from_write(e, EntityKind::Product, &product.name))?;
        if count == 0 {
            return Err(CatalogError::NotFound {
                kind: EntityKind::Product,
                id: product.id,
            });
        }
        Ok(())
    }

    fn replace_product_categories(
        &self,
        product_id: i64,
        category_ids: &[i64],
    ) -> Result<Vec<i64>, CatalogError> {
        self.execute(
            "DELETE FROM product_categories WHERE product_id = ?1",
            [product_id],
        )?;
        // The SELECT yields no row for an unknown category, so unresolved
        // IDs are skipped rather than violating the foreign key.
        {
            let mut stmt = self.prepare_cached(
                "INSERT OR IGNORE INTO product_categories (product_id, category_id)
                 SELECT ?1, id FROM categories WHERE id = ?2",
            )?;
            for category_id in category_ids {
                stmt.execute(params![product_id, category_id])?;
            }
        }
        product_category_ids(self, product_id)
    }

    fn append_history(&self, record: &NewHistoryRecord) -> Result<HistoryRecord, CatalogError> {
        self.execute(
            "INSERT INTO product_history (product_id, price, stock, changed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.product_id,
                record.price,
                record.stock,
                format_timestamp(record.changed_at),
            ],
        )?;
        Ok(HistoryRecord {
            id: self.last_insert_rowid(),
            product_id: record.product_id,
            price: record.price,
            stock: record.stock,
            changed_at: record.changed_at,
        })
    }

    fn get_category(&self, id: i64) -> Result<Category, CatalogError> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1");
        let mut category = self
            .query_row(&sql, [id], map_row_to_category)
            .optional()?
            .ok_or(CatalogError::NotFound {
                kind: EntityKind::Category,
                id,
            })?;
        category.products = category_product_ids(self, id)?;
        Ok(category)
    }

    fn find_category_by_name(&self, name: &str) -> Result<Option<i64>, CatalogError> {
        Ok(self
            .query_row("SELECT id FROM categories WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn insert_category(&self, category: &NewCategory, now: DateTime<Utc>) -> Result<i64, CatalogError> {
        let ts = format_timestamp(now);
        self.execute(
            "INSERT INTO categories (name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![category.name, category.description, ts],
        )
        .map_err(|e| CatalogError::from_write(e, EntityKind::Category, &category.name))?;
        Ok(self.last_insert_rowid())
    }

    fn save_category(&self, category: &Category) -> Result<(), CatalogError> {
        let count = self
            .execute(
                "UPDATE categories SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    category.name,
                    category.description,
                    format_timestamp(category.updated_at),
                    category.id,
                ],
            )
            .map_err(|e| CatalogError::from_write(e, EntityKind::Category, &category.name))?;
        if count == 0 {
            return Err(CatalogError::NotFound {
                kind: EntityKind::Category,
                id: category.id,
            });
        }
        Ok(())
    }

    fn replace_category_products(
        &self,
        category_id: i64,
        product_ids: &[i64],
    ) -> Result<Vec<i64>, CatalogError> {
        self.execute(
            "DELETE FROM product_categories WHERE category_id = ?1",
            [category_id],
        )?;
        {
            let mut stmt = self.prepare_cached(
                "INSERT OR IGNORE INTO product_categories (product_id, category_id)
                 SELECT id, ?1 FROM products WHERE id = ?2",
            )?;
            for product_id in product_ids {
                stmt.execute(params![category_id, product_id])?;
            }
        }
        category_product_ids(self, category_id)
    }
}
