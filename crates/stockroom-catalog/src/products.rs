//! Product reads and deletion.

use std::collections::HashMap;

use rusqlite::Connection;
use stockroom_db::begin_write;

use crate::error::CatalogError;
use crate::model::Product;
use crate::store::{map_row_to_product, CatalogStore, PRODUCT_COLUMNS};

/// Lists all products ordered by name, each with its category IDs.
pub fn list_products(conn: &Connection) -> Result<Vec<Product>, CatalogError> {
    let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT product_id, category_id FROM product_categories
             ORDER BY product_id, category_id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (product_id, category_id) = row?;
            links.entry(product_id).or_default().push(category_id);
        }
    }

    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_row_to_product)?;
    let mut products = Vec::new();
    for row in rows {
        let mut product = row?;
        product.categories = links.remove(&product.id).unwrap_or_default();
        products.push(product);
    }
    Ok(products)
}

/// Retrieves a product by ID.
pub fn get_product(conn: &Connection, id: i64) -> Result<Product, CatalogError> {
    conn.get_product(id)
}

/// Deletes a product and its category links, returning the removed record.
///
/// History rows are kept.
pub fn delete_product(conn: &mut Connection, id: i64) -> Result<Product, CatalogError> {
    let tx = begin_write(conn)?;
    let product = tx.get_product(id)?;
    tx.execute("DELETE FROM products WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(product)
}
