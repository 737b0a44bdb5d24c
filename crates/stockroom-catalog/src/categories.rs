//! Category reads and deletion.

use std::collections::HashMap;

use rusqlite::Connection;
use stockroom_db::begin_write;

use crate::error::CatalogError;
use crate::model::Category;
use crate::store::{map_row_to_category, CatalogStore, CATEGORY_COLUMNS};

/// Lists all categories ordered by name, each with its product IDs.
pub fn list_categories(conn: &Connection) -> Result<Vec<Category>, CatalogError> {
    let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT category_id, product_id FROM product_categories
             ORDER BY category_id, product_id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (category_id, product_id) = row?;
            links.entry(category_id).or_default().push(product_id);
        }
    }

    let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_row_to_category)?;
    let mut categories = Vec::new();
    for row in rows {
        let mut category = row?;
        category.products = links.remove(&category.id).unwrap_or_default();
        categories.push(category);
    }
    Ok(categories)
}

/// Retrieves a category by ID.
pub fn get_category(conn: &Connection, id: i64) -> Result<Category, CatalogError> {
    conn.get_category(id)
}

/// Deletes a category and its product links, returning the removed record.
pub fn delete_category(conn: &mut Connection, id: i64) -> Result<Category, CatalogError> {
    let tx = begin_write(conn)?;
    let category = tx.get_category(id)?;
    tx.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewCategory, NewProduct};
    use crate::pipeline::{commit_category_create, commit_product_create};

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("failed to open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        stockroom_db::run_migrations(&conn).expect("migrations failed");
        conn
    }

    #[test]
    fn delete_category_unlinks_products() {
        let mut conn = setup_db();
        let garden = commit_category_create(
            &mut conn,
            &NewCategory {
                name: "Garden".to_string(),
                description: String::new(),
                products: vec![],
            },
        )
        .unwrap();
        let hose = commit_product_create(
            &mut conn,
            &NewProduct {
                name: "Hose".to_string(),
                description: String::new(),
                price: 20.0,
                stock: 3,
                categories: vec![garden.id],
            },
        )
        .unwrap();
        assert_eq!(hose.categories, vec![garden.id]);

        let listed = list_categories(&conn).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].products, vec![hose.id]);

        delete_category(&mut conn, garden.id).expect("delete failed");
        assert!(conn.get_product(hose.id).unwrap().categories.is_empty());
        assert!(matches!(
            get_category(&conn, garden.id),
            Err(CatalogError::NotFound { .. })
        ));
    }
}
