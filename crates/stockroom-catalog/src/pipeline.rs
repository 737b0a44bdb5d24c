//! The audited mutation pipeline.
//!
//! Every create and update goes through the same sequence: validate, enforce
//! name uniqueness, persist, resolve associations. Product updates also
//! archive the pre-change price and stock. The generic functions take any
//! [`CatalogStore`] and never commit anything themselves; the `commit_*`
//! wrappers run them inside a single SQLite transaction so that a product row
//! and its history row become visible together or not at all.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use stockroom_db::begin_write;

use crate::error::{CatalogError, EntityKind};
use crate::model::{
    validate_description, validate_name, validate_price, validate_stock, Category,
    CategoryChanges, NewCategory, NewHistoryRecord, NewProduct, Product, ProductChanges,
    ProductSnapshot,
};
use crate::store::CatalogStore;

fn ensure_product_name_free<S: CatalogStore + ?Sized>(
    store: &S,
    name: &str,
    owner: Option<i64>,
) -> Result<(), CatalogError> {
    match store.find_product_by_name(name)? {
        Some(existing) if Some(existing) != owner => Err(CatalogError::Conflict {
            kind: EntityKind::Product,
            name: name.to_string(),
        }),
        _ => Ok(()),
    }
}

fn ensure_category_name_free<S: CatalogStore + ?Sized>(
    store: &S,
    name: &str,
    owner: Option<i64>,
) -> Result<(), CatalogError> {
    match store.find_category_by_name(name)? {
        Some(existing) if Some(existing) != owner => Err(CatalogError::Conflict {
            kind: EntityKind::Category,
            name: name.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Creates a product and links it to the listed categories that exist.
pub fn create_product<S: CatalogStore + ?Sized>(
    store: &S,
    new: &NewProduct,
    now: DateTime<Utc>,
) -> Result<Product, CatalogError> {
    validate_name(&new.name)?;
    validate_description(&new.description)?;
    validate_price(new.price)?;
    validate_stock(new.stock)?;
    ensure_product_name_free(store, &new.name, None)?;

    let id = store.insert_product(new, now)?;
    if !new.categories.is_empty() {
        store.replace_product_categories(id, &new.categories)?;
    }
    store.get_product(id)
}

/// Applies a partial update to a product and archives its previous state.
///
/// The history row carries the price and stock the product had *before*
/// this call, stamped with `now`.
pub fn update_product<S: CatalogStore + ?Sized>(
    store: &S,
    id: i64,
    changes: &ProductChanges,
    now: DateTime<Utc>,
) -> Result<Product, CatalogError> {
    let mut product = store.get_product(id)?;
    let snapshot = ProductSnapshot::from(&product);

    if let Some(name) = &changes.name {
        product.name = name.clone();
    }
    if let Some(description) = &changes.description {
        product.description = description.clone();
    }
    if let Some(price) = changes.price {
        product.price = price;
    }
    if let Some(stock) = changes.stock {
        product.stock = stock;
    }

    validate_name(&product.name)?;
    validate_description(&product.description)?;
    validate_price(product.price)?;
    validate_stock(product.stock)?;
    if product.name != snapshot.name {
        ensure_product_name_free(store, &product.name, Some(id))?;
    }

    product.updated_at = now;
    store.save_product(&product)?;

    if let Some(category_ids) = &changes.categories {
        product.categories = store.replace_product_categories(id, category_ids)?;
    }

    let record = store.append_history(&NewHistoryRecord::from_snapshot(id, &snapshot, now))?;
    tracing::debug!(
        product_id = id,
        history_id = record.id,
        previous_price = snapshot.price,
        previous_stock = snapshot.stock,
        "archived product state"
    );

    Ok(product)
}

/// Creates a category and links it to the listed products that exist.
pub fn create_category<S: CatalogStore + ?Sized>(
    store: &S,
    new: &NewCategory,
    now: DateTime<Utc>,
) -> Result<Category, CatalogError> {
    validate_name(&new.name)?;
    validate_description(&new.description)?;
    ensure_category_name_free(store, &new.name, None)?;

    let id = store.insert_category(new, now)?;
    if !new.products.is_empty() {
        store.replace_category_products(id, &new.products)?;
    }
    store.get_category(id)
}

/// Applies a partial update to a category. Categories keep no history.
pub fn update_category<S: CatalogStore + ?Sized>(
    store: &S,
    id: i64,
    changes: &CategoryChanges,
    now: DateTime<Utc>,
) -> Result<Category, CatalogError> {
    let mut category = store.get_category(id)?;
    let previous_name = category.name.clone();

    if let Some(name) = &changes.name {
        category.name = name.clone();
    }
    if let Some(description) = &changes.description {
        category.description = description.clone();
    }

    validate_name(&category.name)?;
    validate_description(&category.description)?;
    if category.name != previous_name {
        ensure_category_name_free(store, &category.name, Some(id))?;
    }

    category.updated_at = now;
    store.save_category(&category)?;

    if let Some(product_ids) = &changes.products {
        category.products = store.replace_category_products(id, product_ids)?;
    }

    Ok(category)
}

/// Runs [`create_product`] in its own transaction.
pub fn commit_product_create(conn: &mut Connection, new: &NewProduct) -> Result<Product, CatalogError> {
    let tx = begin_write(conn)?;
    let product = create_product(&*tx, new, Utc::now())?;
    tx.commit()?;
    Ok(product)
}

/// Runs [`update_product`] in its own transaction.
///
/// On any error the transaction is dropped, which rolls back both the
/// product write and the history append.
pub fn commit_product_update(
    conn: &mut Connection,
    id: i64,
    changes: &ProductChanges,
) -> Result<Product, CatalogError> {
    let tx = begin_write(conn)?;
    let product = update_product(&*tx, id, changes, Utc::now())?;
    tx.commit()?;
    Ok(product)
}

/// Runs [`create_category`] in its own transaction.
pub fn commit_category_create(
    conn: &mut Connection,
    new: &NewCategory,
) -> Result<Category, CatalogError> {
    let tx = begin_write(conn)?;
    let category = create_category(&*tx, new, Utc::now())?;
    tx.commit()?;
    Ok(category)
}

/// Runs [`update_category`] in its own transaction.
pub fn commit_category_update(
    conn: &mut Connection,
    id: i64,
    changes: &CategoryChanges,
) -> Result<Category, CatalogError> {
    let tx = begin_write(conn)?;
    let category = update_category(&*tx, id, changes, Utc::now())?;
    tx.commit()?;
    Ok(category)
}
