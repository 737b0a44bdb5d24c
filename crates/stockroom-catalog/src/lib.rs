//! Product and category catalog for Stockroom.
//!
//! Implements the catalog model, the [`CatalogStore`] storage port with its
//! SQLite adapter, the audited mutation pipeline, product history queries
//! and paged name search.
//!
//! Products and categories are linked many-to-many. Each product update
//! appends a history row holding the price and stock the product had just
//! before the change, written in the same transaction as the update itself.

mod categories;
mod error;
mod history;
mod model;
mod pipeline;
mod products;
mod search;
mod store;

pub use categories::{delete_category, get_category, list_categories};
pub use error::{CatalogError, EntityKind};
pub use history::{list_product_history, HistoryRange};
pub use model::{
    Category, CategoryChanges, HistoryRecord, NewCategory, NewHistoryRecord, NewProduct, Product,
    ProductChanges, ProductSnapshot, MAX_DESCRIPTION_LEN, MAX_NAME_LEN,
};
pub use pipeline::{
    commit_category_create, commit_category_update, commit_product_create, commit_product_update,
    create_category, create_product, update_category, update_product,
};
pub use products::{delete_product, get_product, list_products};
pub use search::{
    search, SearchQuery, SearchResults, SearchSort, SearchTarget, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use store::CatalogStore;
