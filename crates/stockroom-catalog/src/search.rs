//! Paged name search over products or categories.

use rusqlite::types::ToSql;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::CatalogError;
use crate::model::{Category, Product};
use crate::store::{
    category_product_ids, map_row_to_category, map_row_to_product, product_category_ids,
    CATEGORY_COLUMNS, PRODUCT_COLUMNS,
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Which table a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    Product,
    Category,
}

impl SearchTarget {
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        match raw {
            "product" => Ok(Self::Product),
            "category" => Ok(Self::Category),
            other => Err(CatalogError::Validation(format!(
                "type must be \"product\" or \"category\", got {other:?}"
            ))),
        }
    }
}

/// Result ordering. Without one, results come back in ID order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSort {
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
}

impl SearchSort {
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        match raw {
            "price_asc" => Ok(Self::PriceAsc),
            "price_desc" => Ok(Self::PriceDesc),
            "name_asc" => Ok(Self::NameAsc),
            "name_desc" => Ok(Self::NameDesc),
            other => Err(CatalogError::Validation(format!("unknown sort {other:?}"))),
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::PriceAsc => "price ASC, id ASC",
            Self::PriceDesc => "price DESC, id ASC",
            Self::NameAsc => "name ASC, id ASC",
            Self::NameDesc => "name DESC, id ASC",
        }
    }
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub target: SearchTarget,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    pub sort: Option<SearchSort>,
    /// One-based page number.
    pub page: u32,
    pub limit: u32,
}

impl SearchQuery {
    /// Builds a query from raw query-string values.
    ///
    /// Empty strings count as absent. A page or limit below one falls back
    /// to the default; a limit above [`MAX_PAGE_SIZE`] is capped. Price
    /// ordering is rejected for categories.
    pub fn parse(
        target: Option<&str>,
        name: Option<&str>,
        sort: Option<&str>,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Self, CatalogError> {
        let target = SearchTarget::parse(target.unwrap_or_default())?;
        let sort = sort
            .filter(|s| !s.is_empty())
            .map(SearchSort::parse)
            .transpose()?;
        if target == SearchTarget::Category
            && matches!(sort, Some(SearchSort::PriceAsc | SearchSort::PriceDesc))
        {
            return Err(CatalogError::Validation(
                "categories cannot be sorted by price".to_string(),
            ));
        }

        let page = match page {
            Some(p) if p >= 1 => u32::try_from(p).unwrap_or(u32::MAX),
            _ => 1,
        };
        let limit = match limit {
            Some(l) if l >= 1 => u32::try_from(l.min(MAX_PAGE_SIZE as i64)).unwrap_or(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };

        Ok(Self {
            target,
            name: name.filter(|n| !n.is_empty()).map(str::to_string),
            sort,
            page,
            limit,
        })
    }

    fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

/// One page of search hits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Products(Vec<Product>),
    Categories(Vec<Category>),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            Self::Products(items) => items.len(),
            Self::Categories(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs a search, filling in each hit's associations.
pub fn search(conn: &Connection, query: &SearchQuery) -> Result<SearchResults, CatalogError> {
    match query.target {
        SearchTarget::Product => {
            let sql = build_sql("products", PRODUCT_COLUMNS, query);
            let mut products = run(conn, &sql, query, map_row_to_product)?;
            for product in &mut products {
                product.categories = product_category_ids(conn, product.id)?;
            }
            Ok(SearchResults::Products(products))
        }
        SearchTarget::Category => {
            let sql = build_sql("categories", CATEGORY_COLUMNS, query);
            let mut categories = run(conn, &sql, query, map_row_to_category)?;
            for category in &mut categories {
                category.products = category_product_ids(conn, category.id)?;
            }
            Ok(SearchResults::Categories(categories))
        }
    }
}

fn build_sql(table: &str, columns: &str, query: &SearchQuery) -> String {
    let mut sql = format!("SELECT {columns} FROM {table}");
    if query.name.is_some() {
        sql.push_str(" WHERE name LIKE ?1 ESCAPE '\\'");
    }
    let order = query.sort.map_or("id ASC", SearchSort::order_by);
    let (limit_idx, offset_idx) = if query.name.is_some() { (2, 3) } else { (1, 2) };
    sql.push_str(&format!(" ORDER BY {order} LIMIT ?{limit_idx} OFFSET ?{offset_idx}"));
    sql
}

fn run<T>(
    conn: &Connection,
    sql: &str,
    query: &SearchQuery,
    map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>, CatalogError> {
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(name) = &query.name {
        values.push(Box::new(format!("%{}%", escape_like(name))));
    }
    values.push(Box::new(i64::from(query.limit)));
    values.push(Box::new(query.offset()));
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params.as_slice(), map)?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
