//! Product audit trail queries.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{CatalogError, EntityKind};
use crate::model::HistoryRecord;
use crate::store::map_row_to_history;

/// Inclusive calendar-date filter for history queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryRange {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl HistoryRange {
    /// Builds a range, rejecting `start` after `end`.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, CatalogError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(CatalogError::Validation(format!(
                    "start date {} is after end date {}",
                    s, e
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Parses `YYYY-MM-DD` bounds as received on a query string.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, CatalogError> {
        let parse = |label: &str, raw: &str| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                CatalogError::Validation(format!("{label} must be a YYYY-MM-DD date, got {raw:?}"))
            })
        };
        let start = start.map(|s| parse("start", s)).transpose()?;
        let end = end.map(|e| parse("end", e)).transpose()?;
        Self::new(start, end)
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }
}

/// Lists a product's history, oldest first.
///
/// History outlives its product, so a deleted product's trail stays
/// readable. An ID that matches neither a product nor any history row is
/// reported as `NotFound`.
pub fn list_product_history(
    conn: &Connection,
    product_id: i64,
    range: &HistoryRange,
) -> Result<Vec<HistoryRecord>, CatalogError> {
    // Stored timestamps start with the calendar date, so comparing against a
    // bare `YYYY-MM-DD` string is a day-granular bound.
    let mut clauses = vec!["product_id = ?1".to_string()];
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(product_id)];
    let mut idx = 2u32;

    if let Some(start) = range.start {
        clauses.push(format!("changed_at >= ?{idx}"));
        values.push(Box::new(start.format("%Y-%m-%d").to_string()));
        idx += 1;
    }
    if let Some(next_day) = range.end.and_then(|end| end.succ_opt()) {
        clauses.push(format!("changed_at < ?{idx}"));
        values.push(Box::new(next_day.format("%Y-%m-%d").to_string()));
    }

    let sql = format!(
        "SELECT id, product_id, price, stock, changed_at
         FROM product_history
         WHERE {}
         ORDER BY changed_at ASC, id ASC",
        clauses.join(" AND ")
    );
    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), map_row_to_history)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }

    if records.is_empty() && !product_known(conn, product_id)? {
        return Err(CatalogError::NotFound {
            kind: EntityKind::Product,
            id: product_id,
        });
    }
    Ok(records)
}

fn product_known(conn: &Connection, product_id: i64) -> Result<bool, CatalogError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM products WHERE id = ?1
             UNION ALL
             SELECT product_id FROM product_history WHERE product_id = ?1
             LIMIT 1",
            [product_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
