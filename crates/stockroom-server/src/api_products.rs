//! Product endpoints.
//!
//! Mutations commit first and only then announce the change on the hub, so
//! subscribers never hear about a write that was rolled back.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Json, Path, Query,
    },
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use stockroom_catalog::{
    commit_product_create, commit_product_update, delete_product, get_product,
    list_product_history, list_products, search, HistoryRange, HistoryRecord, NewProduct, Product,
    ProductChanges, SearchQuery, SearchResults,
};
use stockroom_types::{Event, EventKind};

use crate::api::{with_conn, ApiError};
use crate::AppState;

/// Query parameters for `GET /api/products/{id}/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// First day included, `YYYY-MM-DD`.
    pub start: Option<String>,
    /// Last day included, `YYYY-MM-DD`.
    pub end: Option<String>,
}

/// Query parameters for `GET /api/search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// `product` or `category`.
    #[serde(rename = "type")]
    pub target: Option<String>,
    pub name: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Handler for `GET /api/products`.
pub async fn list_products_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = with_conn(&state.pool, |conn| list_products(conn)).await?;
    Ok(Json(products))
}

/// Handler for `POST /api/products`.
pub async fn create_product_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(new) = payload?;
    let product = with_conn(&state.pool, move |conn| commit_product_create(conn, &new)).await?;

    tracing::info!(product_id = product.id, name = %product.name, "product created");
    state
        .hub
        .broadcast(&Event::new(EventKind::ProductCreated, product.id, &product.name))
        .await;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Handler for `GET /api/products/{id}`.
pub async fn get_product_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(id) = id?;
    let product = with_conn(&state.pool, move |conn| get_product(conn, id)).await?;
    Ok(Json(product))
}

/// Handler for `PATCH /api/products/{id}` and its `PUT` alias.
///
/// Only the fields present in the body change; the previous price and stock
/// are archived in the product's history.
pub async fn update_product_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ProductChanges>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(id) = id?;
    let Json(changes) = payload?;
    let product =
        with_conn(&state.pool, move |conn| commit_product_update(conn, id, &changes)).await?;

    tracing::info!(product_id = product.id, "product updated");
    state
        .hub
        .broadcast(&Event::new(EventKind::ProductUpdated, product.id, &product.name))
        .await;
    Ok(Json(product))
}

/// Handler for `DELETE /api/products/{id}`.
pub async fn delete_product_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    let product = with_conn(&state.pool, move |conn| delete_product(conn, id)).await?;

    tracing::info!(product_id = product.id, "product deleted");
    state
        .hub
        .broadcast(&Event::new(EventKind::ProductDeleted, product.id, &product.name))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `GET /api/products/{id}/history?start=&end=`.
pub async fn product_history_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let Path(id) = id?;
    let Query(params) = params?;
    let range = HistoryRange::parse(params.start.as_deref(), params.end.as_deref())?;

    let records = with_conn(&state.pool, move |conn| list_product_history(conn, id, &range)).await?;
    Ok(Json(records))
}

/// Handler for `GET /api/search?type=&name=&sort=&page=&limit=`.
pub async fn search_handler(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResults>, ApiError> {
    let Query(params) = params?;
    let query = SearchQuery::parse(
        params.target.as_deref(),
        params.name.as_deref(),
        params.sort.as_deref(),
        params.page,
        params.limit,
    )?;

    let results = with_conn(&state.pool, move |conn| search(conn, &query)).await?;
    Ok(Json(results))
}
