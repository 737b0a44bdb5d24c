//! Category endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Json, Path,
    },
    http::StatusCode,
};
use std::sync::Arc;
use stockroom_catalog::{
    commit_category_create, commit_category_update, delete_category, get_category,
    list_categories, Category, CategoryChanges, NewCategory,
};
use stockroom_types::{Event, EventKind};

use crate::api::{with_conn, ApiError};
use crate::AppState;

/// Handler for `GET /api/categories`.
pub async fn list_categories_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = with_conn(&state.pool, |conn| list_categories(conn)).await?;
    Ok(Json(categories))
}

/// Handler for `POST /api/categories`.
pub async fn create_category_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<NewCategory>, JsonRejection>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let Json(new) = payload?;
    let category = with_conn(&state.pool, move |conn| commit_category_create(conn, &new)).await?;

    tracing::info!(category_id = category.id, name = %category.name, "category created");
    state
        .hub
        .broadcast(&Event::new(EventKind::CategoryCreated, category.id, &category.name))
        .await;
    Ok((StatusCode::CREATED, Json(category)))
}

/// Handler for `GET /api/categories/{id}`.
pub async fn get_category_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Category>, ApiError> {
    let Path(id) = id?;
    let category = with_conn(&state.pool, move |conn| get_category(conn, id)).await?;
    Ok(Json(category))
}

/// Handler for `PATCH /api/categories/{id}` and its `PUT` alias.
pub async fn update_category_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CategoryChanges>, JsonRejection>,
) -> Result<Json<Category>, ApiError> {
    let Path(id) = id?;
    let Json(changes) = payload?;
    let category =
        with_conn(&state.pool, move |conn| commit_category_update(conn, id, &changes)).await?;

    state
        .hub
        .broadcast(&Event::new(EventKind::CategoryUpdated, category.id, &category.name))
        .await;
    Ok(Json(category))
}

/// Handler for `DELETE /api/categories/{id}`.
pub async fn delete_category_handler(
    Extension(state): Extension<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    let category = with_conn(&state.pool, move |conn| delete_category(conn, id)).await?;

    tracing::info!(category_id = category.id, "category deleted");
    state
        .hub
        .broadcast(&Event::new(EventKind::CategoryDeleted, category.id, &category.name))
        .await;
    Ok(StatusCode::NO_CONTENT)
}
