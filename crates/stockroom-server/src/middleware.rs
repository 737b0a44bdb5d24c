use axum::{
    body::Body,
    extract::Query,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::AppState;

/// Query parameters that may carry a token on the WebSocket route.
#[derive(Debug, Deserialize)]
struct TokenParams {
    token: Option<String>,
}

/// Middleware that requires `Authorization: Bearer <token>` with a configured
/// API token.
pub async fn auth_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let token = bearer_token(&req)?.ok_or(StatusCode::UNAUTHORIZED)?;
    authorize(req, next, &token).await
}

/// Like [`auth_middleware`], but also accepts `?token=<token>`, since
/// browsers cannot set headers on a WebSocket upgrade.
pub async fn ws_auth_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let token = match bearer_token(&req)? {
        Some(token) => token,
        None => Query::<TokenParams>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(params)| params.token)
            .ok_or(StatusCode::UNAUTHORIZED)?,
    };
    authorize(req, next, &token).await
}

/// Reads the bearer token, if any. A malformed `Authorization` header is
/// rejected rather than ignored.
fn bearer_token(req: &Request<Body>) -> Result<Option<String>, StatusCode> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;
    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim().to_string()))
        .ok_or(StatusCode::UNAUTHORIZED)
}

async fn authorize(req: Request<Body>, next: Next, token: &str) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    if !state.accepts_token(token) {
        tracing::warn!(path = %req.uri().path(), "rejected request with unknown API token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}
