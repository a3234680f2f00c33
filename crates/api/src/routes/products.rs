//! Read-only catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Product, ProductId};
use store::Store;

use crate::AppState;
use crate::error::ApiError;

/// GET /products: the whole catalog, ordered by id.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.store.list_products().await?))
}

/// GET /products/{pid}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(pid): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id = ProductId::new(pid);
    state
        .store
        .get_product(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {id}")))
}
