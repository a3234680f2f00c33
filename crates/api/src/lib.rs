//! HTTP API server for the storefront backend.
//!
//! Provides REST endpoints for the catalog, carts, checkout and tickets,
//! with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{CheckoutCoordinator, Notifier};
use domain::Product;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{ProductRepository, Store, StoreError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub store: S,
    pub checkout: CheckoutCoordinator<S, Arc<dyn Notifier>>,
    pub data_source: String,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>, data_source: impl Into<String>) -> Self {
        Self {
            checkout: CheckoutCoordinator::new(store.clone(), notifier),
            store,
            data_source: data_source.into(),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/products", get(routes::products::list::<S>))
        .route("/products/{pid}", get(routes::products::get::<S>))
        .route(
            "/carts",
            post(routes::carts::create::<S>).get(routes::carts::list::<S>),
        )
        .route(
            "/carts/{cid}",
            get(routes::carts::get::<S>)
                .put(routes::carts::replace::<S>)
                .delete(routes::carts::clear::<S>),
        )
        .route(
            "/carts/{cid}/product/{pid}",
            post(routes::carts::add_product::<S>)
                .put(routes::carts::set_quantity::<S>)
                .delete(routes::carts::remove_product::<S>),
        )
        .route("/carts/{cid}/purchase", post(routes::carts::purchase::<S>))
        .route("/tickets", get(routes::tickets::list::<S>))
        .route("/tickets/{tid}", get(routes::tickets::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Loads a JSON array of products into the store, replacing same-id entries.
pub async fn seed_products<S: ProductRepository>(
    store: &S,
    path: &Path,
) -> Result<usize, StoreError> {
    let bytes = tokio::fs::read(path).await?;
    let products: Vec<Product> = serde_json::from_slice(&bytes)?;
    let count = products.len();
    for product in products {
        store.save_product(product).await?;
    }
    tracing::info!(count, path = %path.display(), "products seeded");
    Ok(count)
}
