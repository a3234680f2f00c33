//! Cart management and the purchase endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::CheckoutReceipt;
use common::CartId;
use domain::{Cart, CartLineItem, Money, ProductId, ReconciliationOutcome, Role, Ticket};
use serde::{Deserialize, Serialize};
use store::{Store, StoreError};

use crate::AppState;
use crate::auth::Principal;
use crate::error::ApiError;

/// Confirmation returned with every successful purchase.
pub const PURCHASE_PAYLOAD: &str = "Ticket successfully created. Check your inbox.";

const SHOPPERS: &[Role] = &[Role::User, Role::Premium, Role::Admin];
const BUYERS: &[Role] = &[Role::User, Role::Premium];

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct PurchaseResponse {
    pub payload: &'static str,
    pub message: String,
    pub ticket: Ticket,
    pub total_amount: Money,
    pub outcomes: Vec<ReconciliationOutcome>,
    pub remaining_items: Vec<CartLineItem>,
}

impl From<CheckoutReceipt> for PurchaseResponse {
    fn from(receipt: CheckoutReceipt) -> Self {
        Self {
            payload: PURCHASE_PAYLOAD,
            message: receipt.message,
            ticket: receipt.ticket,
            total_amount: receipt.total_amount,
            outcomes: receipt.outcomes,
            remaining_items: receipt.remaining_items,
        }
    }
}

fn parse_cart_id(raw: &str) -> Result<CartId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid cart id '{raw}': {e}")))
}

/// Resolves the cart id from the path and checks the caller may touch it.
fn authorize_cart(principal: &Principal, raw: &str) -> Result<CartId, ApiError> {
    principal.require_role(SHOPPERS)?;
    let cart_id = parse_cart_id(raw)?;
    principal.require_cart_access(cart_id)?;
    Ok(cart_id)
}

// -- Handlers --

/// POST /carts: create an empty cart.
#[tracing::instrument(skip(state, principal), fields(email = %principal.email))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
) -> Result<(StatusCode, Json<Cart>), ApiError> {
    principal.require_role(SHOPPERS)?;
    let cart = state.store.create_cart().await?;
    tracing::info!(cart_id = %cart.id(), email = %principal.email, "cart created");
    Ok((StatusCode::CREATED, Json(cart)))
}

/// GET /carts: every cart, admins only.
#[tracing::instrument(skip(state, principal))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
) -> Result<Json<Vec<Cart>>, ApiError> {
    principal.require_role(&[Role::Admin])?;
    Ok(Json(state.store.list_carts().await?))
}

/// GET /carts/{cid}
#[tracing::instrument(skip(state, principal))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(cid): Path<String>,
) -> Result<Json<Cart>, ApiError> {
    let cart_id = authorize_cart(&principal, &cid)?;
    state
        .store
        .get_cart(cart_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Cart not found: {cart_id}")))
}

/// PUT /carts/{cid}: replace every line item.
///
/// All referenced products must exist and every quantity must be at least
/// one; otherwise nothing is written.
#[tracing::instrument(skip(state, principal, items))]
pub async fn replace<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(cid): Path<String>,
    Json(items): Json<Vec<CartLineItem>>,
) -> Result<Json<Cart>, ApiError> {
    let cart_id = authorize_cart(&principal, &cid)?;
    if state.store.get_cart(cart_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Cart not found: {cart_id}")));
    }

    for item in &items {
        if item.quantity == 0 {
            return Err(ApiError::BadRequest(format!(
                "Quantity for product {} must be at least 1",
                item.product_id
            )));
        }
        if state.store.get_product(&item.product_id).await?.is_none() {
            return Err(ApiError::NotFound(format!(
                "Product not found: {}",
                item.product_id
            )));
        }
    }

    let cart = Cart::from_items(cart_id, items).map_err(StoreError::from)?;
    state.store.save_cart(&cart).await?;
    tracing::info!(cart_id = %cart_id, lines = cart.item_count(), "cart replaced");
    Ok(Json(cart))
}

/// DELETE /carts/{cid}: empty the cart. The cart itself is kept.
#[tracing::instrument(skip(state, principal))]
pub async fn clear<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(cid): Path<String>,
) -> Result<Json<Cart>, ApiError> {
    let cart_id = authorize_cart(&principal, &cid)?;
    let cart = state.store.clear_cart(cart_id).await?;
    tracing::info!(cart_id = %cart_id, "cart emptied");
    Ok(Json(cart))
}

/// POST /carts/{cid}/product/{pid}: add one unit, merging with an existing line.
#[tracing::instrument(skip(state, principal))]
pub async fn add_product<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path((cid, pid)): Path<(String, String)>,
) -> Result<Json<Cart>, ApiError> {
    let cart_id = authorize_cart(&principal, &cid)?;
    let cart = state
        .store
        .add_cart_item(cart_id, &ProductId::new(pid), 1)
        .await?;
    Ok(Json(cart))
}

/// PUT /carts/{cid}/product/{pid}: set a line's quantity; zero removes it.
#[tracing::instrument(skip(state, principal))]
pub async fn set_quantity<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path((cid, pid)): Path<(String, String)>,
    Json(req): Json<QuantityRequest>,
) -> Result<Json<Cart>, ApiError> {
    let cart_id = authorize_cart(&principal, &cid)?;
    let cart = state
        .store
        .update_cart_quantity(&ProductId::new(pid), cart_id, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// DELETE /carts/{cid}/product/{pid}
#[tracing::instrument(skip(state, principal))]
pub async fn remove_product<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path((cid, pid)): Path<(String, String)>,
) -> Result<Json<Cart>, ApiError> {
    let cart_id = authorize_cart(&principal, &cid)?;
    let cart = state
        .store
        .remove_cart_item(&ProductId::new(pid), cart_id)
        .await?;
    Ok(Json(cart))
}

/// POST /carts/{cid}/purchase: check out the caller's own cart.
///
/// Fulfils what stock allows, issues a ticket for the charged amount and
/// leaves unfulfilled quantities in the cart.
#[tracing::instrument(skip(state, principal), fields(email = %principal.email))]
pub async fn purchase<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(cid): Path<String>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    principal.require_role(BUYERS)?;
    let cart_id = parse_cart_id(&cid)?;
    principal.require_cart_access(cart_id)?;

    let receipt = state
        .checkout
        .checkout(cart_id, &principal.purchaser())
        .await?;

    tracing::info!(
        cart_id = %cart_id,
        ticket_code = %receipt.ticket.code(),
        amount = receipt.total_amount.cents(),
        "purchase completed"
    );
    Ok(Json(receipt.into()))
}
