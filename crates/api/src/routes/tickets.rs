//! Ticket lookup endpoints. Tickets are read-only once issued.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::TicketId;
use domain::{Role, Ticket};
use store::Store;

use crate::AppState;
use crate::auth::Principal;
use crate::error::ApiError;

/// GET /tickets: every ticket, admins only.
#[tracing::instrument(skip(state, principal))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    principal.require_role(&[Role::Admin])?;
    Ok(Json(state.store.list_tickets().await?))
}

/// GET /tickets/{tid}: visible to its purchaser and to admins.
#[tracing::instrument(skip(state, principal))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(tid): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    let id: TicketId = tid
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ticket id '{tid}': {e}")))?;

    let ticket = state
        .store
        .get_ticket(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Ticket not found: {id}")))?;

    if !principal.role.is_admin() && ticket.purchaser() != principal.email {
        return Err(ApiError::Forbidden(format!(
            "Ticket {id} does not belong to {}",
            principal.email
        )));
    }
    Ok(Json(ticket))
}
