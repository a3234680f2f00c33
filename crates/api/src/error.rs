//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, CheckoutStage};
use domain::CartError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No authenticated principal on the request.
    Unauthorized(String),
    /// Principal lacks the role or ownership for the resource.
    Forbidden(String),
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Persistence error.
    Store(StoreError),
    /// Checkout failure, reported with its stage.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, stage) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Store(err) => (store_status(&err), err.to_string(), None),
            ApiError::Checkout(err) => {
                let stage = err.stage();
                (checkout_status(&err), err.to_string(), Some(stage))
            }
        };

        metrics::counter!("api_errors_total", "status" => status.as_u16().to_string()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = match stage {
            Some(stage) => serde_json::json!({ "error": message, "stage": stage }),
            None => serde_json::json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } | StoreError::Cart(CartError::ItemNotFound { .. }) => {
            StatusCode::NOT_FOUND
        }
        StoreError::Cart(CartError::InvalidQuantity { .. })
        | StoreError::Cart(CartError::QuantityOverflow { .. })
        | StoreError::Product(_) => StatusCode::BAD_REQUEST,
        StoreError::InsufficientStock { .. } | StoreError::DuplicateTicketCode(_) => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::CartNotFound(_) | CheckoutError::ProductLookup { .. } => {
            StatusCode::NOT_FOUND
        }
        CheckoutError::EmptyCart(_) => StatusCode::BAD_REQUEST,
        _ if err.is_insufficient_stock() => StatusCode::CONFLICT,
        CheckoutError::Store(source) => store_status(source),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    /// The checkout stage carried by this error, if any.
    pub fn stage(&self) -> Option<CheckoutStage> {
        match self {
            ApiError::Checkout(err) => Some(err.stage()),
            _ => None,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CartId;
    use domain::{Money, ProductError, ProductId};

    #[test]
    fn checkout_errors_map_by_kind() {
        assert_eq!(
            checkout_status(&CheckoutError::EmptyCart(CartId::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            checkout_status(&CheckoutError::StockUpdate {
                product_id: ProductId::new("p"),
                source: StoreError::InsufficientStock {
                    product_id: ProductId::new("p"),
                    requested: 1,
                    available: 0,
                },
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            checkout_status(&CheckoutError::TicketCreation(StoreError::Unavailable(
                "down".into()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_map_by_kind() {
        assert_eq!(
            store_status(&StoreError::cart_not_found(CartId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            store_status(&StoreError::Cart(CartError::InvalidQuantity { quantity: 0 })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            store_status(&StoreError::Cart(CartError::QuantityOverflow {
                product_id: ProductId::new("p")
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            store_status(&StoreError::Product(ProductError::NegativePrice {
                product_id: ProductId::new("p"),
                price: Money::from_cents(-1),
            })),
            StatusCode::BAD_REQUEST
        );
    }
}
