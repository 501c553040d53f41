use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use settle_core::{Order, OrderId, OrderStatus, RequesterIdentity};

use crate::error::AppError;
use crate::middleware::auth_middleware;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub amount_minor_units: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub owner_id: String,
    pub amount_minor_units: i64,
    pub status: OrderStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.into_inner(),
            owner_id: order.owner_id,
            amount_minor_units: order.amount_minor_units,
            status: order.status,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order))
        .route("/v1/orders/{id}/pay", post(pay_order))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(requester): Extension<RequesterIdentity>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let order = state
        .orchestrator
        .create_order(&state.call_context(), &requester, req.amount_minor_units)
        .await?;

    let location = format!("/v1/orders/{}", order.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(OrderResponse::from(order)),
    ))
}

pub async fn pay_order(
    State(state): State<AppState>,
    Extension(requester): Extension<RequesterIdentity>,
    Path(order_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .orchestrator
        .pay_order(&state.call_context(), &requester, &OrderId::new(order_id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
