use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::common::{MessageResponse, ValidatedJson, ValidatedPath};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::orders::{AssignOrderRequest, OrderDetails, OrderView, UpdateStatusRequest},
    AppState,
};

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(details): ValidatedJson<OrderDetails>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.create_order(&user, details).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::order("Order created", order.id)),
    ))
}

pub async fn my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<OrderView>>, ServiceError> {
    Ok(Json(state.services.orders.list_customer_orders(user.id).await?))
}

pub async fn all_orders(
    State(state): State<AppState>,
) -> Result<Json<Vec<OrderView>>, ServiceError> {
    Ok(Json(state.services.orders.list_all_orders().await?))
}

pub async fn assigned_tasks(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<OrderView>>, ServiceError> {
    Ok(Json(state.services.orders.list_assigned_tasks(user.id).await?))
}

pub async fn assign_order(
    State(state): State<AppState>,
    ValidatedPath(order_id): ValidatedPath<i32>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<AssignOrderRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let staff_id = request
        .staff_id
        .ok_or_else(|| ServiceError::ValidationError("staff_id is required".to_string()))?;
    state
        .services
        .orders
        .assign_order(&user, order_id, staff_id)
        .await?;
    Ok(Json(MessageResponse::order("Order assigned", order_id)))
}

pub async fn unassign_order(
    State(state): State<AppState>,
    ValidatedPath(order_id): ValidatedPath<i32>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.services.orders.unassign_order(&user, order_id).await?;
    Ok(Json(MessageResponse::order(
        "Order returned to Pending",
        order_id,
    )))
}

pub async fn update_status(
    State(state): State<AppState>,
    ValidatedPath(order_id): ValidatedPath<i32>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<UpdateStatusRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let status = state
        .services
        .orders
        .update_status(&user, order_id, &request.status)
        .await?;
    Ok(Json(MessageResponse::order(
        format!("Order status updated to {}", status),
        order_id,
    )))
}

pub async fn update_order(
    State(state): State<AppState>,
    ValidatedPath(order_id): ValidatedPath<i32>,
    user: AuthUser,
    ValidatedJson(details): ValidatedJson<OrderDetails>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state
        .services
        .orders
        .edit_order(&user, order_id, details)
        .await?;
    Ok(Json(MessageResponse::order("Order updated", order_id)))
}

pub async fn delete_order(
    State(state): State<AppState>,
    ValidatedPath(order_id): ValidatedPath<i32>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.services.orders.delete_order(&user, order_id).await?;
    Ok(Json(MessageResponse::order("Order deleted", order_id)))
}
