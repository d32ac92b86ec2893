//! Account administration. Every route here sits behind the Admin role guard.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::common::{MessageResponse, ValidatedJson, ValidatedPath};
use crate::{
    auth::{role, AuthUser},
    errors::ServiceError,
    services::users::{CreateUserRequest, SetActiveRequest, UpdateUserRequest, UserSummary},
    AppState,
};

pub async fn list_roles(
    State(state): State<AppState>,
) -> Result<Json<Vec<role::Model>>, ServiceError> {
    Ok(Json(state.services.users.list_roles().await?))
}

pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSummary>>, ServiceError> {
    Ok(Json(state.services.users.list_users().await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = state.services.users.create_user(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::user("User created", user_id)),
    ))
}

pub async fn update_user(
    State(state): State<AppState>,
    ValidatedPath(user_id): ValidatedPath<i32>,
    ValidatedJson(request): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.services.users.update_user(user_id, request).await?;
    Ok(Json(MessageResponse::user("User updated", user_id)))
}

pub async fn set_lock_state(
    State(state): State<AppState>,
    ValidatedPath(user_id): ValidatedPath<i32>,
    admin: AuthUser,
    ValidatedJson(request): ValidatedJson<SetActiveRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state
        .services
        .users
        .set_active(&admin, user_id, request.is_active)
        .await?;
    let message = if request.is_active {
        "User unlocked"
    } else {
        "User locked"
    };
    Ok(Json(MessageResponse::user(message, user_id)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    ValidatedPath(user_id): ValidatedPath<i32>,
    admin: AuthUser,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.services.users.delete_user(&admin, user_id).await?;
    Ok(Json(MessageResponse::user("User deleted", user_id)))
}
