use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use super::common::ValidatedJson;
use crate::{
    auth::{AuthUser, LoginRequest, LoginResponse, RegisterRequest, Role, StaffSummary},
    errors::ServiceError,
    AppState,
};

/// The caller as the access guard sees them
#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub id: i32,
    pub username: String,
    pub role: Role,
}

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let registered = state.services.users.register(request).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ServiceError> {
    let response = state
        .auth
        .login(request.username.trim(), &request.password)
        .await?;
    Ok(Json(response))
}

pub async fn list_staff(
    State(state): State<AppState>,
) -> Result<Json<Vec<StaffSummary>>, ServiceError> {
    Ok(Json(state.services.users.list_staff().await?))
}

pub async fn me(user: AuthUser) -> Json<WhoAmI> {
    Json(WhoAmI {
        id: user.id,
        username: user.username,
        role: user.role,
    })
}
