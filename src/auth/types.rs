use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Role;
use crate::handlers::common::not_blank;

/// Self-service registration. Without `role_id` the account becomes a Customer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(custom = "not_blank", length(max = 64))]
    pub username: String,
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub password: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub role_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub username: String,
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub username: String,
    pub role: Role,
    pub user_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: i32,
    pub role: Role,
}

/// Entry of the staff picker used when assigning orders
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaffSummary {
    pub id: i32,
    pub name: String,
}
