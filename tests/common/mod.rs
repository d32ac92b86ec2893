#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use order_desk::{
    auth::{password, role, user, user_role, Role},
    build_router,
    config::AppConfig,
    db,
    entities::{
        delivery,
        order::{self, OrderStatus},
    },
    AppState,
};

pub const TEST_SECRET: &str = "integration-test-secret-7f3a9c2e5b8d1f4a";

/// Application harness over a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    /// Fresh schema and seeded roles, no users.
    pub async fn new() -> Self {
        Self::with_pool_size(1).await
    }

    /// Same as `new`, with several pooled connections so requests can
    /// hold transactions at the same time
    pub async fn with_pool_size(connections: u32) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("order_desk_test.db");
        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", path.display()),
            TEST_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = build_router(state.clone());
        Self {
            router,
            state,
            _dir: dir,
        }
    }

    pub async fn role_id(&self, role: Role) -> i32 {
        role::Entity::find()
            .filter(role::Column::Name.eq(role.to_string()))
            .one(&*self.state.db)
            .await
            .expect("role lookup")
            .expect("role is seeded")
            .id
    }

    /// Inserts an active account with a fixed id
    pub async fn seed_user_with_id(&self, id: i32, username: &str, password: &str, role: Role) -> i32 {
        let hash = password::hash_password(password).expect("hash");
        user::ActiveModel {
            id: Set(id),
            username: Set(username.to_string()),
            password_hash: Set(hash),
            full_name: Set(Some(format!("{} full", username))),
            phone_number: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert user");
        self.grant_role(id, role).await;
        id
    }

    /// Creates an account through the same path as the admin API
    pub async fn seed_user(&self, username: &str, password: &str, role: Role) -> i32 {
        let role_id = self.role_id(role).await;
        self.state
            .services
            .users
            .create_user(order_desk::services::users::CreateUserRequest {
                username: username.to_string(),
                password: password.to_string(),
                full_name: Some(format!("{} full", username)),
                phone_number: None,
                role_id: Some(role_id),
            })
            .await
            .expect("seed user")
    }

    pub async fn grant_role(&self, user_id: i32, role: Role) {
        let role_id = self.role_id(role).await;
        user_role::ActiveModel {
            user_id: Set(user_id),
            role_id: Set(role_id),
        }
        .insert(&*self.state.db)
        .await
        .expect("grant role");
    }

    /// Inserts an order row directly, bypassing the lifecycle
    pub async fn seed_order(
        &self,
        id: i32,
        customer_id: i32,
        staff_id: Option<i32>,
        status: OrderStatus,
    ) -> i32 {
        order::ActiveModel {
            id: Set(id),
            customer_id: Set(customer_id),
            staff_id: Set(staff_id),
            manager_id: Set(None),
            description: Set("seeded order".to_string()),
            delivery_address: Set("1 Seed Street".to_string()),
            phone_number: Set("0900000000".to_string()),
            total_amount: Set(Decimal::ZERO),
            status: Set(status),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert order");
        id
    }

    /// Audit rows of one order, oldest first
    pub async fn deliveries(&self, order_id: i32) -> Vec<delivery::Model> {
        delivery::Entity::find()
            .filter(delivery::Column::OrderId.eq(order_id))
            .order_by_asc(delivery::Column::Id)
            .all(&*self.state.db)
            .await
            .expect("delivery lookup")
    }

    pub async fn find_order(&self, id: i32) -> Option<order::Model> {
        order::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("order lookup")
    }

    pub fn token_for(&self, id: i32, username: &str, role: Role) -> String {
        self.state
            .auth
            .issue_token(id, username, role)
            .expect("issue token")
    }

    /// Logs in over HTTP and returns the session token
    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(serde_json::json!({"username": username, "password": password})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().expect("token").to_string()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }
}
