//! Order desk API library
//!
//! Accounts with roles, JWT sessions, and the order lifecycle that moves an
//! order from a customer through a manager to a staff member.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;
pub mod tracing;

use axum::{
    http::HeaderValue,
    routing::{delete, get, post, put},
    Extension, Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::auth::{sets, AuthConfig, AuthRouterExt, AuthService};
use crate::errors::ServiceError;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config), db.clone()));
        let services = handlers::AppServices::new(db.clone());
        Self {
            db,
            config,
            auth,
            services,
        }
    }
}

/// Routes under `/api`, each group behind its role guard
pub fn api_routes() -> Router<AppState> {
    let auth_public = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login));

    let auth_session = Router::new()
        .route("/auth/staffs", get(handlers::auth::list_staff))
        .route("/auth/me", get(handlers::auth::me))
        .with_auth();

    let orders_create = Router::new()
        .route("/orders/create", post(handlers::orders::create_order))
        .with_roles(sets::ORDER_PLACERS);

    let orders_customer = Router::new()
        .route("/orders/my-orders", get(handlers::orders::my_orders))
        .with_roles(sets::CUSTOMER);

    let orders_management = Router::new()
        .route("/orders/all", get(handlers::orders::all_orders))
        .route(
            "/orders/assign/:order_id",
            put(handlers::orders::assign_order),
        )
        .route(
            "/orders/unassign/:id",
            put(handlers::orders::unassign_order),
        )
        .with_roles(sets::MANAGEMENT);

    let orders_staff = Router::new()
        .route(
            "/orders/assigned-tasks",
            get(handlers::orders::assigned_tasks),
        )
        .route(
            "/orders/update-status/:order_id",
            put(handlers::orders::update_status),
        )
        .with_roles(sets::STAFF);

    let orders_editors = Router::new()
        .route("/orders/update/:id", put(handlers::orders::update_order))
        .route("/orders/delete/:id", delete(handlers::orders::delete_order))
        .with_roles(sets::ORDER_EDITORS);

    let admin = Router::new()
        .route("/roles", get(handlers::admin::list_roles))
        .route(
            "/users",
            get(handlers::admin::list_users).post(handlers::admin::create_user),
        )
        .route(
            "/users/:id",
            put(handlers::admin::update_user).delete(handlers::admin::delete_user),
        )
        .route("/users/:id/lock", put(handlers::admin::set_lock_state))
        .with_roles(sets::ADMIN);

    Router::new()
        .merge(auth_public)
        .merge(auth_session)
        .merge(orders_create)
        .merge(orders_customer)
        .merge(orders_management)
        .merge(orders_staff)
        .merge(orders_editors)
        .nest("/admin", admin)
}

/// CORS from configuration. Development without explicit origins is permissive;
/// anywhere else without origins, cross-origin requests are refused.
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!("Using permissive CORS in development");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!(
            "No CORS origins configured; set APP__CORS_ALLOWED_ORIGINS to allow browser clients"
        );
        CorsLayer::new()
    }
}

async fn fallback() -> ServiceError {
    ServiceError::NotFound("No such route".to_string())
}

/// The full application: API, health, and the shared HTTP layers
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let cors = cors_layer(&state.config);

    Router::<AppState>::new()
        .route("/", get(|| async { "order-desk up" }))
        .nest("/api", api_routes())
        .merge(health::health_routes(state.db.clone()))
        .fallback(fallback)
        // Auth middleware reads the service from request extensions
        .layer(Extension(state.auth.clone()))
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        // Outermost, so every other layer sees the id
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
