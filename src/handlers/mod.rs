pub mod admin;
pub mod auth;
pub mod common;
pub mod orders;

use crate::db::DbPool;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<crate::services::orders::OrderService>,
    pub users: Arc<crate::services::users::UserService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self {
            orders: Arc::new(crate::services::orders::OrderService::new(db_pool.clone())),
            users: Arc::new(crate::services::users::UserService::new(db_pool)),
        }
    }
}
