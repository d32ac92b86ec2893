use crate::{
    auth::{
        password, role, user, user_role, AuthUser, RegisterRequest, RegisterResponse, Role,
        StaffSummary,
    },
    db::{claim_rows, with_transaction, DbPool},
    entities::{delivery, order},
    errors::ServiceError,
    handlers::common::not_blank,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Condition, Expr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Admin-side account creation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[serde(default)]
    #[validate(custom = "not_blank", length(max = 64))]
    pub username: String,
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub password: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    #[validate(required)]
    pub role_id: Option<i32>,
}

/// Profile fields left out stay unchanged; the role is always replaced.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    #[validate(required)]
    pub new_role_id: Option<i32>,
    #[validate(length(min = 1))]
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetActiveRequest {
    #[serde(alias = "isActive")]
    pub is_active: bool,
}

/// Account as listed to administrators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub is_active: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields shared by self-registration and admin creation
struct NewAccount {
    username: String,
    password: String,
    full_name: Option<String>,
    phone_number: Option<String>,
    role_id: i32,
}

/// Accounts, roles and their links
#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Self-service sign up. Defaults to Customer and never grants Admin.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, ServiceError> {
        request.validate()?;

        let role = match request.role_id {
            Some(role_id) => find_role(&*self.db_pool, role_id).await?,
            None => role::Entity::find()
                .filter(role::Column::Name.eq(Role::Customer.to_string()))
                .one(&*self.db_pool)
                .await?
                .ok_or_else(|| {
                    ServiceError::InternalError("Customer role is not seeded".to_string())
                })?,
        };

        let granted = Role::from_str(&role.name).map_err(|_| {
            ServiceError::InternalError(format!("Unrecognised role name {}", role.name))
        })?;
        if granted == Role::Admin {
            warn!("self-registration as Admin rejected");
            return Err(ServiceError::Forbidden(
                "Administrator accounts can only be created by an administrator".to_string(),
            ));
        }

        let user_id = self
            .create_account(NewAccount {
                username: request.username,
                password: request.password,
                full_name: request.full_name,
                phone_number: request.phone_number,
                role_id: role.id,
            })
            .await?;

        Ok(RegisterResponse {
            message: "Registration successful".to_string(),
            user_id,
            role: granted,
        })
    }

    /// Admin account creation with any role, Admin included
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<i32, ServiceError> {
        request.validate()?;
        let role_id = request
            .role_id
            .ok_or_else(|| ServiceError::ValidationError("role_id is required".to_string()))?;
        find_role(&*self.db_pool, role_id).await?;

        self.create_account(NewAccount {
            username: request.username,
            password: request.password,
            full_name: request.full_name,
            phone_number: request.phone_number,
            role_id,
        })
        .await
    }

    async fn create_account(&self, account: NewAccount) -> Result<i32, ServiceError> {
        let password_hash = password::hash_password(&account.password)?;
        let username = account.username.trim().to_string();

        let user_id = with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                claim_rows::<user::Entity, _, _>(txn, user::Column::Username.eq(username.as_str()))
                    .await?;
                let taken = user::Entity::find()
                    .filter(user::Column::Username.eq(username.as_str()))
                    .count(txn)
                    .await?;
                if taken > 0 {
                    return Err(ServiceError::Conflict(format!(
                        "Username {} is already taken",
                        username
                    )));
                }

                let created = user::ActiveModel {
                    username: Set(username.clone()),
                    password_hash: Set(password_hash),
                    full_name: Set(account.full_name),
                    phone_number: Set(account.phone_number),
                    is_active: Set(true),
                    created_at: Set(Utc::now()),
                    updated_at: Set(None),
                    ..Default::default()
                }
                .insert(txn)
                .await
                .map_err(|e| {
                    ServiceError::from_insert(e, &format!("Username {} is already taken", username))
                })?;

                user_role::ActiveModel {
                    user_id: Set(created.id),
                    role_id: Set(account.role_id),
                }
                .insert(txn)
                .await?;

                Ok(created.id)
            })
        })
        .await?;

        info!(user_id, "Account created");
        Ok(user_id)
    }

    pub async fn list_roles(&self) -> Result<Vec<role::Model>, ServiceError> {
        Ok(role::Entity::find()
            .order_by_asc(role::Column::Id)
            .all(&*self.db_pool)
            .await?)
    }

    /// Every account with its role names
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, ServiceError> {
        let rows = user::Entity::find()
            .find_with_related(role::Entity)
            .order_by_asc(user::Column::Id)
            .all(&*self.db_pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(account, roles)| {
                let mut roles: Vec<String> = roles.into_iter().map(|r| r.name).collect();
                roles.sort();
                UserSummary {
                    id: account.id,
                    username: account.username,
                    full_name: account.full_name,
                    phone_number: account.phone_number,
                    is_active: account.is_active,
                    roles,
                    created_at: account.created_at,
                }
            })
            .collect())
    }

    /// Staff accounts, for the assignment picker
    pub async fn list_staff(&self) -> Result<Vec<StaffSummary>, ServiceError> {
        let staff = user::Entity::find()
            .inner_join(role::Entity)
            .filter(role::Column::Name.eq(Role::Staff.to_string()))
            .order_by_asc(user::Column::Id)
            .all(&*self.db_pool)
            .await?;

        Ok(staff
            .into_iter()
            .map(|account| StaffSummary {
                id: account.id,
                name: account.display_name(),
            })
            .collect())
    }

    /// Replaces profile fields and the role set of an account
    #[instrument(skip(self, request))]
    pub async fn update_user(&self, user_id: i32, request: UpdateUserRequest) -> Result<(), ServiceError> {
        request.validate()?;
        let role_id = request
            .new_role_id
            .ok_or_else(|| ServiceError::ValidationError("new_role_id is required".to_string()))?;
        let password_hash = match request.new_password.as_deref() {
            Some(raw) => Some(password::hash_password(raw)?),
            None => None,
        };

        with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                claim_rows::<user::Entity, _, _>(txn, user::Column::Id.eq(user_id)).await?;
                let account = find_user(txn, user_id).await?;
                find_role(txn, role_id).await?;

                let mut active: user::ActiveModel = account.into();
                if let Some(full_name) = request.full_name {
                    active.full_name = Set(Some(full_name));
                }
                if let Some(phone_number) = request.phone_number {
                    active.phone_number = Set(Some(phone_number));
                }
                if let Some(hash) = password_hash {
                    active.password_hash = Set(hash);
                }
                active.updated_at = Set(Some(Utc::now()));
                active.update(txn).await?;

                user_role::Entity::delete_many()
                    .filter(user_role::Column::UserId.eq(user_id))
                    .exec(txn)
                    .await?;
                user_role::ActiveModel {
                    user_id: Set(user_id),
                    role_id: Set(role_id),
                }
                .insert(txn)
                .await?;
                Ok(())
            })
        })
        .await?;

        info!(user_id, role_id, "Account updated");
        Ok(())
    }

    /// Locks or unlocks an account. Admins cannot lock themselves out.
    #[instrument(skip(self, caller), fields(admin_id = caller.id))]
    pub async fn set_active(&self, caller: &AuthUser, user_id: i32, is_active: bool) -> Result<(), ServiceError> {
        if caller.id == user_id {
            return Err(ServiceError::Forbidden(
                "You cannot change the lock state of your own account".to_string(),
            ));
        }

        let updated = user::Entity::update_many()
            .col_expr(user::Column::IsActive, Expr::value(is_active))
            .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user::Column::Id.eq(user_id))
            .exec(&*self.db_pool)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("User {} not found", user_id)));
        }

        info!(user_id, is_active, "Account lock state changed");
        Ok(())
    }

    /// Deletes an account that no order or audit row refers to
    #[instrument(skip(self, caller), fields(admin_id = caller.id))]
    pub async fn delete_user(&self, caller: &AuthUser, user_id: i32) -> Result<(), ServiceError> {
        if caller.id == user_id {
            return Err(ServiceError::Forbidden(
                "You cannot delete your own account".to_string(),
            ));
        }

        with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                claim_rows::<user::Entity, _, _>(txn, user::Column::Id.eq(user_id)).await?;
                find_user(txn, user_id).await?;

                let order_refs = order::Entity::find()
                    .filter(
                        Condition::any()
                            .add(order::Column::CustomerId.eq(user_id))
                            .add(order::Column::StaffId.eq(user_id))
                            .add(order::Column::ManagerId.eq(user_id)),
                    )
                    .count(txn)
                    .await?;
                let delivery_refs = delivery::Entity::find()
                    .filter(
                        Condition::any()
                            .add(delivery::Column::StaffId.eq(user_id))
                            .add(delivery::Column::AssignedBy.eq(user_id)),
                    )
                    .count(txn)
                    .await?;
                if order_refs + delivery_refs > 0 {
                    return Err(ServiceError::Conflict(format!(
                        "User {} is referenced by existing orders; lock the account instead",
                        user_id
                    )));
                }

                user_role::Entity::delete_many()
                    .filter(user_role::Column::UserId.eq(user_id))
                    .exec(txn)
                    .await?;
                user::Entity::delete_by_id(user_id).exec(txn).await?;
                Ok(())
            })
        })
        .await?;

        info!(user_id, "Account deleted");
        Ok(())
    }
}

async fn find_user<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<user::Model, ServiceError> {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
}

/// Unknown role ids are a client error, not a missing resource
async fn find_role<C: ConnectionTrait>(db: &C, role_id: i32) -> Result<role::Model, ServiceError> {
    role::Entity::find_by_id(role_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::ValidationError(format!("Role {} does not exist", role_id)))
}
