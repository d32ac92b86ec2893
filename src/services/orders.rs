//! Order lifecycle: creation, assignment, staff progress, edits and deletion.
//!
//! Every mutation runs in one transaction through [`with_transaction`]: the
//! order row is read with a row lock, the permission predicate is evaluated
//! against that snapshot, and the write repeats the precondition in its
//! `WHERE` clause. A write that matches nothing is reported, never ignored.

use crate::{
    auth::{
        self,
        permissions::{self, OrderDenial},
        user, AuthUser, Role,
    },
    db::{claim_rows, with_transaction, DbPool},
    entities::{
        delivery,
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    },
    errors::ServiceError,
    handlers::common::not_blank,
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

/// Body of create and edit requests
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderDetails {
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub description: String,
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub address: String,
    #[serde(default)]
    #[validate(custom = "not_blank", length(max = 32))]
    pub phone: String,
    /// Defaults to 0 when omitted
    pub total: Option<Decimal>,
}

impl OrderDetails {
    fn total_amount(&self) -> Result<Decimal, ServiceError> {
        let total = self.total.unwrap_or(Decimal::ZERO);
        if total < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "total must not be negative".to_string(),
            ));
        }
        Ok(total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssignOrderRequest {
    #[validate(required)]
    pub staff_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    #[validate(custom = "not_blank")]
    pub status: String,
}

/// An order as listed to clients, with the names of the people involved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    pub id: i32,
    pub customer_id: i32,
    pub customer_name: Option<String>,
    pub staff_id: Option<i32>,
    pub staff_name: Option<String>,
    pub manager_id: Option<i32>,
    pub description: String,
    pub delivery_address: String,
    pub phone_number: String,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Parses a staff-requested status, rejecting anything outside the staff set
pub fn parse_staff_target(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw.trim())
        .ok()
        .filter(|status| permissions::is_staff_target(*status))
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Invalid status '{}'. Allowed: In Progress, Completed, Delivered, Cancelled",
                raw
            ))
        })
}

/// Service for the order state machine
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Places a new Pending order owned by the caller
    #[instrument(skip(self, caller, details), fields(customer_id = caller.id))]
    pub async fn create_order(
        &self,
        caller: &AuthUser,
        details: OrderDetails,
    ) -> Result<OrderModel, ServiceError> {
        details.validate()?;
        let total = details.total_amount()?;
        let customer_id = caller.id;

        let created = with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                let model = order::ActiveModel {
                    customer_id: Set(customer_id),
                    staff_id: Set(None),
                    manager_id: Set(None),
                    description: Set(details.description.trim().to_string()),
                    delivery_address: Set(details.address.trim().to_string()),
                    phone_number: Set(details.phone.trim().to_string()),
                    total_amount: Set(total),
                    status: Set(OrderStatus::Pending),
                    created_at: Set(Utc::now()),
                    updated_at: Set(None),
                    ..Default::default()
                };
                Ok(model.insert(txn).await?)
            })
        })
        .await?;

        info!(order_id = created.id, "Order created");
        Ok(created)
    }

    /// The caller's own orders, newest first
    #[instrument(skip(self))]
    pub async fn list_customer_orders(&self, customer_id: i32) -> Result<Vec<OrderView>, ServiceError> {
        let orders = newest_first(OrderEntity::find())
            .filter(order::Column::CustomerId.eq(customer_id))
            .all(&*self.db_pool)
            .await?;
        self.to_views(orders).await
    }

    /// Every order, newest first
    #[instrument(skip(self))]
    pub async fn list_all_orders(&self) -> Result<Vec<OrderView>, ServiceError> {
        let orders = newest_first(OrderEntity::find())
            .all(&*self.db_pool)
            .await?;
        self.to_views(orders).await
    }

    /// Orders currently held by a staff member
    #[instrument(skip(self))]
    pub async fn list_assigned_tasks(&self, staff_id: i32) -> Result<Vec<OrderView>, ServiceError> {
        let orders = newest_first(OrderEntity::find())
            .filter(order::Column::StaffId.eq(staff_id))
            .filter(order::Column::Status.is_in(OrderStatus::ACTIVE))
            .all(&*self.db_pool)
            .await?;
        self.to_views(orders).await
    }

    /// Pending -> Assigned, recording the manager and an audit row
    #[instrument(skip(self, caller), fields(manager_id = caller.id))]
    pub async fn assign_order(
        &self,
        caller: &AuthUser,
        order_id: i32,
        staff_id: i32,
    ) -> Result<(), ServiceError> {
        let manager_id = caller.id;

        with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                let current = lock_order(txn, order_id).await?;
                if !permissions::can_assign(current.status) {
                    warn!(order_id, status = %current.status, "assign rejected");
                    return Err(ServiceError::InvalidStatus(format!(
                        "Cannot assign. Order status: {}",
                        current.status
                    )));
                }

                ensure_assignable_staff(txn, staff_id).await?;

                let now = Utc::now();
                let updated = OrderEntity::update_many()
                    .col_expr(order::Column::StaffId, Expr::value(staff_id))
                    .col_expr(order::Column::ManagerId, Expr::value(manager_id))
                    .col_expr(order::Column::Status, Expr::value(OrderStatus::Assigned))
                    .col_expr(order::Column::UpdatedAt, Expr::value(now))
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(OrderStatus::Pending))
                    .exec(txn)
                    .await?;
                if updated.rows_affected == 0 {
                    return Err(ServiceError::InvalidStatus(
                        "Cannot assign. Order is no longer Pending".to_string(),
                    ));
                }

                record_delivery(txn, order_id, staff_id, manager_id, OrderStatus::Assigned)
                    .await?;
                Ok(())
            })
        })
        .await?;

        info!(order_id, staff_id, "Order assigned");
        Ok(())
    }

    /// Assigned / In Progress -> Pending, clearing staff and manager
    #[instrument(skip(self, caller), fields(manager_id = caller.id))]
    pub async fn unassign_order(&self, caller: &AuthUser, order_id: i32) -> Result<(), ServiceError> {
        let manager_id = caller.id;

        with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                let current = lock_order(txn, order_id).await?;
                if !permissions::can_unassign(current.status) {
                    warn!(order_id, status = %current.status, "unassign rejected");
                    return Err(ServiceError::InvalidStatus(format!(
                        "Cannot unassign. Order status: {}",
                        current.status
                    )));
                }

                let updated = OrderEntity::update_many()
                    .col_expr(order::Column::StaffId, Expr::value(Option::<i32>::None))
                    .col_expr(order::Column::ManagerId, Expr::value(Option::<i32>::None))
                    .col_expr(order::Column::Status, Expr::value(OrderStatus::Pending))
                    .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.is_in(OrderStatus::ACTIVE))
                    .exec(txn)
                    .await?;
                if updated.rows_affected == 0 {
                    return Err(ServiceError::InvalidStatus(
                        "Cannot unassign. Order is no longer assigned".to_string(),
                    ));
                }

                let released_staff = current.staff_id.unwrap_or(manager_id);
                record_delivery(
                    txn,
                    order_id,
                    released_staff,
                    manager_id,
                    OrderStatus::Cancelled,
                )
                .await?;
                Ok(())
            })
        })
        .await?;

        info!(order_id, "Order returned to Pending");
        Ok(())
    }

    /// Staff progress update. The status is checked before any database work;
    /// an order that is missing, held by someone else, or no longer active
    /// all answer with the same Forbidden.
    #[instrument(skip(self, caller), fields(staff_id = caller.id))]
    pub async fn update_status(
        &self,
        caller: &AuthUser,
        order_id: i32,
        requested: &str,
    ) -> Result<OrderStatus, ServiceError> {
        let target = parse_staff_target(requested)?;
        let staff_id = caller.id;

        with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                let not_permitted = || {
                    ServiceError::Forbidden(
                        "Order not found or not assigned to you".to_string(),
                    )
                };

                let current = read_locked(txn, order_id).await?.ok_or_else(not_permitted)?;
                if !permissions::can_update_status(staff_id, current.staff_id, current.status) {
                    warn!(order_id, status = %current.status, "status update rejected");
                    return Err(not_permitted());
                }

                let updated = OrderEntity::update_many()
                    .col_expr(order::Column::Status, Expr::value(target))
                    .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::StaffId.eq(staff_id))
                    .filter(order::Column::Status.is_in(OrderStatus::ACTIVE))
                    .exec(txn)
                    .await?;
                if updated.rows_affected == 0 {
                    return Err(not_permitted());
                }

                record_delivery(txn, order_id, staff_id, staff_id, target).await?;
                Ok(())
            })
        })
        .await?;

        info!(order_id, status = %target, "Order status updated");
        Ok(target)
    }

    /// Edits description, address, phone and total in place
    #[instrument(skip(self, caller, details), fields(user_id = caller.id))]
    pub async fn edit_order(
        &self,
        caller: &AuthUser,
        order_id: i32,
        details: OrderDetails,
    ) -> Result<(), ServiceError> {
        details.validate()?;
        let total = details.total_amount()?;
        let actor = caller.clone();

        with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                let current = lock_order(txn, order_id).await?;
                check_modification(&actor, &current, "edit")?;

                let updated = OrderEntity::update_many()
                    .col_expr(
                        order::Column::Description,
                        Expr::value(details.description.trim().to_string()),
                    )
                    .col_expr(
                        order::Column::DeliveryAddress,
                        Expr::value(details.address.trim().to_string()),
                    )
                    .col_expr(
                        order::Column::PhoneNumber,
                        Expr::value(details.phone.trim().to_string()),
                    )
                    .col_expr(order::Column::TotalAmount, Expr::value(total))
                    .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(current.status))
                    .exec(txn)
                    .await?;
                if updated.rows_affected == 0 {
                    return Err(changed_underneath(order_id));
                }
                Ok(())
            })
        })
        .await?;

        info!(order_id, "Order edited");
        Ok(())
    }

    /// Removes the order's audit rows, then the order itself
    #[instrument(skip(self, caller), fields(user_id = caller.id))]
    pub async fn delete_order(&self, caller: &AuthUser, order_id: i32) -> Result<(), ServiceError> {
        let actor = caller.clone();

        with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                let current = lock_order(txn, order_id).await?;
                check_modification(&actor, &current, "delete")?;

                delivery::Entity::delete_many()
                    .filter(delivery::Column::OrderId.eq(order_id))
                    .exec(txn)
                    .await?;

                let deleted = OrderEntity::delete_many()
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(current.status))
                    .exec(txn)
                    .await?;
                if deleted.rows_affected == 0 {
                    return Err(changed_underneath(order_id));
                }
                Ok(())
            })
        })
        .await?;

        info!(order_id, "Order deleted");
        Ok(())
    }

    async fn to_views(&self, orders: Vec<OrderModel>) -> Result<Vec<OrderView>, ServiceError> {
        let ids: HashSet<i32> = orders
            .iter()
            .flat_map(|o| std::iter::once(o.customer_id).chain(o.staff_id))
            .collect();

        let names: HashMap<i32, String> = if ids.is_empty() {
            HashMap::new()
        } else {
            user::Entity::find()
                .filter(user::Column::Id.is_in(ids))
                .all(&*self.db_pool)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to load names for order listing");
                    ServiceError::DatabaseError(e)
                })?
                .into_iter()
                .map(|u| (u.id, u.display_name()))
                .collect()
        };

        Ok(orders
            .into_iter()
            .map(|o| OrderView {
                customer_name: names.get(&o.customer_id).cloned(),
                staff_name: o.staff_id.and_then(|id| names.get(&id).cloned()),
                id: o.id,
                customer_id: o.customer_id,
                staff_id: o.staff_id,
                manager_id: o.manager_id,
                description: o.description,
                delivery_address: o.delivery_address,
                phone_number: o.phone_number,
                total_amount: o.total_amount,
                status: o.status,
                created_at: o.created_at,
                updated_at: o.updated_at,
            })
            .collect())
    }
}

fn newest_first(select: sea_orm::Select<OrderEntity>) -> sea_orm::Select<OrderEntity> {
    select
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
}

/// Reads the order row under the transaction's write lock
async fn read_locked<C: ConnectionTrait>(db: &C, order_id: i32) -> Result<Option<OrderModel>, ServiceError> {
    claim_rows::<OrderEntity, _, _>(db, order::Column::Id.eq(order_id)).await?;
    Ok(OrderEntity::find_by_id(order_id)
        .lock_exclusive()
        .one(db)
        .await?)
}

async fn lock_order<C: ConnectionTrait>(db: &C, order_id: i32) -> Result<OrderModel, ServiceError> {
    read_locked(db, order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

fn check_modification(
    actor: &AuthUser,
    current: &OrderModel,
    action: &str,
) -> Result<(), ServiceError> {
    permissions::check_order_modification(actor.role, actor.id, current.customer_id, current.status)
        .map_err(|denial| {
            match denial {
                OrderDenial::Terminal(_) => {
                    warn!(order_id = current.id, status = %current.status, action, "terminal order")
                }
                OrderDenial::NotPermitted => {
                    warn!(order_id = current.id, user_id = actor.id, action, "not permitted")
                }
            }
            denial.into_service_error(action)
        })
}

fn changed_underneath(order_id: i32) -> ServiceError {
    ServiceError::InvalidStatus(format!(
        "Order {} changed while it was being updated; reload and retry",
        order_id
    ))
}

/// The assignee must be an active account holding the Staff role
async fn ensure_assignable_staff<C: ConnectionTrait>(db: &C, staff_id: i32) -> Result<(), ServiceError> {
    let account = user::Entity::find_by_id(staff_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::ValidationError(format!("User {} does not exist", staff_id)))?;

    if !account.is_active {
        return Err(ServiceError::ValidationError(format!(
            "User {} is locked and cannot be assigned",
            staff_id
        )));
    }

    let roles = auth::role_names(db, staff_id).await?;
    if !roles.iter().any(|name| name == &Role::Staff.to_string()) {
        return Err(ServiceError::ValidationError(format!(
            "User {} is not a staff member",
            staff_id
        )));
    }
    Ok(())
}

async fn record_delivery<C: ConnectionTrait>(
    db: &C,
    order_id: i32,
    staff_id: i32,
    assigned_by: i32,
    status: OrderStatus,
) -> Result<(), ServiceError> {
    delivery::ActiveModel {
        order_id: Set(order_id),
        staff_id: Set(staff_id),
        assigned_by: Set(assigned_by),
        status: Set(status),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}
