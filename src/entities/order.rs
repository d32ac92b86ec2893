use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Lifecycle of an order.
///
/// `Pending -> Assigned -> In Progress -> {Completed | Delivered | Cancelled}`,
/// with unassign taking `Assigned`/`In Progress` back to `Pending`.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Assigned")]
    Assigned,
    #[sea_orm(string_value = "In Progress")]
    #[serde(rename = "In Progress")]
    #[strum(serialize = "In Progress")]
    InProgress,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Statuses an assigned staff member may move an order to
    pub const STAFF_TARGETS: [OrderStatus; 4] = [
        OrderStatus::InProgress,
        OrderStatus::Completed,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Statuses in which an order is held by a staff member
    pub const ACTIVE: [OrderStatus; 2] = [OrderStatus::Assigned, OrderStatus::InProgress];

    /// No edit, delete or transition is allowed once an order is terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }
}

/// The `orders` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Owner; the customer who placed the order
    pub customer_id: i32,
    /// Assignee; set exactly when the order is out of `Pending`
    pub staff_id: Option<i32>,
    /// Manager or admin who made the assignment
    pub manager_id: Option<i32>,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub delivery_address: String,
    pub phone_number: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::delivery::Entity")]
    Deliveries,
    #[sea_orm(
        belongs_to = "crate::auth::user::Entity",
        from = "Column::CustomerId",
        to = "crate::auth::user::Column::Id"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "crate::auth::user::Entity",
        from = "Column::StaffId",
        to = "crate::auth::user::Column::Id"
    )]
    Staff,
    #[sea_orm(
        belongs_to = "crate::auth::user::Entity",
        from = "Column::ManagerId",
        to = "crate::auth::user::Column::Id"
    )]
    Manager,
}

impl Related<super::delivery::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Deliveries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
