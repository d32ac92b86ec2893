//! Who may move an order where.
//!
//! Pure predicates over (caller role, caller id, owner or assignee id, current
//! status). The order service evaluates them inside its transaction, against
//! the row it has just locked.

use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;

use super::Role;

/// Why an edit or delete was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDenial {
    /// Completed and Cancelled orders are frozen for every role
    Terminal(OrderStatus),
    /// Wrong owner, wrong role, or a customer touching a non-Pending order
    NotPermitted,
}

impl OrderDenial {
    pub fn into_service_error(self, action: &str) -> ServiceError {
        match self {
            OrderDenial::Terminal(status) => ServiceError::InvalidStatus(format!(
                "Cannot {} an order that is {}",
                action, status
            )),
            OrderDenial::NotPermitted => ServiceError::Forbidden(format!(
                "You are not allowed to {} this order",
                action
            )),
        }
    }
}

/// Edit and delete share one rule: terminal status wins over role, then an
/// Admin may touch anything, a Customer only their own Pending order.
pub fn check_order_modification(
    role: Role,
    caller_id: i32,
    owner_id: i32,
    status: OrderStatus,
) -> Result<(), OrderDenial> {
    if status.is_terminal() {
        return Err(OrderDenial::Terminal(status));
    }
    match role {
        Role::Admin => Ok(()),
        Role::Customer if caller_id == owner_id && status == OrderStatus::Pending => Ok(()),
        _ => Err(OrderDenial::NotPermitted),
    }
}

/// Only Pending orders can be handed to a staff member
pub fn can_assign(status: OrderStatus) -> bool {
    status == OrderStatus::Pending
}

/// Only orders held by a staff member can be taken back
pub fn can_unassign(status: OrderStatus) -> bool {
    status.is_active()
}

/// Statuses a staff member may request at all
pub fn is_staff_target(status: OrderStatus) -> bool {
    OrderStatus::STAFF_TARGETS.contains(&status)
}

/// The assigned staff member may progress an order they currently hold
pub fn can_update_status(caller_id: i32, assigned_staff: Option<i32>, current: OrderStatus) -> bool {
    assigned_staff == Some(caller_id) && current.is_active()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const OWNER: i32 = 11;
    const STRANGER: i32 = 12;

    #[rstest]
    #[case(Role::Customer, OWNER, OrderStatus::Pending, Ok(()))]
    #[case(Role::Customer, OWNER, OrderStatus::Assigned, Err(OrderDenial::NotPermitted))]
    #[case(Role::Customer, STRANGER, OrderStatus::Pending, Err(OrderDenial::NotPermitted))]
    #[case(Role::Admin, STRANGER, OrderStatus::InProgress, Ok(()))]
    #[case(Role::Admin, STRANGER, OrderStatus::Delivered, Ok(()))]
    #[case(Role::Manager, OWNER, OrderStatus::Pending, Err(OrderDenial::NotPermitted))]
    #[case(Role::Staff, OWNER, OrderStatus::Pending, Err(OrderDenial::NotPermitted))]
    #[case(
        Role::Admin,
        OWNER,
        OrderStatus::Completed,
        Err(OrderDenial::Terminal(OrderStatus::Completed))
    )]
    #[case(
        Role::Customer,
        OWNER,
        OrderStatus::Cancelled,
        Err(OrderDenial::Terminal(OrderStatus::Cancelled))
    )]
    fn modification_rules(
        #[case] role: Role,
        #[case] caller: i32,
        #[case] status: OrderStatus,
        #[case] expected: Result<(), OrderDenial>,
    ) {
        assert_eq!(check_order_modification(role, caller, OWNER, status), expected);
    }

    #[test]
    fn denials_map_to_distinct_errors() {
        let terminal = OrderDenial::Terminal(OrderStatus::Completed).into_service_error("edit");
        let forbidden = OrderDenial::NotPermitted.into_service_error("edit");
        assert_eq!(terminal.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(forbidden.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn assignment_preconditions() {
        assert!(can_assign(OrderStatus::Pending));
        assert!(!can_assign(OrderStatus::Assigned));
        assert!(can_unassign(OrderStatus::Assigned));
        assert!(can_unassign(OrderStatus::InProgress));
        assert!(!can_unassign(OrderStatus::Pending));
        assert!(!can_unassign(OrderStatus::Delivered));
    }

    #[test]
    fn staff_updates_need_the_assignee_and_an_active_order() {
        assert!(can_update_status(9, Some(9), OrderStatus::Assigned));
        assert!(can_update_status(9, Some(9), OrderStatus::InProgress));
        assert!(!can_update_status(7, Some(9), OrderStatus::Assigned));
        assert!(!can_update_status(9, None, OrderStatus::Pending));
        assert!(!can_update_status(9, Some(9), OrderStatus::Completed));
    }

    #[test]
    fn staff_cannot_request_pending_or_assigned() {
        assert!(!is_staff_target(OrderStatus::Pending));
        assert!(!is_staff_target(OrderStatus::Assigned));
        assert!(is_staff_target(OrderStatus::Delivered));
    }
}
