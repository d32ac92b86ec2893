/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Roles are a closed set. Route guards check plain set membership; the only
 * ordering between roles is the privilege rank used to pick the single role
 * embedded in a session token when an account holds several.
 */

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::warn;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Customer,
}

impl Role {
    /// Higher wins when choosing the primary role
    pub fn privilege_rank(self) -> u8 {
        match self {
            Role::Admin => 4,
            Role::Manager => 3,
            Role::Staff => 2,
            Role::Customer => 1,
        }
    }

    pub fn all() -> Vec<Role> {
        Role::iter().collect()
    }
}

/// Allowed-role sets, one per group of routes
pub mod sets {
    use super::Role;

    pub const ADMIN: &[Role] = &[Role::Admin];
    pub const MANAGEMENT: &[Role] = &[Role::Admin, Role::Manager];
    pub const STAFF: &[Role] = &[Role::Staff];
    pub const CUSTOMER: &[Role] = &[Role::Customer];
    pub const ORDER_PLACERS: &[Role] = &[Role::Customer, Role::Admin];
    pub const ORDER_EDITORS: &[Role] = &[Role::Customer, Role::Admin];
}

/// Picks the highest-privilege role from the names stored for an account.
///
/// Unknown names are skipped with a warning; `None` means the account holds
/// no usable role.
pub fn primary_role<'a, I>(role_names: I) -> Option<Role>
where
    I: IntoIterator<Item = &'a str>,
{
    role_names
        .into_iter()
        .filter_map(|name| match name.parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                warn!(role = name, "ignoring unknown role name");
                None
            }
        })
        .max_by_key(|role| role.privilege_rank())
}

/// Simple set-containment check, no hierarchy
pub fn is_allowed(role: Role, allowed: &[Role]) -> bool {
    allowed.contains(&role)
}
