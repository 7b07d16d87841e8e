//! Authorization.

pub mod rbac;

pub use rbac::{
    require_all_scopes, require_any_scope, require_role, require_scope, RbacEnforcer, Role,
};
