//! Role to permission mapping.

pub mod permission_manager;
pub mod types;
pub use permission_manager::PermissionManager;
pub use types::{Permission, Role};
