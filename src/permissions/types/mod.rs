pub mod role;

pub use role::{Permission, Role};
