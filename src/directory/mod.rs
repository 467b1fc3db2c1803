//! Hierarchical directory stored as a materialized-path tree.
//!
//! [`DirectoryStore`] owns persistence and structural integrity. It knows
//! nothing about callers or permissions; that lives in [`crate::auth`].

pub mod node;
mod node_operations;
mod query_operations;
pub mod store;
pub mod tree;

pub use node::{Attributes, DirectoryNode, NewNode, NodeKind};
pub use store::DirectoryStore;
pub use tree::{IntegrityReport, TreeNode};
