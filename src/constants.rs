/// Common constants used across the orgtree crate.
///
/// These defaults are used for command line arguments and
/// configuration when explicit values are not provided.
pub const PATH_SEPARATOR: char = '.';

/// Key separating a parent id from a child name in the sibling index.
pub const SIBLING_KEY_SEPARATOR: char = '/';

/// Prefix carried by every Argon2 PHC string; used to skip re-hashing.
pub const HASH_FORMAT_MARKER: &str = "$argon2";

pub const DEFAULT_STORAGE_PATH: &str = "data/orgtree";
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
pub const DEFAULT_AUDIT_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Times a mutation is re-authorized after the tree changed underneath it.
pub const MAX_AUTHORIZATION_ATTEMPTS: usize = 3;

// sled tree names
pub const NODES_TREE: &str = "directory_nodes";
pub const PATHS_TREE: &str = "directory_paths";
pub const SIBLINGS_TREE: &str = "directory_siblings";
