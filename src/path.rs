//! Materialized path codec.
//!
//! A node's path is the dot-separated list of its ancestor ids followed by its
//! own id and a trailing separator: a root with id 1 has path `"1."`, its child
//! with id 5 has `"1.5."`. Because every segment is terminated by the separator,
//! plain string prefix tests are exact subtree tests: `"1.2."` is a prefix of
//! `"1.2.5."` but not of `"1.23."`.
//!
//! All functions here are pure and allocation-light. Ids are numeric, so the
//! separator can never appear inside a segment.

use crate::constants::PATH_SEPARATOR;
use crate::error::{DirectoryError, DirectoryResult};

/// True iff `candidate` lies inside the subtree rooted at `ancestor`
/// (inclusive of the ancestor itself).
pub fn is_descendant_or_self(ancestor: &str, candidate: &str) -> bool {
    candidate.starts_with(ancestor)
}

/// True iff `candidate` is a proper prefix of `ancestor_path`, meaning the
/// node at `candidate` sits strictly above the node at `ancestor_path`.
///
/// A path is never a strict ancestor of itself.
pub fn is_strict_ancestor(ancestor_path: &str, candidate: &str) -> bool {
    candidate.len() < ancestor_path.len() && ancestor_path.starts_with(candidate)
}

pub fn root_path(id: u64) -> String {
    format!("{}{}", id, PATH_SEPARATOR)
}

pub fn child_path(parent_path: &str, child_id: u64) -> String {
    format!("{}{}{}", parent_path, child_id, PATH_SEPARATOR)
}

/// Decodes a path into its id segments, root first.
pub fn parse(path: &str) -> DirectoryResult<Vec<u64>> {
    let body = path.strip_suffix(PATH_SEPARATOR).ok_or_else(|| {
        DirectoryError::invalid_path(format!("'{}' is missing the trailing separator", path))
    })?;
    if body.is_empty() {
        return Err(DirectoryError::invalid_path("empty path"));
    }
    body.split(PATH_SEPARATOR)
        .map(|segment| {
            segment.parse::<u64>().map_err(|_| {
                DirectoryError::invalid_path(format!(
                    "segment '{}' of '{}' is not a node id",
                    segment, path
                ))
            })
        })
        .collect()
}

pub fn validate(path: &str) -> DirectoryResult<()> {
    parse(path).map(|_| ())
}

/// Number of segments in the path; a root has depth 1.
pub fn depth(path: &str) -> usize {
    path.matches(PATH_SEPARATOR).count()
}

/// The id the path ends with.
pub fn leaf_id(path: &str) -> DirectoryResult<u64> {
    parse(path)?
        .last()
        .copied()
        .ok_or_else(|| DirectoryError::invalid_path("empty path"))
}

/// Path of the parent, or `None` for a root path.
pub fn parent_path(path: &str) -> Option<&str> {
    let body = path.strip_suffix(PATH_SEPARATOR)?;
    body.rfind(PATH_SEPARATOR).map(|idx| &path[..=idx])
}

/// Rewrites `path` so that its `old_prefix` is replaced by `new_prefix`.
///
/// Used by the move cascade: every descendant keeps its own suffix of ids and
/// only the portion above the moved node changes.
pub fn rebase(old_prefix: &str, new_prefix: &str, path: &str) -> DirectoryResult<String> {
    let suffix = path.strip_prefix(old_prefix).ok_or_else(|| {
        DirectoryError::invalid_path(format!(
            "'{}' does not lie under '{}'",
            path, old_prefix
        ))
    })?;
    Ok(format!("{}{}", new_prefix, suffix))
}
