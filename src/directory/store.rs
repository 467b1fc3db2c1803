use crate::constants::{NODES_TREE, PATHS_TREE, SIBLINGS_TREE, SIBLING_KEY_SEPARATOR};
use crate::credentials::SecretHasher;
use crate::directory::node::DirectoryNode;
use crate::error::{DirectoryError, DirectoryResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Materialized-path tree store backed by sled.
///
/// Three trees are kept in lockstep:
/// - `nodes`: big-endian id -> JSON encoded [`DirectoryNode`]
/// - `paths`: materialized path -> id, the prefix index used for subtree scans
/// - `siblings`: `<parent id>/<name>` -> id, enforcing sibling name uniqueness
///
/// Every mutation commits all three trees in a single sled transaction while
/// holding the exclusive side of `gate`. Readers take the shared side, so a
/// reader can never observe a node whose path disagrees with its parent's in
/// the middle of a move cascade.
///
/// `generation` advances on every change that can alter an authorization
/// outcome (moves, attribute and role updates). The `*_if_unchanged`
/// mutations compare it under the write gate, so a decision taken against
/// generation `g` is only applied while the tree is still at `g`.
#[derive(Clone)]
pub struct DirectoryStore {
    /// The underlying sled database instance
    db: sled::Db,
    pub(crate) nodes_tree: sled::Tree,
    pub(crate) paths_tree: sled::Tree,
    pub(crate) siblings_tree: sled::Tree,
    pub(crate) hasher: Arc<dyn SecretHasher>,
    gate: Arc<RwLock<()>>,
    generation: Arc<AtomicU64>,
}

impl DirectoryStore {
    /// Opens (or creates) the directory trees inside `db`.
    pub fn new(db: sled::Db, hasher: Arc<dyn SecretHasher>) -> DirectoryResult<Self> {
        let nodes_tree = db.open_tree(NODES_TREE)?;
        let paths_tree = db.open_tree(PATHS_TREE)?;
        let siblings_tree = db.open_tree(SIBLINGS_TREE)?;

        Ok(Self {
            db,
            nodes_tree,
            paths_tree,
            siblings_tree,
            hasher,
            gate: Arc::new(RwLock::new(())),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Gets a reference to the underlying database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    pub fn hasher(&self) -> Arc<dyn SecretHasher> {
        Arc::clone(&self.hasher)
    }

    /// Number of stored nodes
    pub fn len(&self) -> usize {
        self.nodes_tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes_tree.is_empty()
    }

    pub fn flush(&self) -> DirectoryResult<()> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn read_gate(&self) -> DirectoryResult<RwLockReadGuard<'_, ()>> {
        self.gate
            .read()
            .map_err(|_| DirectoryError::storage("directory read lock poisoned"))
    }

    pub(crate) fn write_gate(&self) -> DirectoryResult<RwLockWriteGuard<'_, ()>> {
        self.gate
            .write()
            .map_err(|_| DirectoryError::storage("directory write lock poisoned"))
    }

    /// Current authorization generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Callers must hold the write gate.
    pub(crate) fn advance_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Fails with `STALE_AUTHORIZATION` when the tree moved past `expected`.
    /// Callers must hold the write gate.
    pub(crate) fn ensure_generation(&self, expected: Option<u64>) -> DirectoryResult<()> {
        match expected {
            Some(expected) if expected != self.generation() => Err(DirectoryError::StaleAuthorization(format!(
                "directory changed since generation {} (now {})",
                expected,
                self.generation()
            ))),
            _ => Ok(()),
        }
    }

    /// Allocates the next node id. Ids start at 1 and are never reused.
    pub(crate) fn next_id(&self) -> DirectoryResult<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    /// Raw lookup including secret material. Callers must hold a gate.
    pub(crate) fn load(&self, id: u64) -> DirectoryResult<Option<DirectoryNode>> {
        match self.nodes_tree.get(id_key(id))? {
            Some(bytes) => Ok(Some(decode_node(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn load_required(&self, id: u64, what: &str) -> DirectoryResult<DirectoryNode> {
        self.load(id)?
            .ok_or_else(|| DirectoryError::not_found(format!("{} with id {} does not exist", what, id)))
    }

    /// All nodes whose path starts with `prefix`, in path order. Callers must
    /// hold a gate.
    pub(crate) fn scan_path_prefix(&self, prefix: &str) -> DirectoryResult<Vec<DirectoryNode>> {
        let mut nodes = Vec::new();
        for entry in self.paths_tree.scan_prefix(prefix.as_bytes()) {
            let (_, id_bytes) = entry?;
            let id = decode_id(&id_bytes)?;
            match self.load(id)? {
                Some(node) => nodes.push(node),
                None => {
                    return Err(DirectoryError::storage(format!(
                        "path index references missing node {}",
                        id
                    )))
                }
            }
        }
        Ok(nodes)
    }

    /// Every stored node in id order. Callers must hold a gate.
    pub(crate) fn scan_all(&self) -> DirectoryResult<Vec<DirectoryNode>> {
        let mut nodes = Vec::new();
        for entry in self.nodes_tree.iter() {
            let (_, bytes) = entry?;
            nodes.push(decode_node(&bytes)?);
        }
        Ok(nodes)
    }
}

pub(crate) fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub(crate) fn decode_id(bytes: &[u8]) -> DirectoryResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DirectoryError::storage("corrupt node id in index"))?;
    Ok(u64::from_be_bytes(raw))
}

pub(crate) fn sibling_key(parent_id: u64, name: &str) -> String {
    format!("{}{}{}", parent_id, SIBLING_KEY_SEPARATOR, name)
}

pub(crate) fn encode_node(node: &DirectoryNode) -> DirectoryResult<Vec<u8>> {
    Ok(serde_json::to_vec(node)?)
}

pub(crate) fn decode_node(bytes: &[u8]) -> DirectoryResult<DirectoryNode> {
    Ok(serde_json::from_slice(bytes)?)
}
