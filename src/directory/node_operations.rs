use crate::directory::node::{Attributes, DirectoryNode, NewNode};
use crate::directory::store::{encode_node, id_key, sibling_key, DirectoryStore};
use crate::error::{DirectoryError, DirectoryResult};
use crate::path;
use crate::permissions::Role;
use chrono::Utc;
use log::{debug, info};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, Transactional};

impl DirectoryStore {
    /// Inserts a new node, assigning its id and materialized path.
    ///
    /// The parent, when given, must exist and must be able to own children,
    /// and no sibling may already carry the same name. A secret is only kept
    /// for principals and is hashed before it reaches the store.
    pub fn create(&self, request: NewNode) -> DirectoryResult<DirectoryNode> {
        self.create_checked(request, None)
    }

    /// [`Self::create`], applied only while the store is still at `generation`.
    pub fn create_if_unchanged(&self, request: NewNode, generation: u64) -> DirectoryResult<DirectoryNode> {
        self.create_checked(request, Some(generation))
    }

    fn create_checked(&self, request: NewNode, expected: Option<u64>) -> DirectoryResult<DirectoryNode> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(DirectoryError::invalid_operation("node name must not be empty"));
        }

        let credential_secret = match (&request.secret, request.kind.can_own_children()) {
            (Some(secret), false) => Some(self.hasher.hash_if_needed(secret)?),
            (Some(_), true) => {
                debug!("Ignoring secret supplied for non-principal node '{}'", name);
                None
            }
            (None, _) => None,
        };

        let _gate = self.write_gate()?;
        self.ensure_generation(expected)?;

        let parent = match request.parent_id {
            Some(parent_id) => {
                let parent = self.load_required(parent_id, "Parent node")?;
                if !parent.kind.can_own_children() {
                    return Err(DirectoryError::invalid_operation(format!(
                        "principals cannot own children (parent '{}' is a {})",
                        parent.name, parent.kind
                    )));
                }
                if self.siblings_tree.contains_key(sibling_key(parent_id, &name))? {
                    return Err(DirectoryError::conflict(format!(
                        "a node named '{}' already exists under parent {}",
                        name, parent_id
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        if let Some(admin_target) = request.administers_node_id {
            self.load_required(admin_target, "Administered node")?;
        }

        let id = self.next_id()?;
        let node_path = match &parent {
            Some(parent) => path::child_path(&parent.path, id),
            None => path::root_path(id),
        };
        let now = Utc::now();
        let node = DirectoryNode {
            id,
            name,
            kind: request.kind,
            attributes: request.attributes,
            credential_secret,
            roles: request.roles,
            administers_node_id: request.administers_node_id,
            path: node_path,
            parent_id: request.parent_id,
            created_at: now,
            updated_at: now,
        };

        let key = id_key(id);
        let bytes = encode_node(&node)?;
        let sibling = node.parent_id.map(|parent_id| sibling_key(parent_id, &node.name));

        (&self.nodes_tree, &self.paths_tree, &self.siblings_tree).transaction(
            |(nodes, paths, siblings)| -> ConflictableTransactionResult<(), DirectoryError> {
                if let Some(sibling) = &sibling {
                    if siblings.get(sibling.as_bytes())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(DirectoryError::conflict(
                            format!("a node named '{}' already exists under this parent", node.name),
                        )));
                    }
                    siblings.insert(sibling.as_bytes(), &key[..])?;
                }
                nodes.insert(&key[..], bytes.clone())?;
                paths.insert(node.path.as_bytes(), &key[..])?;
                Ok(())
            },
        )?;

        info!("Created {} '{}' (id={}, path={})", node.kind, node.name, node.id, node.path);
        Ok(node.redacted())
    }

    /// Reparents `node_id` under `new_parent_id` and rewrites the path of the
    /// whole subtree in one transaction.
    ///
    /// Descendants are fetched once through the path index, rebased in memory
    /// and written together with the moved node, so the store either holds the
    /// old paths or the new ones, never a mix.
    pub fn move_node(&self, node_id: u64, new_parent_id: u64) -> DirectoryResult<DirectoryNode> {
        self.move_checked(node_id, new_parent_id, None)
    }

    /// [`Self::move_node`], applied only while the store is still at `generation`.
    pub fn move_node_if_unchanged(
        &self,
        node_id: u64,
        new_parent_id: u64,
        generation: u64,
    ) -> DirectoryResult<DirectoryNode> {
        self.move_checked(node_id, new_parent_id, Some(generation))
    }

    fn move_checked(&self, node_id: u64, new_parent_id: u64, expected: Option<u64>) -> DirectoryResult<DirectoryNode> {
        let _gate = self.write_gate()?;
        self.ensure_generation(expected)?;

        let node = self.load_required(node_id, "Node")?;
        let new_parent = self.load_required(new_parent_id, "New parent node")?;

        if !new_parent.kind.can_own_children() {
            return Err(DirectoryError::invalid_operation(format!(
                "principals cannot own children (new parent '{}' is a {})",
                new_parent.name, new_parent.kind
            )));
        }
        if path::is_descendant_or_self(&node.path, &new_parent.path) {
            return Err(DirectoryError::invalid_operation(format!(
                "cannot move node {} ({}) beneath itself ({})",
                node.id, node.path, new_parent.path
            )));
        }
        if node.parent_id == Some(new_parent_id) {
            debug!("Node {} already lives under {}, nothing to move", node_id, new_parent_id);
            return Ok(node.redacted());
        }

        let new_sibling = sibling_key(new_parent_id, &node.name);
        if self.siblings_tree.contains_key(new_sibling.as_bytes())? {
            return Err(DirectoryError::conflict(format!(
                "a node named '{}' already exists under parent {}",
                node.name, new_parent_id
            )));
        }
        let old_sibling = node.parent_id.map(|parent_id| sibling_key(parent_id, &node.name));

        let old_prefix = node.path.clone();
        let new_prefix = path::child_path(&new_parent.path, node.id);
        let now = Utc::now();

        // (old path, new path, key, encoded node) for the moved node and every descendant
        let mut rewrites = Vec::new();
        let mut moved = None;
        for mut member in self.scan_path_prefix(&old_prefix)? {
            let old_path = member.path.clone();
            member.path = path::rebase(&old_prefix, &new_prefix, &old_path)?;
            if member.id == node.id {
                member.parent_id = Some(new_parent_id);
            }
            member.updated_at = now;
            rewrites.push((old_path, member.path.clone(), id_key(member.id), encode_node(&member)?));
            if member.id == node.id {
                moved = Some(member);
            }
        }
        let moved = moved.ok_or_else(|| {
            DirectoryError::storage(format!("node {} missing from its own path index", node_id))
        })?;
        let moved_key = id_key(moved.id);

        (&self.nodes_tree, &self.paths_tree, &self.siblings_tree).transaction(
            |(nodes, paths, siblings)| -> ConflictableTransactionResult<(), DirectoryError> {
                for (old_path, _, _, _) in &rewrites {
                    paths.remove(old_path.as_bytes())?;
                }
                for (_, new_path, key, bytes) in &rewrites {
                    paths.insert(new_path.as_bytes(), &key[..])?;
                    nodes.insert(&key[..], bytes.clone())?;
                }
                if let Some(old_sibling) = &old_sibling {
                    siblings.remove(old_sibling.as_bytes())?;
                }
                siblings.insert(new_sibling.as_bytes(), &moved_key[..])?;
                Ok(())
            },
        )?;
        self.advance_generation();

        info!(
            "Moved node {} from {} to {} ({} paths rewritten)",
            moved.id,
            old_prefix,
            moved.path,
            rewrites.len()
        );
        Ok(moved.redacted())
    }

    /// Merges `patch` into the node's attributes. A `null` value removes the key.
    pub fn update_attributes(&self, node_id: u64, patch: Attributes) -> DirectoryResult<DirectoryNode> {
        self.update_attributes_checked(node_id, patch, None)
    }

    /// [`Self::update_attributes`], applied only while the store is still at
    /// `generation`.
    pub fn update_attributes_if_unchanged(
        &self,
        node_id: u64,
        patch: Attributes,
        generation: u64,
    ) -> DirectoryResult<DirectoryNode> {
        self.update_attributes_checked(node_id, patch, Some(generation))
    }

    fn update_attributes_checked(
        &self,
        node_id: u64,
        patch: Attributes,
        expected: Option<u64>,
    ) -> DirectoryResult<DirectoryNode> {
        let _gate = self.write_gate()?;
        self.ensure_generation(expected)?;
        let mut node = self.load_required(node_id, "Node")?;

        node.merge_attributes(patch);
        node.updated_at = Utc::now();

        self.nodes_tree.insert(id_key(node.id), encode_node(&node)?)?;
        self.advance_generation();
        info!("Updated attributes of node {} ({})", node.id, node.path);
        Ok(node.redacted())
    }

    /// Replaces the explicit role list and administered-node pointer.
    pub fn set_roles(
        &self,
        node_id: u64,
        roles: Vec<Role>,
        administers_node_id: Option<u64>,
    ) -> DirectoryResult<DirectoryNode> {
        let _gate = self.write_gate()?;
        let mut node = self.load_required(node_id, "Node")?;
        if let Some(admin_target) = administers_node_id {
            self.load_required(admin_target, "Administered node")?;
        }

        node.roles = roles;
        node.administers_node_id = administers_node_id;
        node.updated_at = Utc::now();

        self.nodes_tree.insert(id_key(node.id), encode_node(&node)?)?;
        self.advance_generation();
        info!("Updated roles of node {} to {:?}", node.id, node.roles);
        Ok(node.redacted())
    }
}

#[cfg(test)]
mod tests {
    use crate::directory::node::{NewNode, NodeKind};
    use crate::testing_utils::TestDirectoryFactory;
    use serde_json::json;

    #[test]
    fn test_root_and_child_paths_assigned() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let root = store.create(NewNode::new("com", NodeKind::Domain)).unwrap();
        assert_eq!(root.path, format!("{}.", root.id));
        assert!(root.is_root());

        let unit = store.create(NewNode::new("ventas", NodeKind::Unit).under(root.id)).unwrap();
        assert_eq!(unit.path, format!("{}{}.", root.path, unit.id));
        assert_eq!(unit.parent_id, Some(root.id));
    }

    #[test]
    fn test_secret_is_hashed_and_hidden() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let root = store.create(NewNode::new("com", NodeKind::Domain)).unwrap();
        let juan = store
            .create(NewNode::new("juan", NodeKind::Principal).under(root.id).with_secret("pw"))
            .unwrap();
        assert!(juan.credential_secret.is_none());

        let raw = store.find_principal_by_name_with_secret("juan").unwrap().unwrap();
        let secret = raw.credential_secret.unwrap();
        assert!(secret.starts_with("$argon2"));
        assert!(store.hasher().verify("pw", &secret).unwrap());
    }

    #[test]
    fn test_secret_ignored_for_units() {
        let store = TestDirectoryFactory::create_store().unwrap();
        store
            .create(NewNode::new("ops", NodeKind::Unit).with_secret("pw"))
            .unwrap();
        let _gate = store.read_gate().unwrap();
        let raw = store.scan_all().unwrap();
        assert!(raw[0].credential_secret.is_none());
    }

    #[test]
    fn test_empty_name_rejected() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let err = store.create(NewNode::new("  ", NodeKind::Unit)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERATION");
    }

    #[test]
    fn test_update_attributes_merges_and_removes() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let node = store
            .create(
                NewNode::new("juan", NodeKind::Unit)
                    .with_attribute("email", json!("j@x.com"))
                    .with_attribute("phone", json!("123")),
            )
            .unwrap();

        let mut patch = serde_json::Map::new();
        patch.insert("email".to_string(), json!("juan@x.com"));
        patch.insert("phone".to_string(), serde_json::Value::Null);
        let updated = store.update_attributes(node.id, patch).unwrap();

        assert_eq!(updated.email(), Some("juan@x.com"));
        assert!(updated.attributes.get("phone").is_none());
        assert!(updated.updated_at >= node.updated_at);
    }

    #[test]
    fn test_move_under_itself_rejected() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let a = store.create(NewNode::new("a", NodeKind::Unit)).unwrap();
        let b = store.create(NewNode::new("b", NodeKind::Unit).under(a.id)).unwrap();

        let err = store.move_node(a.id, b.id).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERATION");
        let err = store.move_node(a.id, a.id).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERATION");
    }

    #[test]
    fn test_move_into_name_collision_rejected() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let a = store.create(NewNode::new("a", NodeKind::Unit)).unwrap();
        let b = store.create(NewNode::new("b", NodeKind::Unit)).unwrap();
        store.create(NewNode::new("dup", NodeKind::Unit).under(a.id)).unwrap();
        let dup_b = store.create(NewNode::new("dup", NodeKind::Unit).under(b.id)).unwrap();

        let err = store.move_node(dup_b.id, a.id).unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn test_stale_generation_blocks_mutations() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let a = store.create(NewNode::new("a", NodeKind::Unit)).unwrap();
        let b = store.create(NewNode::new("b", NodeKind::Unit)).unwrap();
        let child = store.create(NewNode::new("child", NodeKind::Unit).under(a.id)).unwrap();

        let seen = store.generation();
        store
            .create_if_unchanged(NewNode::new("other", NodeKind::Unit).under(a.id), seen)
            .unwrap();
        assert_eq!(store.generation(), seen);

        store.move_node(a.id, b.id).unwrap();
        assert!(store.generation() > seen);

        let before = store.len();
        let err = store
            .create_if_unchanged(NewNode::new("late", NodeKind::Unit).under(a.id), seen)
            .unwrap_err();
        assert_eq!(err.error_code(), "STALE_AUTHORIZATION");
        assert_eq!(store.len(), before);

        let err = store.move_node_if_unchanged(child.id, b.id, seen).unwrap_err();
        assert_eq!(err.error_code(), "STALE_AUTHORIZATION");
        assert_eq!(store.find_by_id(child.id).unwrap().unwrap().parent_id, Some(a.id));

        let err = store
            .update_attributes_if_unchanged(child.id, serde_json::Map::new(), seen)
            .unwrap_err();
        assert!(err.is_retryable());

        let current = store.generation();
        store.move_node_if_unchanged(child.id, b.id, current).unwrap();
    }

    #[test]
    fn test_set_roles_requires_existing_admin_target() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let ou = store.create(NewNode::new("ops", NodeKind::Unit)).unwrap();
        let admin = store
            .create(NewNode::new("boss", NodeKind::Principal).under(ou.id))
            .unwrap();

        let err = store
            .set_roles(admin.id, vec![crate::permissions::Role::OuAdmin], Some(999))
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");

        let updated = store
            .set_roles(admin.id, vec![crate::permissions::Role::OuAdmin], Some(ou.id))
            .unwrap();
        assert_eq!(updated.administers_node_id, Some(ou.id));
    }
}
