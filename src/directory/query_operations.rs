use crate::directory::node::{DirectoryNode, NodeKind};
use crate::directory::store::DirectoryStore;
use crate::error::DirectoryResult;
use crate::path;

impl DirectoryStore {
    /// Looks a node up by id. Secret material is never returned.
    pub fn find_by_id(&self, id: u64) -> DirectoryResult<Option<DirectoryNode>> {
        let _gate = self.read_gate()?;
        Ok(self.load(id)?.map(DirectoryNode::redacted))
    }

    /// Ancestors of `id` from the root down to its parent, excluding the node
    /// itself. A root yields an empty list.
    pub fn find_ancestors(&self, id: u64) -> DirectoryResult<Vec<DirectoryNode>> {
        let _gate = self.read_gate()?;
        let node = self.load_required(id, "Node")?;
        let segments = path::parse(&node.path)?;

        let mut ancestors = Vec::with_capacity(segments.len().saturating_sub(1));
        for ancestor_id in &segments[..segments.len() - 1] {
            ancestors.push(self.load_required(*ancestor_id, "Ancestor node")?.redacted());
        }
        Ok(ancestors)
    }

    /// Strict descendants of `root_id`, optionally filtered by a
    /// case-insensitive term matched against name or email.
    pub fn search_subtree(&self, root_id: u64, term: Option<&str>) -> DirectoryResult<Vec<DirectoryNode>> {
        let _gate = self.read_gate()?;
        let root = self.load_required(root_id, "Subtree root")?;

        Ok(self
            .scan_path_prefix(&root.path)?
            .into_iter()
            .filter(|node| node.id != root.id)
            .filter(|node| term.map_or(true, |term| node.matches_term(term)))
            .map(DirectoryNode::redacted)
            .collect())
    }

    /// Directory-wide search on name or email, optionally restricted to one kind.
    pub fn search_flat(&self, term: &str, kind: Option<NodeKind>) -> DirectoryResult<Vec<DirectoryNode>> {
        let _gate = self.read_gate()?;
        Ok(self
            .scan_all()?
            .into_iter()
            .filter(|node| kind.map_or(true, |kind| node.kind == kind))
            .filter(|node| node.matches_term(term))
            .map(DirectoryNode::redacted)
            .collect())
    }

    /// Privileged lookup used only by credential verification. The returned
    /// node still carries its hashed secret. When several principals share a
    /// name the one with the lowest id wins.
    pub fn find_principal_by_name_with_secret(&self, name: &str) -> DirectoryResult<Option<DirectoryNode>> {
        let _gate = self.read_gate()?;
        Ok(self
            .scan_all()?
            .into_iter()
            .find(|node| node.is_principal() && node.name == name))
    }

    /// Direct children of `parent_id`, in path order.
    pub fn children(&self, parent_id: u64) -> DirectoryResult<Vec<DirectoryNode>> {
        let _gate = self.read_gate()?;
        let parent = self.load_required(parent_id, "Parent node")?;
        let mut children: Vec<DirectoryNode> = self
            .scan_path_prefix(&parent.path)?
            .into_iter()
            .filter(|node| node.parent_id == Some(parent_id))
            .map(DirectoryNode::redacted)
            .collect();
        // path keys sort "1.10." before "1.2."
        children.sort_by_key(|node| node.id);
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use crate::directory::node::{NewNode, NodeKind};
    use crate::testing_utils::TestDirectoryFactory;
    use serde_json::json;

    #[test]
    fn test_ancestors_exclude_self() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let root = store.create(NewNode::new("com", NodeKind::Domain)).unwrap();
        let ou = store.create(NewNode::new("ventas", NodeKind::Unit).under(root.id)).unwrap();
        let user = store.create(NewNode::new("juan", NodeKind::Principal).under(ou.id)).unwrap();

        let names: Vec<_> = store
            .find_ancestors(user.id)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["com", "ventas"]);
        assert!(store.find_ancestors(root.id).unwrap().is_empty());
        assert_eq!(store.find_ancestors(404).unwrap_err().error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_children_follow_creation_order() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let root = store.create(NewNode::new("com", NodeKind::Domain)).unwrap();
        for i in 0..12 {
            store
                .create(NewNode::new(format!("ou{}", i), NodeKind::Unit).under(root.id))
                .unwrap();
        }

        let ids: Vec<u64> = store.children(root.id).unwrap().iter().map(|n| n.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids.len(), 12);
        assert_eq!(ids, sorted);

        let tree_ids: Vec<u64> = store.full_tree().unwrap()[0]
            .children
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, tree_ids);
    }

    #[test]
    fn test_subtree_search_excludes_root_and_siblings() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let root = store.create(NewNode::new("com", NodeKind::Domain)).unwrap();
        let ventas = store.create(NewNode::new("ventas", NodeKind::Unit).under(root.id)).unwrap();
        let compras = store.create(NewNode::new("compras", NodeKind::Unit).under(root.id)).unwrap();
        store
            .create(
                NewNode::new("juan", NodeKind::Principal)
                    .under(ventas.id)
                    .with_attribute("email", json!("juan@ventas.com")),
            )
            .unwrap();
        store.create(NewNode::new("juana", NodeKind::Principal).under(compras.id)).unwrap();

        let all = store.search_subtree(ventas.id, None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "juan");

        let by_email = store.search_subtree(root.id, Some("VENTAS.COM")).unwrap();
        assert_eq!(by_email.len(), 1);

        let by_name = store.search_subtree(root.id, Some("jua")).unwrap();
        assert_eq!(by_name.len(), 2);
        assert!(by_name.iter().all(|n| n.credential_secret.is_none()));
    }

    #[test]
    fn test_flat_search_filters_kind() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let root = store.create(NewNode::new("ops", NodeKind::Unit)).unwrap();
        store.create(NewNode::new("ops-team", NodeKind::Group).under(root.id)).unwrap();
        store.create(NewNode::new("ops-bot", NodeKind::Principal).under(root.id)).unwrap();

        assert_eq!(store.search_flat("ops", None).unwrap().len(), 3);
        let principals = store.search_flat("ops", Some(NodeKind::Principal)).unwrap();
        assert_eq!(principals.len(), 1);
        assert_eq!(principals[0].name, "ops-bot");
    }

    #[test]
    fn test_children_lists_direct_descendants_only() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let root = store.create(NewNode::new("com", NodeKind::Domain)).unwrap();
        let a = store.create(NewNode::new("a", NodeKind::Unit).under(root.id)).unwrap();
        store.create(NewNode::new("b", NodeKind::Unit).under(root.id)).unwrap();
        store.create(NewNode::new("deep", NodeKind::Unit).under(a.id)).unwrap();

        let names: Vec<_> = store.children(root.id).unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_find_by_id_redacts_secret() {
        let store = TestDirectoryFactory::create_store().unwrap();
        let user = store
            .create(NewNode::new("juan", NodeKind::Principal).with_secret("pw"))
            .unwrap();
        let found = store.find_by_id(user.id).unwrap().unwrap();
        assert!(found.credential_secret.is_none());
        assert!(store.find_by_id(9999).unwrap().is_none());
    }
}
