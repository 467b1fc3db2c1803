//! Whole-tree views: nested rendering and structural integrity checks.

use crate::directory::node::{DirectoryNode, NodeKind};
use crate::directory::store::{decode_id, id_key, sibling_key, DirectoryStore};
use crate::error::DirectoryResult;
use crate::path;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A node together with its nested children.
///
/// Building, sizing and rendering walk the tree with explicit stacks, so they
/// handle chains of any depth. Serde serialization still recurses once per
/// level, and deserializing with serde_json stops at 128 levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: u64,
    pub name: String,
    pub kind: NodeKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(node: &DirectoryNode) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            kind: node.kind,
            path: node.path.clone(),
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, itself included.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            pending.extend(node.children.iter());
        }
        count
    }

    /// Indented, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut pending = vec![(self, 0usize)];
        while let Some((node, indent)) = pending.pop() {
            out.push_str(&"  ".repeat(indent));
            out.push_str(&format!("{} [{}] #{}\n", node.name, node.kind, node.id));
            pending.extend(node.children.iter().rev().map(|child| (child, indent + 1)));
        }
        out
    }
}

/// Result of [`DirectoryStore::verify_integrity`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub checked: usize,
    pub violations: Vec<String>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

impl DirectoryStore {
    /// Every root with its descendants nested beneath it, siblings in id order.
    pub fn full_tree(&self) -> DirectoryResult<Vec<TreeNode>> {
        let _gate = self.read_gate()?;
        let nodes = self.scan_all()?;

        let mut by_parent: HashMap<Option<u64>, Vec<&DirectoryNode>> = HashMap::new();
        for node in &nodes {
            by_parent.entry(node.parent_id).or_default().push(node);
        }
        for siblings in by_parent.values_mut() {
            siblings.sort_by_key(|node| node.id);
        }

        // Breadth-first from the roots, then assembled bottom-up so the depth
        // of the tree never reaches the call stack.
        let mut order: Vec<&DirectoryNode> = by_parent.get(&None).cloned().unwrap_or_default();
        let mut next = 0;
        while next < order.len() {
            let id = order[next].id;
            if let Some(children) = by_parent.get(&Some(id)) {
                order.extend(children.iter().copied());
            }
            next += 1;
        }

        let mut built: HashMap<u64, TreeNode> = HashMap::with_capacity(order.len());
        for node in order.iter().rev() {
            let mut tree = TreeNode::leaf(node);
            if let Some(children) = by_parent.get(&Some(node.id)) {
                tree.children = children
                    .iter()
                    .filter_map(|child| built.remove(&child.id))
                    .collect();
            }
            built.insert(node.id, tree);
        }

        Ok(by_parent
            .get(&None)
            .map(|roots| roots.iter().filter_map(|root| built.remove(&root.id)).collect())
            .unwrap_or_default())
    }

    /// Checks that every stored path equals its parent's path plus its own id,
    /// that the path and sibling indexes agree with the node records, and that
    /// no principal owns children.
    pub fn verify_integrity(&self) -> DirectoryResult<IntegrityReport> {
        let _gate = self.read_gate()?;
        let nodes = self.scan_all()?;
        let by_id: BTreeMap<u64, &DirectoryNode> = nodes.iter().map(|n| (n.id, n)).collect();
        let mut report = IntegrityReport {
            checked: nodes.len(),
            violations: Vec::new(),
        };

        for node in &nodes {
            let expected = match node.parent_id {
                None => path::root_path(node.id),
                Some(parent_id) => match by_id.get(&parent_id) {
                    Some(parent) => {
                        if parent.kind == NodeKind::Principal {
                            report
                                .violations
                                .push(format!("node {} has principal {} as parent", node.id, parent.id));
                        }
                        let expected_sibling = sibling_key(parent_id, &node.name);
                        if self.siblings_tree.get(expected_sibling.as_bytes())?.as_deref()
                            != Some(&id_key(node.id)[..])
                        {
                            report
                                .violations
                                .push(format!("sibling index entry '{}' does not point at {}", expected_sibling, node.id));
                        }
                        path::child_path(&parent.path, node.id)
                    }
                    None => {
                        report
                            .violations
                            .push(format!("node {} references missing parent {}", node.id, parent_id));
                        continue;
                    }
                },
            };
            if node.path != expected {
                report.violations.push(format!(
                    "node {} has path '{}', expected '{}'",
                    node.id, node.path, expected
                ));
            }
            if self.paths_tree.get(node.path.as_bytes())?.as_deref() != Some(&id_key(node.id)[..]) {
                report
                    .violations
                    .push(format!("path index entry '{}' does not point at {}", node.path, node.id));
            }
        }

        for entry in self.paths_tree.iter() {
            let (key, value) = entry?;
            let id = decode_id(&value)?;
            match by_id.get(&id) {
                Some(node) if node.path.as_bytes() == &key[..] => {}
                _ => report.violations.push(format!(
                    "stale path index entry '{}' -> {}",
                    String::from_utf8_lossy(&key),
                    id
                )),
            }
        }

        if !report.is_consistent() {
            log::warn!(
                "Directory integrity check found {} violation(s) across {} nodes",
                report.violations.len(),
                report.checked
            );
        }
        Ok(report)
    }
}
