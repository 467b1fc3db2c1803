use orgtree::directory::{DirectoryStore, NewNode, NodeKind, TreeNode};
use orgtree::path;
use orgtree::testing_utils::TestDirectoryFactory;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn unit(store: &DirectoryStore, name: &str, parent: Option<u64>) -> u64 {
    let mut request = NewNode::new(name, NodeKind::Unit);
    request.parent_id = parent;
    store.create(request).unwrap().id
}

fn assert_paths_consistent(tree: &TreeNode) {
    for child in &tree.children {
        assert_eq!(child.path, path::child_path(&tree.path, child.id));
        assert_paths_consistent(child);
    }
}

#[test]
fn test_child_path_extends_parent_path() {
    let store = TestDirectoryFactory::create_store().unwrap();
    let root = unit(&store, "com", None);
    let mut parent = root;
    for depth in 0..6 {
        parent = unit(&store, &format!("level{}", depth), Some(parent));
    }

    let leaf = store.find_by_id(parent).unwrap().unwrap();
    assert_eq!(leaf.depth(), 7);
    assert_eq!(store.find_ancestors(parent).unwrap().len(), 6);
    assert!(store.verify_integrity().unwrap().is_consistent());
}

#[test]
fn test_move_rewrites_every_descendant() {
    let store = TestDirectoryFactory::create_store().unwrap();
    let root = unit(&store, "com", None);
    let ventas = unit(&store, "ventas", Some(root));
    let compras = unit(&store, "compras", Some(root));
    let norte = unit(&store, "norte", Some(ventas));
    let sur = unit(&store, "sur", Some(ventas));
    let juan = store
        .create(NewNode::new("juan", NodeKind::Principal).under(norte))
        .unwrap()
        .id;

    let old_root_path = store.find_by_id(ventas).unwrap().unwrap().path;
    let moved = store.move_node(ventas, compras).unwrap();
    assert_eq!(moved.parent_id, Some(compras));

    for id in [norte, sur, juan] {
        let node = store.find_by_id(id).unwrap().unwrap();
        assert!(path::is_descendant_or_self(&moved.path, &node.path));
        assert!(!path::is_descendant_or_self(&old_root_path, &node.path));
    }
    assert_eq!(store.search_subtree(compras, None).unwrap().len(), 4);
    assert_eq!(store.search_subtree(root, Some("juan")).unwrap().len(), 1);
    assert!(store.verify_integrity().unwrap().is_consistent());
}

#[test]
fn test_move_large_subtree() {
    let store = TestDirectoryFactory::create_store().unwrap();
    let root = unit(&store, "root", None);
    let a = unit(&store, "a", Some(root));
    let b = unit(&store, "b", Some(root));
    for i in 0..20 {
        let team = unit(&store, &format!("team{}", i), Some(a));
        for j in 0..10 {
            store
                .create(NewNode::new(format!("user{}", j), NodeKind::Principal).under(team))
                .unwrap();
        }
    }

    store.move_node(a, b).unwrap();
    let report = store.verify_integrity().unwrap();
    assert_eq!(report.checked, 3 + 20 + 200);
    assert!(report.is_consistent(), "{:?}", report.violations);
    assert_eq!(store.search_subtree(b, None).unwrap().len(), 1 + 20 + 200);
}

#[test]
fn test_duplicate_sibling_name_conflicts() {
    let store = TestDirectoryFactory::create_store().unwrap();
    let root = unit(&store, "com", None);
    unit(&store, "X", Some(root));

    let err = store.create(NewNode::new("X", NodeKind::Group).under(root)).unwrap_err();
    assert_eq!(err.error_code(), "CONFLICT");

    // same name elsewhere is fine
    let other = unit(&store, "other", Some(root));
    unit(&store, "X", Some(other));
}

#[test]
fn test_principal_cannot_own_children() {
    let store = TestDirectoryFactory::create_store().unwrap();
    let root = unit(&store, "com", None);
    let user = store
        .create(NewNode::new("juan", NodeKind::Principal).under(root))
        .unwrap();

    let err = store.create(NewNode::new("child", NodeKind::Unit).under(user.id)).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_OPERATION");

    let loose = unit(&store, "loose", Some(root));
    let err = store.move_node(loose, user.id).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_OPERATION");
}

#[test]
fn test_missing_references_are_not_found() {
    let store = TestDirectoryFactory::create_store().unwrap();
    let root = unit(&store, "com", None);

    let err = store.create(NewNode::new("x", NodeKind::Unit).under(999)).unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
    assert_eq!(store.move_node(999, root).unwrap_err().error_code(), "NOT_FOUND");
    assert_eq!(store.move_node(root, 999).unwrap_err().error_code(), "NOT_FOUND");
    assert_eq!(store.search_subtree(999, None).unwrap_err().error_code(), "NOT_FOUND");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_readers_never_see_half_applied_move() {
    let store = TestDirectoryFactory::create_store().unwrap();
    let root = unit(&store, "root", None);
    let left = unit(&store, "left", Some(root));
    let right = unit(&store, "right", Some(root));
    let branch = unit(&store, "branch", Some(left));
    for i in 0..10 {
        let team = unit(&store, &format!("team{}", i), Some(branch));
        for j in 0..5 {
            unit(&store, &format!("sub{}", j), Some(team));
        }
    }

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut snapshots = 0;
                while !done.load(Ordering::Relaxed) || snapshots == 0 {
                    for tree in store.full_tree().unwrap() {
                        assert_paths_consistent(&tree);
                    }
                    snapshots += 1;
                }
                snapshots
            })
        })
        .collect();

    for i in 0..20 {
        let target = if i % 2 == 0 { right } else { left };
        store.move_node(branch, target).unwrap();
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert!(store.verify_integrity().unwrap().is_consistent());
}

#[test]
fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (root, child) = {
        let db = sled::open(dir.path()).unwrap();
        let store =
            DirectoryStore::new(db, Arc::new(TestDirectoryFactory::cheap_hasher().unwrap())).unwrap();
        let root = unit(&store, "com", None);
        let child = unit(&store, "ventas", Some(root));
        store.flush().unwrap();
        (root, child)
    };

    let db = sled::open(dir.path()).unwrap();
    let store = DirectoryStore::new(db, Arc::new(TestDirectoryFactory::cheap_hasher().unwrap())).unwrap();
    let node = store.find_by_id(child).unwrap().unwrap();
    assert_eq!(node.parent_id, Some(root));

    let fresh = unit(&store, "compras", Some(root));
    assert!(fresh > child);
}
