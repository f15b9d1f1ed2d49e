//! Turns a flat, sorted index into a hierarchy of tree objects.
//!
//! Modeled as the design notes prescribe: an owned mapping from directory
//! path to its in-progress leaf list, and a second mapping from directory
//! path to parent path, resolved by path lookup rather than back-pointers.

use crate::collation::{compare_names, depth};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::index::Index;
use crate::object::{LeafMode, Object, TreeLeaf};
use crate::store::ObjectStore;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
struct WorkingLeaf {
    mode: LeafMode,
    name: String,
    hash: Option<Hash>,
}

fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

fn child_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Builds the tree hierarchy implied by `index` and writes it to `store`,
/// returning the root tree's hash. Stable under permutations of the input
/// entries: the directory set and each tree's sorted leaves are entirely
/// determined by the set of `(path, mode, hash)` triples, not their order.
pub fn write_tree(index: &Index, store: &ObjectStore) -> Result<Hash> {
    let mut dirs: BTreeMap<String, Vec<WorkingLeaf>> = BTreeMap::new();
    dirs.entry(String::new()).or_default();

    for entry in &index.entries {
        validate_path(&entry.path)?;
        let dir = dirname(&entry.path).to_string();
        let name = basename(&entry.path).to_string();
        let mode = LeafMode::from_raw(entry.mode)
            .map_err(|_| Error::MalformedObject(format!("unsupported index mode for {}", entry.path)))?;

        let leaves = dirs.entry(dir.clone()).or_default();
        if leaves.iter().any(|l| l.name == name) {
            return Err(Error::Corrupt(format!("duplicate entry name in tree: {}", entry.path)));
        }
        leaves.push(WorkingLeaf {
            mode,
            name,
            hash: Some(entry.hash),
        });

        // Ensure every ancestor directory has a placeholder leaf in its parent.
        let mut current = dir;
        loop {
            dirs.entry(current.clone()).or_default();
            if current.is_empty() {
                break;
            }
            let parent = dirname(&current).to_string();
            let base = basename(&current).to_string();
            let parent_leaves = dirs.entry(parent.clone()).or_default();
            let existing = parent_leaves.iter().find(|l| l.name == base);
            if let Some(existing) = existing {
                if existing.hash.is_some() {
                    return Err(Error::Corrupt(format!(
                        "duplicate entry name in tree: {}",
                        child_path(&parent, &base)
                    )));
                }
            } else {
                parent_leaves.push(WorkingLeaf {
                    mode: LeafMode::Directory,
                    name: base,
                    hash: None,
                });
            }
            current = parent;
        }
    }

    let mut order: Vec<String> = dirs.keys().cloned().collect();
    order.sort_by(|a, b| depth(b).cmp(&depth(a)).then_with(|| a.cmp(b)));

    let mut written: BTreeMap<String, Hash> = BTreeMap::new();
    for dir in &order {
        let mut leaves = dirs.remove(dir).expect("directory present in map");
        for leaf in leaves.iter_mut() {
            if leaf.hash.is_none() {
                let child = child_path(dir, &leaf.name);
                let child_hash = *written
                    .get(&child)
                    .expect("child directory written before its parent (depth-descending order)");
                leaf.hash = Some(child_hash);
            }
        }
        leaves.sort_by(|a, b| compare_names(&a.name, a.mode.is_directory(), &b.name, b.mode.is_directory()));

        let tree_leaves: Vec<TreeLeaf> = leaves
            .into_iter()
            .map(|l| TreeLeaf {
                mode: l.mode,
                name: l.name,
                hash: l.hash.expect("every leaf hash resolved before write"),
            })
            .collect();
        let hash = store.write(&Object::Tree(tree_leaves))?;
        written.insert(dir.clone(), hash);
    }

    Ok(*written.get("").expect("root directory always written"))
}

pub(crate) fn validate_path(path: &str) -> Result<()> {
    if path.starts_with('/') {
        return Err(Error::PathOutsideWorkTree(path.into()));
    }
    for component in path.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(Error::PathOutsideWorkTree(path.into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;

    fn entry(path: &str, seed: u8) -> IndexEntry {
        IndexEntry {
            ctime_secs: 0,
            ctime_nanos: 0,
            mtime_secs: 0,
            mtime_nanos: 0,
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: 1,
            hash: Hash::compute(&[seed]),
            assume_valid: false,
            stage: 0,
            path: path.to_string(),
        }
    }

    #[test]
    fn empty_index_produces_well_known_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let root = write_tree(&Index::new(), &store).unwrap();
        assert_eq!(root.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn nested_entries_build_correct_hierarchy() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let mut index = Index::new();
        index.upsert(entry("a.txt", 1));
        index.upsert(entry("sub/b.txt", 2));
        index.upsert(entry("sub/deep/c.txt", 3));

        let root = write_tree(&index, &store).unwrap();
        let root_obj = store.read(&root).unwrap();
        let Object::Tree(root_leaves) = root_obj else { panic!("expected tree") };
        let names: Vec<&str> = root_leaves.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub"]);

        let sub_hash = root_leaves.iter().find(|l| l.name == "sub").unwrap().hash;
        let Object::Tree(sub_leaves) = store.read(&sub_hash).unwrap() else { panic!("expected tree") };
        let sub_names: Vec<&str> = sub_leaves.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(sub_names, vec!["b.txt", "deep"]);

        let deep_hash = sub_leaves.iter().find(|l| l.name == "deep").unwrap().hash;
        let Object::Tree(deep_leaves) = store.read(&deep_hash).unwrap() else { panic!("expected tree") };
        assert_eq!(deep_leaves.len(), 1);
        assert_eq!(deep_leaves[0].name, "c.txt");
    }

    #[test]
    fn root_hash_is_stable_under_entry_permutation() {
        let dir_a = tempfile::tempdir().unwrap();
        let store_a = ObjectStore::new(dir_a.path());
        let mut index_a = Index::new();
        index_a.upsert(entry("a.txt", 1));
        index_a.upsert(entry("sub/b.txt", 2));
        index_a.upsert(entry("sub/deep/c.txt", 3));
        let root_a = write_tree(&index_a, &store_a).unwrap();

        let dir_b = tempfile::tempdir().unwrap();
        let store_b = ObjectStore::new(dir_b.path());
        let mut index_b = Index::new();
        index_b.upsert(entry("sub/deep/c.txt", 3));
        index_b.upsert(entry("a.txt", 1));
        index_b.upsert(entry("sub/b.txt", 2));
        let root_b = write_tree(&index_b, &store_b).unwrap();

        assert_eq!(root_a, root_b);
    }

    #[test]
    fn rejects_file_entry_colliding_with_later_ancestor_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let mut index = Index::new();
        index.upsert(entry("sub", 1));
        index.upsert(entry("sub/x.txt", 2));
        assert!(matches!(write_tree(&index, &store), Err(Error::Corrupt(_))));
    }

    #[test]
    fn rejects_path_with_dot_dot_component() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let mut index = Index::new();
        index.upsert(entry("../escape.txt", 1));
        assert!(matches!(write_tree(&index, &store), Err(Error::PathOutsideWorkTree(_))));
    }
}
