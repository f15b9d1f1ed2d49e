//! Reference store: named pointers (direct or symbolic) under the metadata
//! directory, plus the optional `packed-refs` fallback and the chain
//! resolver.

use crate::error::{Error, Result};
use crate::hash::Hash;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const MAX_RESOLUTION_HOPS: usize = 10;

/// True if `name` is `prefix` itself or a path descendant of it, on a `/`
/// boundary. `prefix` may or may not carry a trailing slash; an empty prefix
/// matches everything. Guards against e.g. `"refs/headsfoo"` matching a
/// `"refs/heads"` prefix under plain string `starts_with`.
fn ref_name_under_prefix(name: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    name == prefix || name.starts_with(&format!("{prefix}/"))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reference {
    Direct { name: String, hash: Hash },
    Symbolic { name: String, target: String },
}

impl Reference {
    pub fn name(&self) -> &str {
        match self {
            Reference::Direct { name, .. } => name,
            Reference::Symbolic { name, .. } => name,
        }
    }

    fn encode(&self) -> String {
        match self {
            Reference::Direct { hash, .. } => format!("{hash}\n"),
            Reference::Symbolic { target, .. } => format!("ref: {target}\n"),
        }
    }

    fn decode(name: &str, contents: &str) -> Result<Self> {
        let trimmed = contents.trim_end_matches(['\n', '\r']);
        if let Some(target) = trimmed.strip_prefix("ref: ") {
            Ok(Reference::Symbolic {
                name: name.to_string(),
                target: target.trim().to_string(),
            })
        } else {
            let hash = Hash::parse_hex(trimmed.trim())
                .map_err(|_| Error::Corrupt(format!("malformed reference file for {name}")))?;
            Ok(Reference::Direct {
                name: name.to_string(),
                hash,
            })
        }
    }
}

struct PackedRefs {
    /// full ref name -> (hash, peeled hash if this was a peeled tag)
    entries: HashMap<String, (Hash, Option<Hash>)>,
}

impl PackedRefs {
    fn load(path: &Path) -> Result<Self> {
        let mut entries = HashMap::new();
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self { entries });
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let mut last_name: Option<String> = None;
        for line in text.lines() {
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            if let Some(peeled_hex) = line.strip_prefix('^') {
                if let Some(name) = &last_name {
                    let peeled = Hash::parse_hex(peeled_hex)
                        .map_err(|_| Error::Corrupt("malformed packed-refs peeled line".into()))?;
                    if let Some(entry) = entries.get_mut(name) {
                        entry.1 = Some(peeled);
                    }
                }
                continue;
            }
            let (hex, name) = line
                .split_once(' ')
                .ok_or_else(|| Error::Corrupt("malformed packed-refs line".into()))?;
            let hash = Hash::parse_hex(hex)
                .map_err(|_| Error::Corrupt("malformed packed-refs hash".into()))?;
            entries.insert(name.to_string(), (hash, None));
            last_name = Some(name.to_string());
        }
        Ok(Self { entries })
    }
}

pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    fn loose_path(&self, name: &str) -> PathBuf {
        self.git_dir.join(name)
    }

    fn packed_refs(&self) -> Result<PackedRefs> {
        PackedRefs::load(&self.git_dir.join("packed-refs"))
    }

    /// Loose file first; falls back to `packed-refs`. `Missing` if neither has it.
    pub fn get(&self, name: &str) -> Result<Reference> {
        let path = self.loose_path(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Reference::decode(name, &contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let packed = self.packed_refs()?;
                match packed.entries.get(name) {
                    Some((hash, _)) => Ok(Reference::Direct {
                        name: name.to_string(),
                        hash: *hash,
                    }),
                    None => Err(Error::Missing(format!("reference {name}"))),
                }
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Peeled (fully-dereferenced) hash for a packed annotated tag, if recorded.
    pub fn peeled(&self, name: &str) -> Result<Option<Hash>> {
        Ok(self.packed_refs()?.entries.get(name).and_then(|(_, p)| *p))
    }

    /// Always writes a loose file, atomically, overriding any packed entry.
    pub fn put(&self, reference: &Reference) -> Result<()> {
        let path = self.loose_path(reference.name());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let dir = path.parent().expect("reference path always has a parent");
        let mut tmp = NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(reference.encode().as_bytes())?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Loose refs under `prefix` unioned with packed refs matching `prefix`; loose wins.
    /// `prefix` may be given with or without a trailing `/`; matching is always on a
    /// path boundary (`"refs/heads"` never matches a ref literally named `"refs/headsfoo"`).
    pub fn list(&self, prefix: &str) -> Result<Vec<Reference>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        let loose_root = self.loose_path(prefix);
        if loose_root.is_dir() {
            let mut stack = vec![loose_root.clone()];
            while let Some(dir) = stack.pop() {
                for entry in fs::read_dir(&dir)? {
                    let entry = entry?;
                    let path = entry.path();
                    if path.is_dir() {
                        stack.push(path);
                    } else {
                        let rel = path
                            .strip_prefix(&self.git_dir)
                            .expect("loose ref path is under git_dir")
                            .to_string_lossy()
                            .replace('\\', "/");
                        let reference = self.get(&rel)?;
                        seen.insert(rel);
                        out.push(reference);
                    }
                }
            }
        } else if loose_root.is_file() {
            let rel = prefix.to_string();
            out.push(self.get(&rel)?);
            seen.insert(rel);
        }

        let packed = self.packed_refs()?;
        for (name, (hash, _)) in packed.entries.iter() {
            if ref_name_under_prefix(name, prefix) && !seen.contains(name) {
                out.push(Reference::Direct {
                    name: name.clone(),
                    hash: *hash,
                });
            }
        }
        Ok(out)
    }

    /// Removes the loose file; a packed entry, if any, is left untouched.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.loose_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Follows a reference's symbolic chain to its terminal direct reference.
    pub fn resolve(&self, reference: &Reference) -> Result<Reference> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = reference.clone();
        let mut hops = 0usize;
        loop {
            match current {
                Reference::Direct { .. } => return Ok(current),
                Reference::Symbolic { name, target } => {
                    if !visited.insert(name.clone()) {
                        return Err(Error::CycleDetected(reference.name().to_string()));
                    }
                    hops += 1;
                    if hops > MAX_RESOLUTION_HOPS {
                        return Err(Error::TooDeep(reference.name().to_string()));
                    }
                    current = self.get(&target)?;
                }
            }
        }
    }

    /// `get` followed by `resolve`, the common case of resolving a ref by name.
    pub fn resolve_name(&self, name: &str) -> Result<Reference> {
        let reference = self.get(name)?;
        self.resolve(&reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, RefStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RefStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn direct_reference_round_trips() {
        let (_dir, store) = store();
        let hash = Hash::compute(b"blob 1\0a");
        store
            .put(&Reference::Direct {
                name: "refs/heads/master".into(),
                hash,
            })
            .unwrap();
        let r = store.get("refs/heads/master").unwrap();
        assert_eq!(r, Reference::Direct { name: "refs/heads/master".into(), hash });
    }

    #[test]
    fn symbolic_head_resolves_through_branch() {
        let (_dir, store) = store();
        let hash = Hash::compute(b"blob 1\0a");
        store
            .put(&Reference::Direct {
                name: "refs/heads/master".into(),
                hash,
            })
            .unwrap();
        store
            .put(&Reference::Symbolic {
                name: "HEAD".into(),
                target: "refs/heads/master".into(),
            })
            .unwrap();
        let resolved = store.resolve_name("HEAD").unwrap();
        assert_eq!(resolved, Reference::Direct { name: "refs/heads/master".into(), hash });
    }

    #[test]
    fn cycle_is_detected() {
        let (_dir, store) = store();
        store
            .put(&Reference::Symbolic {
                name: "refs/heads/a".into(),
                target: "refs/heads/b".into(),
            })
            .unwrap();
        store
            .put(&Reference::Symbolic {
                name: "refs/heads/b".into(),
                target: "refs/heads/a".into(),
            })
            .unwrap();
        let err = store.resolve_name("refs/heads/a").unwrap_err();
        assert!(matches!(err, Error::CycleDetected(_)));
    }

    #[test]
    fn too_deep_chain_fails() {
        let (_dir, store) = store();
        for i in 0..15 {
            store
                .put(&Reference::Symbolic {
                    name: format!("refs/heads/r{i}"),
                    target: format!("refs/heads/r{}", i + 1),
                })
                .unwrap();
        }
        store
            .put(&Reference::Direct {
                name: "refs/heads/r15".into(),
                hash: Hash::compute(b"blob 1\0a"),
            })
            .unwrap();
        let err = store.resolve_name("refs/heads/r0").unwrap_err();
        assert!(matches!(err, Error::TooDeep(_)));
    }

    #[test]
    fn missing_reference_is_missing() {
        let (_dir, store) = store();
        assert!(matches!(store.get("refs/heads/nope"), Err(Error::Missing(_))));
    }

    #[test]
    fn packed_refs_fallback_and_loose_precedence() {
        let (dir, store) = store();
        let packed_hash = Hash::compute(b"blob 1\0a");
        let loose_hash = Hash::compute(b"blob 1\0b");
        fs::write(
            dir.path().join("packed-refs"),
            format!("# pack-refs with: peeled fully-peeled\n{packed_hash} refs/tags/v1\n{packed_hash} refs/heads/feature\n"),
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        store
            .put(&Reference::Direct {
                name: "refs/heads/feature".into(),
                hash: loose_hash,
            })
            .unwrap();

        // loose wins when both present
        let feature = store.get("refs/heads/feature").unwrap();
        assert_eq!(feature, Reference::Direct { name: "refs/heads/feature".into(), hash: loose_hash });

        // packed-only ref still resolves
        let tag = store.get("refs/tags/v1").unwrap();
        assert_eq!(tag, Reference::Direct { name: "refs/tags/v1".into(), hash: packed_hash });
    }

    #[test]
    fn packed_refs_peeled_line_is_tracked() {
        let (dir, store) = store();
        let tag_hash = Hash::compute(b"blob 1\0a");
        let peeled_hash = Hash::compute(b"blob 1\0b");
        fs::write(
            dir.path().join("packed-refs"),
            format!("{tag_hash} refs/tags/v1\n^{peeled_hash}\n"),
        )
        .unwrap();
        assert_eq!(store.peeled("refs/tags/v1").unwrap(), Some(peeled_hash));
    }

    #[test]
    fn list_unions_loose_and_packed_refs_with_loose_precedence() {
        let (dir, store) = store();
        let packed_hash = Hash::compute(b"blob 1\0a");
        let loose_hash = Hash::compute(b"blob 1\0b");
        let unrelated_hash = Hash::compute(b"blob 1\0c");
        fs::write(
            dir.path().join("packed-refs"),
            format!(
                "{packed_hash} refs/heads/feature\n{packed_hash} refs/heads/packed-only\n{unrelated_hash} refs/headsfoo\n"
            ),
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        store
            .put(&Reference::Direct {
                name: "refs/heads/feature".into(),
                hash: loose_hash,
            })
            .unwrap();
        store
            .put(&Reference::Direct {
                name: "refs/heads/nested/deep".into(),
                hash: loose_hash,
            })
            .unwrap();

        let mut refs = store.list("refs/heads").unwrap();
        refs.sort_by(|a, b| a.name().cmp(b.name()));
        let names: Vec<&str> = refs.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            vec!["refs/heads/feature", "refs/heads/nested/deep", "refs/heads/packed-only"]
        );

        // loose wins when a name is claimed by both
        let feature = refs.iter().find(|r| r.name() == "refs/heads/feature").unwrap();
        assert_eq!(*feature, Reference::Direct { name: "refs/heads/feature".into(), hash: loose_hash });

        // a packed ref merely sharing a string prefix must not leak in
        assert!(names.iter().all(|n| *n != "refs/headsfoo"));
    }

    #[test]
    fn delete_removes_loose_file() {
        let (_dir, store) = store();
        store
            .put(&Reference::Direct {
                name: "refs/heads/doomed".into(),
                hash: Hash::compute(b"blob 1\0a"),
            })
            .unwrap();
        store.delete("refs/heads/doomed").unwrap();
        assert!(matches!(store.get("refs/heads/doomed"), Err(Error::Missing(_))));
    }
}
