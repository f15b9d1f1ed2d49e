//! The repository façade: binds one object store and one reference store to
//! a working-tree path, and implements the high-level plumbing operations
//! (add, write-tree, commit, resolve, ahead-count) as pure transformations
//! over them plus the index.

use crate::config::{Config, RemoteConfig};
use crate::error::{Error, Result};
use crate::fs::{Filesystem, RealFilesystem};
use crate::hash::Hash;
use crate::index::{Index, IndexEntry};
use crate::object::{Commit, Object, Signature};
use crate::refs::{Reference, RefStore};
use crate::store::{self, ObjectStore};
use crate::tree_builder;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

pub struct CommitOptions {
    pub message: String,
    pub author: Signature,
    pub committer: Option<Signature>,
    pub auto_stage: bool,
}

pub struct Repository {
    work_tree: PathBuf,
    git_dir: PathBuf,
    objects: ObjectStore,
    refs: RefStore,
    filesystem: Box<dyn Filesystem>,
}

impl Repository {
    /// Walks upward from `start` for a directory containing a `.git`
    /// subdirectory; `None` at the filesystem root.
    pub fn discover(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            if current.join(".git").is_dir() {
                return Some(current);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Creates the full directory layout under `path/.git`. Leaves any
    /// already-present `HEAD`/`config`/`description` untouched, so calling
    /// `init` on an existing repository is harmless.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let work_tree = path.as_ref().to_path_buf();
        let git_dir = work_tree.join(".git");
        std::fs::create_dir_all(git_dir.join("branches"))?;
        std::fs::create_dir_all(store::objects_dir(&git_dir).join("pack"))?;
        std::fs::create_dir_all(git_dir.join("refs/heads"))?;
        std::fs::create_dir_all(git_dir.join("refs/tags"))?;

        let head_path = git_dir.join("HEAD");
        if !head_path.is_file() {
            std::fs::write(&head_path, "ref: refs/heads/master\n")?;
        }
        let description_path = git_dir.join("description");
        if !description_path.is_file() {
            std::fs::write(
                &description_path,
                "Unnamed repository; edit this file 'description' to name the repository.\n",
            )?;
        }
        let config_path = git_dir.join("config");
        if !config_path.is_file() {
            let mut config = Config::new();
            config.set_default_core();
            config.write_file(&config_path)?;
        }

        Self::open(&work_tree)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_filesystem(path, Box::new(RealFilesystem))
    }

    pub fn open_with_filesystem(path: impl AsRef<Path>, filesystem: Box<dyn Filesystem>) -> Result<Self> {
        let root = Self::discover(path.as_ref())
            .ok_or_else(|| Error::InvalidRepository(path.as_ref().to_path_buf()))?;
        let git_dir = root.join(".git");
        Ok(Self {
            objects: ObjectStore::new(store::objects_dir(&git_dir)),
            refs: RefStore::new(git_dir.clone()),
            work_tree: root,
            git_dir,
            filesystem,
        })
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    fn config_path(&self) -> PathBuf {
        self.git_dir.join("config")
    }

    pub fn read_index(&self) -> Result<Index> {
        Index::read_file(&self.index_path())
    }

    pub fn write_index(&self, index: &Index) -> Result<()> {
        index.write_file(&self.index_path())
    }

    pub fn read_config(&self) -> Result<Config> {
        Config::read_file(&self.config_path())
    }

    fn write_config(&self, config: &Config) -> Result<()> {
        config.write_file(&self.config_path())
    }

    /// Work-tree-relative, forward-slash path for an absolute or relative
    /// input path. Rejects `.`/`..` components, leading separators, and
    /// paths that escape the work tree.
    fn relative_path(&self, path: &Path) -> Result<String> {
        let candidate = if path.is_absolute() {
            path.strip_prefix(&self.work_tree)
                .map_err(|_| Error::PathOutsideWorkTree(path.to_path_buf()))?
                .to_path_buf()
        } else {
            path.to_path_buf()
        };
        let rel = candidate.to_string_lossy().replace('\\', "/");
        tree_builder::validate_path(&rel).map_err(|_| Error::PathOutsideWorkTree(path.to_path_buf()))?;
        Ok(rel)
    }

    /// Reads the file, writes a blob, and stages (inserting or updating in
    /// place) its index entry.
    pub fn add_file(&self, index: &mut Index, path: &Path) -> Result<()> {
        let rel = self.relative_path(path)?;
        let abs = self.work_tree.join(&rel);
        let bytes = self.filesystem.read(&abs)?;
        let hash = self.objects.write(&Object::Blob(bytes))?;
        let stat = self.filesystem.stat(&abs)?;
        index.upsert(IndexEntry {
            ctime_secs: stat.ctime_secs,
            ctime_nanos: stat.ctime_nanos,
            mtime_secs: stat.mtime_secs,
            mtime_nanos: stat.mtime_nanos,
            dev: stat.dev,
            ino: stat.ino,
            mode: stat.mode,
            uid: stat.uid,
            gid: stat.gid,
            file_size: stat.size,
            hash,
            assume_valid: false,
            stage: 0,
            path: rel,
        });
        Ok(())
    }

    /// Enumerates files under `dir`, skipping the metadata directory and
    /// anything that is not a regular file, staging each via `add_file`.
    pub fn add_directory(&self, index: &mut Index, dir: &Path, recursive: bool) -> Result<()> {
        let abs_dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.work_tree.join(dir)
        };
        self.add_directory_inner(index, &abs_dir, recursive)
    }

    fn add_directory_inner(&self, index: &mut Index, abs_dir: &Path, recursive: bool) -> Result<()> {
        for child in self.filesystem.list_dir(abs_dir)? {
            if child.file_name().map(|n| n == ".git").unwrap_or(false) {
                continue;
            }
            let stat = self.filesystem.stat(&child)?;
            if stat.is_dir {
                if recursive {
                    self.add_directory_inner(index, &child, recursive)?;
                }
                continue;
            }
            if stat.is_symlink {
                continue;
            }
            self.add_file(index, &child)?;
        }
        Ok(())
    }

    /// Drops every entry whose path equals the normalized relative path;
    /// silent if none match. Returns the number of entries removed.
    pub fn remove_file(&self, index: &mut Index, path: &Path) -> Result<usize> {
        let rel = self.relative_path(path)?;
        Ok(index.remove_path(&rel))
    }

    pub fn write_tree(&self, index: &Index) -> Result<Hash> {
        tree_builder::write_tree(index, &self.objects)
    }

    /// The branch HEAD is symbolic to, or `None` if HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        match self.refs.get("HEAD")? {
            Reference::Symbolic { target, .. } => {
                Ok(target.strip_prefix("refs/heads/").map(|s| s.to_string()))
            }
            Reference::Direct { .. } => Ok(None),
        }
    }

    pub fn commit(&self, opts: CommitOptions) -> Result<Hash> {
        let mut index = self.read_index()?;
        if opts.auto_stage {
            self.add_directory_inner(&mut index, &self.work_tree.clone(), true)?;
            self.write_index(&index)?;
        }
        let tree_hash = self.write_tree(&index)?;

        let head_ref = self.refs.get("HEAD")?;
        let parent = match &head_ref {
            Reference::Direct { hash, .. } => Some(*hash),
            Reference::Symbolic { target, .. } => match self.refs.get(target) {
                Ok(Reference::Direct { hash, .. }) => Some(hash),
                Ok(Reference::Symbolic { .. }) => {
                    return Err(Error::Corrupt("branch ref under HEAD is itself symbolic".into()))
                }
                Err(Error::Missing(_)) => None,
                Err(e) => return Err(e),
            },
        };

        let author = opts.author;
        let committer = opts.committer.unwrap_or_else(|| author.clone());
        let commit = Commit {
            tree: tree_hash,
            parents: parent.into_iter().collect(),
            author,
            committer,
            gpgsig: None,
            message: opts.message.into_bytes(),
        };
        let hash = self.objects.write(&Object::Commit(commit))?;

        match head_ref {
            Reference::Symbolic { target, .. } => {
                self.refs.put(&Reference::Direct { name: target, hash })?;
            }
            Reference::Direct { name, .. } => {
                self.refs.put(&Reference::Direct { name, hash })?;
            }
        }
        Ok(hash)
    }

    /// BFS over `parents` from `from`, stopping on dequeuing `ancestor`
    /// (exclusive). Returns the count of commits visited strictly between
    /// `from` (inclusive) and `ancestor`, or `-1` if `ancestor` is never
    /// reached — including when a read along the way fails, since a
    /// corrupted or pruned history is indistinguishable from "not found"
    /// for this purpose.
    pub fn count_till_ancestor(&self, from: Hash, ancestor: Hash) -> i64 {
        if from == ancestor {
            return 0;
        }
        let mut queue = VecDeque::new();
        let mut seen = HashSet::new();
        queue.push_back(from);
        seen.insert(from);
        let mut visited = 0i64;
        while let Some(current) = queue.pop_front() {
            if current == ancestor {
                return visited;
            }
            visited += 1;
            let commit = match self.objects.read(&current) {
                Ok(Object::Commit(c)) => c,
                _ => return -1,
            };
            for parent in commit.parents {
                if seen.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        -1
    }

    /// Resolves the current branch's upstream via `branch.<name>.{remote,merge}`
    /// and returns how many commits it is ahead of it (clamped at 0).
    pub fn num_changes_to_push(&self) -> Result<i64> {
        let Some(branch_name) = self.current_branch()? else {
            return Ok(0);
        };
        let config = self.read_config()?;
        let Some(branch) = config.branch(&branch_name) else {
            return Ok(0);
        };
        let (Some(remote), Some(merge)) = (branch.remote, branch.merge) else {
            return Ok(0);
        };
        let branch_short = merge.strip_prefix("refs/heads/").unwrap_or(&merge);
        let upstream_name = format!("refs/remotes/{remote}/{branch_short}");

        let local_hash = match self.refs.resolve_name(&format!("refs/heads/{branch_name}")) {
            Ok(Reference::Direct { hash, .. }) => hash,
            _ => return Ok(0),
        };
        let upstream_hash = match self.refs.resolve_name(&upstream_name) {
            Ok(Reference::Direct { hash, .. }) => hash,
            _ => return Ok(0),
        };
        if local_hash == upstream_hash {
            return Ok(0);
        }
        Ok(self.count_till_ancestor(local_hash, upstream_hash).max(0))
    }

    pub fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        let mut config = self.read_config()?;
        config.add_remote(name, url)?;
        self.write_config(&config)
    }

    pub fn remotes(&self) -> Result<Vec<RemoteConfig>> {
        Ok(self.read_config()?.remotes())
    }

    fn resolve_commitish(&self, s: &str) -> Result<Hash> {
        if let Ok(hash) = Hash::parse_hex(s) {
            return Ok(hash);
        }
        match self.refs.resolve_name(s)? {
            Reference::Direct { hash, .. } => Ok(hash),
            Reference::Symbolic { .. } => unreachable!("resolve_name always terminates at a direct reference"),
        }
    }

    /// Creates `refs/heads/<name>` pointing at `start_point` (a hash or a
    /// resolvable ref name), defaulting to the current `HEAD`. `Conflict`
    /// if the branch already exists.
    pub fn create_branch(&self, name: &str, start_point: Option<&str>) -> Result<()> {
        let ref_name = format!("refs/heads/{name}");
        if self.refs.get(&ref_name).is_ok() {
            return Err(Error::Conflict(format!("branch {name} already exists")));
        }
        let hash = match start_point {
            Some(sp) => self.resolve_commitish(sp)?,
            None => match self.refs.resolve_name("HEAD")? {
                Reference::Direct { hash, .. } => hash,
                Reference::Symbolic { .. } => unreachable!(),
            },
        };
        self.refs.put(&Reference::Direct { name: ref_name, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Signature;

    fn init_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn init_creates_expected_layout() {
        let (dir, _repo) = init_repo();
        let git_dir = dir.path().join(".git");
        assert_eq!(std::fs::read_to_string(git_dir.join("HEAD")).unwrap(), "ref: refs/heads/master\n");
        let config_text = std::fs::read_to_string(git_dir.join("config")).unwrap();
        assert!(config_text.contains("repositoryformatversion = 0"));
        assert!(config_text.contains("filemode = false"));
        assert!(config_text.contains("bare = false"));
        assert!(git_dir.join("refs/heads").is_dir());
        assert!(git_dir.join("refs/tags").is_dir());
        assert!(git_dir.join("objects/pack").is_dir());
        assert!(git_dir.join("branches").is_dir());
    }

    #[test]
    fn open_discovers_repository_from_subdirectory() {
        let (dir, _repo) = init_repo();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        let repo = Repository::open(&nested).unwrap();
        assert_eq!(repo.work_tree(), dir.path());
    }

    #[test]
    fn open_without_repository_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Repository::open(dir.path()), Err(Error::InvalidRepository(_))));
    }

    fn sig() -> Signature {
        Signature::new("Test User", "test@example.com", 1_700_000_000, 0)
    }

    #[test]
    fn commit_chain_tracks_ahead_count() {
        let (dir, repo) = init_repo();
        std::fs::write(dir.path().join("a.txt"), b"one").unwrap();
        let c1 = repo
            .commit(CommitOptions {
                message: "first".into(),
                author: sig(),
                committer: None,
                auto_stage: true,
            })
            .unwrap();

        std::fs::write(dir.path().join("a.txt"), b"two").unwrap();
        let c2 = repo
            .commit(CommitOptions {
                message: "second".into(),
                author: sig(),
                committer: None,
                auto_stage: true,
            })
            .unwrap();

        assert_eq!(repo.count_till_ancestor(c2, c1), 1);
        assert_eq!(repo.count_till_ancestor(c1, c2), -1);
        assert_eq!(repo.count_till_ancestor(c1, c1), 0);
    }

    #[test]
    fn first_commit_has_no_parent() {
        let (dir, repo) = init_repo();
        std::fs::write(dir.path().join("a.txt"), b"one").unwrap();
        let c1 = repo
            .commit(CommitOptions {
                message: "root".into(),
                author: sig(),
                committer: None,
                auto_stage: true,
            })
            .unwrap();
        let Object::Commit(commit) = repo.objects().read(&c1).unwrap() else { panic!("expected commit") };
        assert!(commit.parents.is_empty());
    }

    #[test]
    fn add_remote_then_duplicate_conflicts() {
        let (_dir, repo) = init_repo();
        repo.add_remote("origin", "u").unwrap();
        let remotes = repo.remotes().unwrap();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].fetch, "+refs/heads/*:refs/remotes/origin/*");
        assert!(matches!(repo.add_remote("origin", "other"), Err(Error::Conflict(_))));
    }

    #[test]
    fn create_branch_conflicts_on_existing_name() {
        let (dir, repo) = init_repo();
        std::fs::write(dir.path().join("a.txt"), b"one").unwrap();
        repo.commit(CommitOptions {
            message: "root".into(),
            author: sig(),
            committer: None,
            auto_stage: true,
        })
        .unwrap();
        repo.create_branch("feature", None).unwrap();
        assert!(matches!(repo.create_branch("feature", None), Err(Error::Conflict(_))));
    }

    #[test]
    fn num_changes_to_push_without_upstream_is_zero() {
        let (dir, repo) = init_repo();
        std::fs::write(dir.path().join("a.txt"), b"one").unwrap();
        repo.commit(CommitOptions {
            message: "root".into(),
            author: sig(),
            committer: None,
            auto_stage: true,
        })
        .unwrap();
        assert_eq!(repo.num_changes_to_push().unwrap(), 0);
    }

    #[test]
    fn num_changes_to_push_counts_local_only_commits() {
        let (dir, repo) = init_repo();
        std::fs::write(dir.path().join("a.txt"), b"one").unwrap();
        let c1 = repo
            .commit(CommitOptions {
                message: "root".into(),
                author: sig(),
                committer: None,
                auto_stage: true,
            })
            .unwrap();

        repo.add_remote("origin", "u").unwrap();
        repo.refs()
            .put(&Reference::Direct {
                name: "refs/remotes/origin/master".into(),
                hash: c1,
            })
            .unwrap();
        let mut config = repo.read_config().unwrap();
        config.set_branch_upstream("master", "origin", "refs/heads/master");
        repo.write_config_for_test(&config);

        std::fs::write(dir.path().join("a.txt"), b"two").unwrap();
        repo.commit(CommitOptions {
            message: "second".into(),
            author: sig(),
            committer: None,
            auto_stage: true,
        })
        .unwrap();

        assert_eq!(repo.num_changes_to_push().unwrap(), 1);
    }

    impl Repository {
        #[cfg(test)]
        fn write_config_for_test(&self, config: &Config) {
            self.write_config(config).unwrap();
        }
    }
}
