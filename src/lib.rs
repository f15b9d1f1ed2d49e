//! Core of a Git repository: the on-disk object/reference model and the
//! plumbing operations that manipulate it. See `Repository` for the
//! high-level façade; the individual modules implement the components it
//! composes (object codec, object store, reference store, index codec, tree
//! builder).

pub mod collation;
pub mod config;
pub mod error;
pub mod fs;
pub mod hash;
pub mod index;
pub mod object;
pub mod refs;
pub mod repo;
pub mod store;
pub mod tree_builder;

pub use config::{BranchConfig, Config, CoreConfig, RemoteConfig};
pub use error::{Error, Result};
pub use fs::{Filesystem, MemFilesystem, RealFilesystem};
pub use hash::Hash;
pub use index::{Index, IndexEntry};
pub use object::{Commit, LeafMode, Object, ObjectKind, Signature, Tag, TreeLeaf};
pub use refs::{Reference, RefStore};
pub use repo::{CommitOptions, Repository};
pub use store::ObjectStore;
