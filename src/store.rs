//! Content-addressed filesystem store for loose objects.
//!
//! A hash with hex form `abcdef…` lives at `objects/ab/cdef…` under the
//! repository's metadata directory (the classic two-char fan-out). Packfiles
//! and alternates are out of scope: a missing loose object is `Missing`,
//! whether or not it happens to live in a pack elsewhere.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::Object;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub struct ObjectStore {
    objects_dir: PathBuf,
}

impl ObjectStore {
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
        }
    }

    fn path_for(&self, hash: &Hash) -> PathBuf {
        let (dir, rest) = hash.to_path_components();
        self.objects_dir.join(dir).join(rest)
    }

    pub fn exists(&self, hash: &Hash) -> bool {
        self.path_for(hash).is_file()
    }

    pub fn read(&self, hash: &Hash) -> Result<Object> {
        let path = self.path_for(hash);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Missing(format!("object {hash}"))
            } else {
                Error::Io(e)
            }
        })?;
        let mut decoder = ZlibDecoder::new(file);
        let mut framed = Vec::new();
        decoder
            .read_to_end(&mut framed)
            .map_err(|_| Error::Corrupt(format!("object {hash} is not valid zlib")))?;
        let object = Object::decode_framed(&framed)
            .map_err(|e| Error::Corrupt(format!("object {hash}: {e}")))?;
        if object.hash() != *hash {
            return Err(Error::Corrupt(format!(
                "object {hash}: recomputed hash {} does not match",
                object.hash()
            )));
        }
        Ok(object)
    }

    /// Serialize, compute hash, write the compressed bytes. A no-op if the
    /// target already exists (content-addressed idempotence).
    pub fn write(&self, object: &Object) -> Result<Hash> {
        let framed = object.encode_framed();
        let hash = Hash::compute(&framed);
        let path = self.path_for(&hash);
        if path.is_file() {
            return Ok(hash);
        }
        let dir = path.parent().expect("object path always has a fan-out parent");
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut encoder = ZlibEncoder::new(&mut tmp, Compression::default());
            encoder.write_all(&framed)?;
            encoder.finish()?;
        }
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(hash)
    }
}

/// Absolute `.git`-relative objects directory for a given metadata directory.
pub fn objects_dir(git_dir: &Path) -> PathBuf {
    git_dir.join("objects")
}
