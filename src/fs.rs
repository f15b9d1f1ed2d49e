//! Filesystem capability set injected into the repository façade, so tests
//! can substitute an in-memory backend for the real one.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub ctime_secs: u32,
    pub ctime_nanos: u32,
    pub mtime_secs: u32,
    pub mtime_nanos: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub is_dir: bool,
    pub is_symlink: bool,
}

pub trait Filesystem {
    fn stat(&self, path: &Path) -> Result<FileStat>;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn write(&self, path: &Path, data: &[u8]) -> Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn make_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

/// The only production implementation: thin wrapper over `std::fs`.
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = std::fs::symlink_metadata(path)?;
        let mode = if meta.is_dir() {
            0o40000
        } else if meta.file_type().is_symlink() {
            0o120000
        } else if meta.permissions().mode() & 0o111 != 0 {
            0o100755
        } else {
            0o100644
        };
        Ok(FileStat {
            ctime_secs: meta.ctime() as u32,
            ctime_nanos: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nanos: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            mode,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
            is_dir: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
        })
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::write(path, data)?)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        Ok(std::fs::rename(from, to)?)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(path)? {
            out.push(entry?.path());
        }
        Ok(out)
    }

    fn make_dir_all(&self, path: &Path) -> Result<()> {
        Ok(std::fs::create_dir_all(path)?)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        Ok(std::fs::remove_file(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory backend used only by unit tests.
#[derive(Default)]
pub struct MemFilesystem {
    files: std::sync::Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: std::sync::Mutex<BTreeSet<PathBuf>>,
}

impl MemFilesystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filesystem for MemFilesystem {
    fn stat(&self, path: &Path) -> Result<FileStat> {
        let files = self.files.lock().unwrap();
        if let Some(data) = files.get(path) {
            return Ok(FileStat {
                ctime_secs: 0,
                ctime_nanos: 0,
                mtime_secs: 0,
                mtime_nanos: 0,
                dev: 0,
                ino: 0,
                mode: 0o100644,
                uid: 0,
                gid: 0,
                size: data.len() as u32,
                is_dir: false,
                is_symlink: false,
            });
        }
        if self.dirs.lock().unwrap().contains(path) {
            return Ok(FileStat {
                ctime_secs: 0,
                ctime_nanos: 0,
                mtime_secs: 0,
                mtime_nanos: 0,
                dev: 0,
                ino: 0,
                mode: 0o40000,
                uid: 0,
                gid: 0,
                size: 0,
                is_dir: true,
                is_symlink: false,
            });
        }
        Err(Error::Missing(format!("{}", path.display())))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Missing(format!("{}", path.display())))
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.make_dir_all(parent)?;
        }
        self.files.lock().unwrap().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let data = self.read(from)?;
        self.write(to, &data)?;
        self.files.lock().unwrap().remove(from);
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        let mut out: Vec<PathBuf> = files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        let dirs = self.dirs.lock().unwrap();
        out.extend(dirs.iter().filter(|p| p.parent() == Some(path)).cloned());
        Ok(out)
    }

    fn make_dir_all(&self, path: &Path) -> Result<()> {
        let mut dirs = self.dirs.lock().unwrap();
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            dirs.insert(current.clone());
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path) || self.dirs.lock().unwrap().contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_filesystem_write_read_round_trips() {
        let fs = MemFilesystem::new();
        fs.write(Path::new("a/b.txt"), b"hi").unwrap();
        assert_eq!(fs.read(Path::new("a/b.txt")).unwrap(), b"hi");
        assert!(fs.exists(Path::new("a/b.txt")));
        let stat = fs.stat(Path::new("a/b.txt")).unwrap();
        assert_eq!(stat.size, 2);
    }

    #[test]
    fn mem_filesystem_rename_moves_contents() {
        let fs = MemFilesystem::new();
        fs.write(Path::new("a.tmp"), b"data").unwrap();
        fs.rename(Path::new("a.tmp"), Path::new("a.txt")).unwrap();
        assert!(!fs.exists(Path::new("a.tmp")));
        assert_eq!(fs.read(Path::new("a.txt")).unwrap(), b"data");
    }
}
