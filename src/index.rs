//! Binary staging index (version 2): header, sorted entries, optional
//! extensions, trailing checksum.

use crate::error::{Error, Result};
use crate::hash::Hash;
use sha1::{Digest, Sha1};
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;

const MAGIC: &[u8; 4] = b"DIRC";
const VERSION: u32 = 2;
const FIXED_ENTRY_LEN: usize = 4 * 10 + 20 + 2; // through the flags field

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime_secs: u32,
    pub ctime_nanos: u32,
    pub mtime_secs: u32,
    pub mtime_nanos: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub file_size: u32,
    pub hash: Hash,
    pub assume_valid: bool,
    pub stage: u8,
    pub path: String,
}

impl IndexEntry {
    fn flags(&self) -> u16 {
        let mut flags: u16 = 0;
        if self.assume_valid {
            flags |= 0x8000;
        }
        flags |= ((self.stage as u16) & 0x3) << 12;
        let path_len = self.path.len().min(0xFFF) as u16;
        flags |= path_len;
        flags
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    pub entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn find(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut IndexEntry> {
        self.entries.iter_mut().find(|e| e.path == path)
    }

    /// Update-in-place by path, else insert.
    pub fn upsert(&mut self, entry: IndexEntry) {
        if let Some(existing) = self.find_mut(&entry.path) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// Drops every entry whose path equals `path`; silent if none match.
    /// Returns the number of entries removed.
    pub fn remove_path(&mut self, path: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.path != path);
        before - self.entries.len()
    }

    fn sorted(&self) -> Vec<&IndexEntry> {
        let mut v: Vec<&IndexEntry> = self.entries.iter().collect();
        v.sort_by(|a, b| (a.path.as_str(), a.stage).cmp(&(b.path.as_str(), b.stage)));
        v
    }

    pub fn encode(&self) -> Vec<u8> {
        let sorted = self.sorted();
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(sorted.len() as u32).to_be_bytes());
        for entry in sorted {
            let start = out.len();
            out.extend_from_slice(&entry.ctime_secs.to_be_bytes());
            out.extend_from_slice(&entry.ctime_nanos.to_be_bytes());
            out.extend_from_slice(&entry.mtime_secs.to_be_bytes());
            out.extend_from_slice(&entry.mtime_nanos.to_be_bytes());
            out.extend_from_slice(&entry.dev.to_be_bytes());
            out.extend_from_slice(&entry.ino.to_be_bytes());
            out.extend_from_slice(&entry.mode.to_be_bytes());
            out.extend_from_slice(&entry.uid.to_be_bytes());
            out.extend_from_slice(&entry.gid.to_be_bytes());
            out.extend_from_slice(&entry.file_size.to_be_bytes());
            out.extend_from_slice(entry.hash.as_bytes());
            out.extend_from_slice(&entry.flags().to_be_bytes());
            out.extend_from_slice(entry.path.as_bytes());
            let written_so_far = out.len() - start;
            let mut pad = 8 - (written_so_far % 8);
            if pad == 0 {
                pad = 8;
            }
            out.extend(std::iter::repeat(0u8).take(pad));
        }
        let checksum = Hash::compute(&out);
        out.extend_from_slice(checksum.as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 12 + 20 {
            return Err(Error::Corrupt("index too short".into()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(Error::Corrupt("bad index magic".into()));
        }
        let version = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(Error::Corrupt(format!("unsupported index version {version}")));
        }
        let count = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;

        let body_end = bytes.len() - 20;
        let trailer = &bytes[body_end..];
        let computed = Hash::compute(&bytes[..body_end]);
        if computed.as_bytes() != trailer {
            return Err(Error::Corrupt("index checksum mismatch".into()));
        }

        let mut pos = 12;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let start = pos;
            if pos + FIXED_ENTRY_LEN > body_end {
                return Err(Error::Corrupt("truncated index entry".into()));
            }
            let ctime_secs = read_u32(bytes, &mut pos);
            let ctime_nanos = read_u32(bytes, &mut pos);
            let mtime_secs = read_u32(bytes, &mut pos);
            let mtime_nanos = read_u32(bytes, &mut pos);
            let dev = read_u32(bytes, &mut pos);
            let ino = read_u32(bytes, &mut pos);
            let mode = read_u32(bytes, &mut pos);
            let uid = read_u32(bytes, &mut pos);
            let gid = read_u32(bytes, &mut pos);
            let file_size = read_u32(bytes, &mut pos);
            let mut hash_bytes = [0u8; 20];
            hash_bytes.copy_from_slice(&bytes[pos..pos + 20]);
            pos += 20;
            let hash = Hash::from_bytes(hash_bytes);
            let flags = u16::from_be_bytes(bytes[pos..pos + 2].try_into().unwrap());
            pos += 2;
            let assume_valid = flags & 0x8000 != 0;
            let extended = flags & 0x4000 != 0;
            if extended {
                return Err(Error::Corrupt("extended flag set in version-2 index".into()));
            }
            let stage = ((flags >> 12) & 0x3) as u8;
            let path_len = (flags & 0x0FFF) as usize;

            let nul_pos = bytes[pos..body_end]
                .iter()
                .position(|&b| b == 0)
                .map(|p| p + pos)
                .ok_or_else(|| Error::Corrupt("index entry path missing NUL terminator".into()))?;
            let path_bytes = &bytes[pos..nul_pos];
            if path_len < 0xFFF && path_bytes.len() != path_len {
                return Err(Error::Corrupt("index entry path length mismatch".into()));
            }
            let path = std::str::from_utf8(path_bytes)
                .map_err(|_| Error::Corrupt("index entry path is not valid UTF-8".into()))?
                .to_string();
            pos = nul_pos + 1;

            let written_so_far = pos - start;
            let mut pad = 8 - (written_so_far % 8);
            if pad == 0 {
                pad = 8;
            }
            if pos + pad > body_end {
                return Err(Error::Corrupt("index entry padding overruns body".into()));
            }
            if bytes[pos..pos + pad].iter().any(|&b| b != 0) {
                return Err(Error::Corrupt("index entry padding is not NUL".into()));
            }
            pos += pad;

            entries.push(IndexEntry {
                ctime_secs,
                ctime_nanos,
                mtime_secs,
                mtime_nanos,
                dev,
                ino,
                mode,
                uid,
                gid,
                file_size,
                hash,
                assume_valid,
                stage,
                path,
            });
        }

        while pos < body_end {
            if pos + 8 > body_end {
                return Err(Error::Corrupt("truncated index extension header".into()));
            }
            let tag = &bytes[pos..pos + 4];
            let len = u32::from_be_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
            pos += 8;
            if pos + len > body_end {
                return Err(Error::Corrupt("truncated index extension payload".into()));
            }
            if tag[0].is_ascii_uppercase() {
                return Err(Error::UnknownExtension(
                    String::from_utf8_lossy(tag).to_string(),
                ));
            }
            pos += len;
        }

        Ok(Index { entries })
    }

    /// Absent file yields a fresh, empty v2 index.
    pub fn read_file(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Self::decode(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Index::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Atomic write via temp-file-then-rename.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let dir = path.parent().expect("index path always has a parent");
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(&self.encode())?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_be_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(path: &str, seed: u8) -> IndexEntry {
        IndexEntry {
            ctime_secs: 1,
            ctime_nanos: 2,
            mtime_secs: 3,
            mtime_nanos: 4,
            dev: 5,
            ino: 6,
            mode: 0o100644,
            uid: 1000,
            gid: 1000,
            file_size: 42,
            hash: Hash::compute(&[seed]),
            assume_valid: false,
            stage: 0,
            path: path.to_string(),
        }
    }

    #[test]
    fn empty_index_round_trips() {
        let index = Index::new();
        let bytes = index.encode();
        let decoded = Index::decode(&bytes).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn entries_round_trip_sorted_by_path_and_stage() {
        let mut index = Index::new();
        index.upsert(sample_entry("z.txt", 1));
        index.upsert(sample_entry("a.txt", 2));
        index.upsert(sample_entry("sub/b.txt", 3));
        let bytes = index.encode();
        let decoded = Index::decode(&bytes).unwrap();
        let paths: Vec<&str> = decoded.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "sub/b.txt", "z.txt"]);
    }

    #[test]
    fn entry_with_odd_length_path_pads_to_multiple_of_eight() {
        let mut index = Index::new();
        index.upsert(sample_entry("oddlen.txt", 1)); // deliberately awkward length
        let bytes = index.encode();
        let decoded = Index::decode(&bytes).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn absent_file_yields_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::read_file(&dir.path().join("index")).unwrap();
        assert!(index.entries.is_empty());
    }

    #[test]
    fn write_then_read_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new();
        index.upsert(sample_entry("a.txt", 1));
        let path = dir.path().join("index");
        index.write_file(&path).unwrap();
        let decoded = Index::read_file(&path).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn tampered_checksum_is_corrupt() {
        let mut index = Index::new();
        index.upsert(sample_entry("a.txt", 1));
        let mut bytes = index.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(Index::decode(&bytes), Err(Error::Corrupt(_))));
    }

    #[test]
    fn upsert_updates_existing_entry_in_place() {
        let mut index = Index::new();
        index.upsert(sample_entry("a.txt", 1));
        let mut updated = sample_entry("a.txt", 2);
        updated.file_size = 99;
        index.upsert(updated);
        assert_eq!(index.entries.len(), 1);
        assert_eq!(index.find("a.txt").unwrap().file_size, 99);
    }

    #[test]
    fn remove_path_reports_count_and_is_silent_on_miss() {
        let mut index = Index::new();
        index.upsert(sample_entry("a.txt", 1));
        assert_eq!(index.remove_path("a.txt"), 1);
        assert_eq!(index.remove_path("a.txt"), 0);
    }
}
