//! Canonical framed encoding of the four object kinds: blob, tree, commit, tag.
//!
//! The framed form is `<kind> <decimal-size>\0<payload>`; the storage key is the
//! SHA-1 of exactly those bytes. This module only deals with that framing and
//! the payload grammar — zlib and the on-disk fan-out layout live in `store`.

use crate::error::{Error, Result};
use crate::hash::Hash;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(Error::MalformedObject(format!("unknown object kind: {other}"))),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tree leaf's file mode, restricted to the five modes Git recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafMode {
    Directory,
    RegularFile,
    Executable,
    Symlink,
    Gitlink,
}

impl LeafMode {
    pub fn as_octal(&self) -> u32 {
        match self {
            LeafMode::Directory => 0o40000,
            LeafMode::RegularFile => 0o100644,
            LeafMode::Executable => 0o100755,
            LeafMode::Symlink => 0o120000,
            LeafMode::Gitlink => 0o160000,
        }
    }

    /// Format without a leading zero, e.g. `40000`, `100644`.
    pub fn to_mode_str(&self) -> String {
        format!("{:o}", self.as_octal())
    }

    pub fn parse(s: &str) -> Result<Self> {
        let n = u32::from_str_radix(s, 8)
            .map_err(|_| Error::MalformedObject(format!("invalid tree mode: {s}")))?;
        Self::from_raw(n).map_err(|_| Error::MalformedObject(format!("unrecognized tree mode: {s}")))
    }

    /// From a raw numeric mode (e.g. an index entry's mode field).
    pub fn from_raw(mode: u32) -> Result<Self> {
        match mode {
            0o40000 => Ok(LeafMode::Directory),
            0o100644 => Ok(LeafMode::RegularFile),
            0o100755 => Ok(LeafMode::Executable),
            0o120000 => Ok(LeafMode::Symlink),
            0o160000 => Ok(LeafMode::Gitlink),
            _ => Err(Error::MalformedObject(format!("unrecognized mode: {mode:o}"))),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, LeafMode::Directory)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeLeaf {
    pub mode: LeafMode,
    pub name: String,
    pub hash: Hash,
}

/// `Name <email> <epoch-seconds> ±HHMM`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    /// signed minutes east of UTC, e.g. +330 for +0530, -300 for -0500
    pub tz_offset_minutes: i32,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, timestamp: i64, tz_offset_minutes: i32) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp,
            tz_offset_minutes,
        }
    }

    fn format_tz(&self) -> String {
        let sign = if self.tz_offset_minutes < 0 { '-' } else { '+' };
        let abs = self.tz_offset_minutes.unsigned_abs();
        format!("{sign}{:02}{:02}", abs / 60, abs % 60)
    }

    fn encode(&self) -> String {
        format!("{} <{}> {} {}", self.name, self.email, self.timestamp, self.format_tz())
    }

    fn parse(s: &str) -> Result<Self> {
        let bad = || Error::MalformedObject(format!("invalid signature: {s}"));
        let (name_part, rest) = s.split_once('<').ok_or_else(bad)?;
        let name = name_part.trim_end().to_string();
        let (email, rest) = rest.split_once('>').ok_or_else(bad)?;
        let rest = rest.trim_start();
        let mut fields = rest.split_whitespace();
        let timestamp: i64 = fields.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let tz = fields.next().ok_or_else(bad)?;
        if tz.len() != 5 {
            return Err(bad());
        }
        let sign = match &tz[..1] {
            "+" => 1,
            "-" => -1,
            _ => return Err(bad()),
        };
        let hours: i32 = tz[1..3].parse().map_err(|_| bad())?;
        let minutes: i32 = tz[3..5].parse().map_err(|_| bad())?;
        Ok(Signature {
            name,
            email: email.to_string(),
            timestamp,
            tz_offset_minutes: sign * (hours * 60 + minutes),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub tree: Hash,
    pub parents: Vec<Hash>,
    pub author: Signature,
    pub committer: Signature,
    /// embedded GPG signature block, verbatim text with internal newlines restored
    pub gpgsig: Option<String>,
    pub message: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub object: Hash,
    pub object_kind: ObjectKind,
    pub tag_name: String,
    pub tagger: Signature,
    pub message: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    Blob(Vec<u8>),
    Tree(Vec<TreeLeaf>),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Blob(_) => ObjectKind::Blob,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Commit(_) => ObjectKind::Commit,
            Object::Tag(_) => ObjectKind::Tag,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        match self {
            Object::Blob(bytes) => bytes.clone(),
            Object::Tree(leaves) => encode_tree_payload(leaves),
            Object::Commit(commit) => encode_commit_payload(commit),
            Object::Tag(tag) => encode_tag_payload(tag),
        }
    }

    /// The canonical framed form: `<kind> <size>\0<payload>`.
    pub fn encode_framed(&self) -> Vec<u8> {
        let payload = self.encode_payload();
        let mut out = Vec::with_capacity(payload.len() + 16);
        out.extend_from_slice(self.kind().as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(payload.len().to_string().as_bytes());
        out.push(0);
        out.extend_from_slice(&payload);
        out
    }

    /// The hash this object would be stored under.
    pub fn hash(&self) -> Hash {
        Hash::compute(&self.encode_framed())
    }

    /// Parse a canonical framed byte sequence back into an `Object`.
    pub fn decode_framed(bytes: &[u8]) -> Result<Self> {
        let nul = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::MalformedObject("missing NUL after header".into()))?;
        let header = std::str::from_utf8(&bytes[..nul])
            .map_err(|_| Error::MalformedObject("header is not valid UTF-8".into()))?;
        let (kind, size) = header
            .split_once(' ')
            .ok_or_else(|| Error::MalformedObject("header missing size field".into()))?;
        let kind = ObjectKind::parse(kind)?;
        let size: usize = size
            .parse()
            .map_err(|_| Error::MalformedObject(format!("object size isn't a number: {size}")))?;
        let payload = &bytes[nul + 1..];
        if payload.len() != size {
            return Err(Error::MalformedObject(format!(
                "size mismatch: header says {size}, payload is {}",
                payload.len()
            )));
        }
        match kind {
            ObjectKind::Blob => Ok(Object::Blob(payload.to_vec())),
            ObjectKind::Tree => Ok(Object::Tree(decode_tree_payload(payload)?)),
            ObjectKind::Commit => Ok(Object::Commit(decode_commit_payload(payload)?)),
            ObjectKind::Tag => Ok(Object::Tag(decode_tag_payload(payload)?)),
        }
    }
}

fn encode_tree_payload(leaves: &[TreeLeaf]) -> Vec<u8> {
    let mut out = Vec::new();
    for leaf in leaves {
        out.extend_from_slice(leaf.mode.to_mode_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(leaf.name.as_bytes());
        out.push(0);
        out.extend_from_slice(leaf.hash.as_bytes());
    }
    out
}

fn decode_tree_payload(payload: &[u8]) -> Result<Vec<TreeLeaf>> {
    let mut leaves = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let sp = payload[pos..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| Error::MalformedObject("tree entry missing space".into()))?
            + pos;
        let mode = std::str::from_utf8(&payload[pos..sp])
            .map_err(|_| Error::MalformedObject("tree mode is not UTF-8".into()))?;
        let mode = LeafMode::parse(mode)?;
        let nul = payload[sp + 1..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::MalformedObject("tree entry missing NUL".into()))?
            + sp
            + 1;
        let name = std::str::from_utf8(&payload[sp + 1..nul])
            .map_err(|_| Error::MalformedObject("tree entry name is not UTF-8".into()))?
            .to_string();
        let hash_start = nul + 1;
        let hash_end = hash_start + 20;
        if hash_end > payload.len() {
            return Err(Error::MalformedObject("truncated tree entry hash".into()));
        }
        let mut hash_bytes = [0u8; 20];
        hash_bytes.copy_from_slice(&payload[hash_start..hash_end]);
        leaves.push(TreeLeaf {
            mode,
            name,
            hash: Hash::from_bytes(hash_bytes),
        });
        pos = hash_end;
    }
    Ok(leaves)
}

fn encode_commit_payload(commit: &Commit) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("tree {}\n", commit.tree).as_bytes());
    for parent in &commit.parents {
        out.extend_from_slice(format!("parent {parent}\n").as_bytes());
    }
    out.extend_from_slice(format!("author {}\n", commit.author.encode()).as_bytes());
    out.extend_from_slice(format!("committer {}\n", commit.committer.encode()).as_bytes());
    if let Some(sig) = &commit.gpgsig {
        let mut lines = sig.split('\n');
        out.extend_from_slice(format!("gpgsig {}\n", lines.next().unwrap_or("")).as_bytes());
        for line in lines {
            out.extend_from_slice(format!(" {line}\n").as_bytes());
        }
    }
    out.push(b'\n');
    out.extend_from_slice(&commit.message);
    out
}

fn decode_commit_payload(payload: &[u8]) -> Result<Commit> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::MalformedObject("commit payload is not UTF-8".into()))?;
    let blank = text
        .find("\n\n")
        .ok_or_else(|| Error::MalformedObject("commit missing header/message separator".into()))?;
    let headers = &text[..blank];
    let message = text[blank + 2..].as_bytes().to_vec();

    let mut tree: Option<Hash> = None;
    let mut parents = Vec::new();
    let mut author: Option<Signature> = None;
    let mut committer: Option<Signature> = None;
    let mut gpgsig: Option<String> = None;

    let lines: Vec<&str> = headers.split('\n').collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if let Some(rest) = line.strip_prefix("tree ") {
            tree = Some(Hash::parse_hex(rest)?);
        } else if let Some(rest) = line.strip_prefix("parent ") {
            parents.push(Hash::parse_hex(rest)?);
        } else if let Some(rest) = line.strip_prefix("author ") {
            author = Some(Signature::parse(rest)?);
        } else if let Some(rest) = line.strip_prefix("committer ") {
            committer = Some(Signature::parse(rest)?);
        } else if let Some(rest) = line.strip_prefix("gpgsig ") {
            let mut block = rest.to_string();
            while i + 1 < lines.len() && lines[i + 1].starts_with(' ') {
                i += 1;
                block.push('\n');
                block.push_str(&lines[i][1..]);
            }
            gpgsig = Some(block);
        } else if !line.is_empty() {
            return Err(Error::MalformedObject(format!("unrecognized commit header: {line}")));
        }
        i += 1;
    }

    Ok(Commit {
        tree: tree.ok_or_else(|| Error::MalformedObject("commit missing tree".into()))?,
        parents,
        author: author.ok_or_else(|| Error::MalformedObject("commit missing author".into()))?,
        committer: committer.ok_or_else(|| Error::MalformedObject("commit missing committer".into()))?,
        gpgsig,
        message,
    })
}

fn encode_tag_payload(tag: &Tag) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("object {}\n", tag.object).as_bytes());
    out.extend_from_slice(format!("type {}\n", tag.object_kind).as_bytes());
    out.extend_from_slice(format!("tag {}\n", tag.tag_name).as_bytes());
    out.extend_from_slice(format!("tagger {}\n", tag.tagger.encode()).as_bytes());
    out.push(b'\n');
    out.extend_from_slice(&tag.message);
    out
}

fn decode_tag_payload(payload: &[u8]) -> Result<Tag> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::MalformedObject("tag payload is not UTF-8".into()))?;
    let blank = text
        .find("\n\n")
        .ok_or_else(|| Error::MalformedObject("tag missing header/message separator".into()))?;
    let headers = &text[..blank];
    let message = text[blank + 2..].as_bytes().to_vec();

    let mut object = None;
    let mut object_kind = None;
    let mut tag_name = None;
    let mut tagger = None;
    for line in headers.split('\n') {
        if let Some(rest) = line.strip_prefix("object ") {
            object = Some(Hash::parse_hex(rest)?);
        } else if let Some(rest) = line.strip_prefix("type ") {
            object_kind = Some(ObjectKind::parse(rest)?);
        } else if let Some(rest) = line.strip_prefix("tag ") {
            tag_name = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("tagger ") {
            tagger = Some(Signature::parse(rest)?);
        } else if !line.is_empty() {
            return Err(Error::MalformedObject(format!("unrecognized tag header: {line}")));
        }
    }
    Ok(Tag {
        object: object.ok_or_else(|| Error::MalformedObject("tag missing object".into()))?,
        object_kind: object_kind.ok_or_else(|| Error::MalformedObject("tag missing type".into()))?,
        tag_name: tag_name.ok_or_else(|| Error::MalformedObject("tag missing name".into()))?,
        tagger: tagger.ok_or_else(|| Error::MalformedObject("tag missing tagger".into()))?,
        message,
    })
}
