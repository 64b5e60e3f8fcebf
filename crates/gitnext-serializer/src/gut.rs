//! git-compatible format: `"<type> <len>\0"` header, SHA-1 over the
//! uncompressed header+payload, deflated for storage.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use gitnext_core::{Blob, CommitBlob, FileBlob, Hash, TreeBlob, TreeEntry};
use sha1::{Digest, Sha1};

use crate::{Result, Serializer, SerializerError};

pub struct GutSerializer;

const HASH_WIDTH: usize = 20;

impl GutSerializer {
    fn canonical(&self, blob: &Blob) -> Result<Vec<u8>> {
        let (kind, payload) = match blob {
            Blob::File(f) => ("blob", f.bytes.clone()),
            Blob::Tree(t) => ("tree", encode_tree(t)),
            Blob::Commit(c) => ("commit", encode_commit(c)),
            Blob::Branch(b) => ("branch", b.commit_hash.as_bytes().to_vec()),
        };
        let mut out = format!("{} {}\0", kind, payload.len()).into_bytes();
        out.extend(payload);
        Ok(out)
    }
}

fn encode_tree(tree: &TreeBlob) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in &tree.entries {
        out.extend(format!("{:o} {}\0", entry.flags, entry.name).into_bytes());
        out.extend(entry.hash.as_bytes());
    }
    out
}

fn decode_tree(payload: &[u8]) -> Result<TreeBlob> {
    let mut entries = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| SerializerError::Truncated("tree entry missing NUL".into()))?;
        let header = std::str::from_utf8(&rest[..nul])
            .map_err(|e| SerializerError::Malformed(e.to_string()))?;
        let (flags_str, name) = header
            .split_once(' ')
            .ok_or_else(|| SerializerError::Malformed("tree entry missing space".into()))?;
        let flags = u32::from_str_radix(flags_str, 8)
            .map_err(|e| SerializerError::Malformed(e.to_string()))?;
        rest = &rest[nul + 1..];
        if rest.len() < HASH_WIDTH {
            return Err(SerializerError::Truncated("tree entry hash".into()));
        }
        let hash = Hash::from_bytes(rest[..HASH_WIDTH].to_vec());
        rest = &rest[HASH_WIDTH..];
        entries.push(TreeEntry {
            hash,
            name: name.to_string(),
            flags,
        });
    }
    Ok(TreeBlob::new(entries))
}

/// The original Go `Commit` struct carried no timestamp at all (ordering
/// came from parent links alone); this implementation's commit pipeline
/// additionally records one for display/debugging, so the gut payload
/// gains one `time <unix-seconds>\n` line right before the free-form text
/// to keep it round-trippable without disturbing git's own tree/parent
/// line shapes.
fn encode_commit(commit: &CommitBlob) -> Vec<u8> {
    let mut out = format!("tree {}\n", commit.tree.to_hex()).into_bytes();
    for parent in &commit.parents {
        out.extend(format!("parent {}\n", parent.to_hex()).into_bytes());
    }
    out.extend(format!("time {}\n", commit.timestamp).into_bytes());
    out.extend(commit.text.as_bytes());
    out
}

fn decode_commit(payload: &[u8]) -> Result<CommitBlob> {
    let text = std::str::from_utf8(payload).map_err(|e| SerializerError::Malformed(e.to_string()))?;
    let mut lines = text.lines();
    let tree_line = lines
        .next()
        .ok_or_else(|| SerializerError::Truncated("commit missing tree line".into()))?;
    let tree_hex = tree_line
        .strip_prefix("tree ")
        .ok_or_else(|| SerializerError::Malformed("commit missing tree prefix".into()))?;
    let tree = Hash::from_hex(tree_hex).map_err(|e| SerializerError::Malformed(e.to_string()))?;

    let mut parents = Vec::new();
    let mut consumed = tree_line.len() + 1;
    for line in text.lines().skip(1) {
        if let Some(hex) = line.strip_prefix("parent ") {
            parents.push(Hash::from_hex(hex).map_err(|e| SerializerError::Malformed(e.to_string()))?);
            consumed += line.len() + 1;
        } else {
            break;
        }
    }
    let rest = &payload[consumed.min(payload.len())..];
    let rest_text = std::str::from_utf8(rest).map_err(|e| SerializerError::Malformed(e.to_string()))?;
    let time_line = rest_text
        .lines()
        .next()
        .ok_or_else(|| SerializerError::Truncated("commit missing time line".into()))?;
    let ts_str = time_line
        .strip_prefix("time ")
        .ok_or_else(|| SerializerError::Malformed("commit missing time prefix".into()))?;
    let timestamp: i64 = ts_str
        .parse()
        .map_err(|_| SerializerError::Malformed("commit time not a number".into()))?;
    let body = &rest[(time_line.len() + 1).min(rest.len())..];
    let body_text = std::str::from_utf8(body).map_err(|e| SerializerError::Malformed(e.to_string()))?;
    Ok(CommitBlob {
        tree,
        parents,
        text: body_text.to_string(),
        timestamp,
    })
}

impl Serializer for GutSerializer {
    fn marshal(&self, blob: &Blob) -> Result<Vec<u8>> {
        let canonical = self.canonical(blob)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&canonical)?;
        Ok(encoder.finish()?)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Blob> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut canonical = Vec::new();
        decoder.read_to_end(&mut canonical)?;

        let nul = canonical
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| SerializerError::Truncated("object missing header NUL".into()))?;
        let header = std::str::from_utf8(&canonical[..nul])
            .map_err(|e| SerializerError::Malformed(e.to_string()))?;
        let (kind, len_str) = header
            .split_once(' ')
            .ok_or_else(|| SerializerError::Malformed("header missing space".into()))?;
        let len: usize = len_str
            .parse()
            .map_err(|_| SerializerError::Malformed("header length not a number".into()))?;
        let payload = &canonical[nul + 1..];
        if payload.len() != len {
            return Err(SerializerError::Malformed(format!(
                "header length {len} does not match payload length {}",
                payload.len()
            )));
        }

        match kind {
            "blob" => Ok(Blob::File(FileBlob::new(payload.to_vec()))),
            "tree" => Ok(Blob::Tree(decode_tree(payload)?)),
            "commit" => Ok(Blob::Commit(decode_commit(payload)?)),
            "branch" => {
                if payload.len() != HASH_WIDTH {
                    return Err(SerializerError::Truncated("branch hash".into()));
                }
                Ok(Blob::Branch(gitnext_core::BranchBlob {
                    commit_hash: Hash::from_bytes(payload.to_vec()),
                }))
            }
            other => Err(SerializerError::UnknownType(other.to_string())),
        }
    }

    fn hash(&self, blob: &Blob) -> Result<Hash> {
        let canonical = self.canonical(blob)?;
        let mut hasher = Sha1::new();
        hasher.update(&canonical);
        Ok(Hash::from_bytes(hasher.finalize().to_vec()))
    }
}
