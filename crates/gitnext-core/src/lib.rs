//! GitNext Core - content-addressed hash and the canonical Blob data model.
//!
//! A `Blob` is a tagged union with exactly one populated variant (enforced
//! by the Rust enum itself, rather than by a runtime check on an
//! all-fields-optional struct). `Hash` is opaque outside the serializer and
//! store: it never assumes a fixed width, since the active serializer plugin
//! decides whether identity is a 20-byte SHA-1 or a 32-byte SHA-256 digest.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitNextError {
    #[error("invalid hex hash: {0}")]
    InvalidHex(String),
}

pub type Result<T> = std::result::Result<T, GitNextError>;

/// Opaque content hash. Width depends on the active serializer plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(Vec<u8>);

impl Hash {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s)
            .map(Hash)
            .map_err(|e| GitNextError::InvalidHex(e.to_string()))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Default file mode for a tree entry pointing at a File blob.
pub const MODE_FILE: u32 = 0o100644;
/// Mode for a tree entry pointing at a nested Tree blob.
pub const MODE_TREE: u32 = 0o040000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub hash: Hash,
    pub name: String,
    pub flags: u32,
}

impl TreeEntry {
    pub fn file(name: impl Into<String>, hash: Hash) -> Self {
        Self {
            hash,
            name: name.into(),
            flags: MODE_FILE,
        }
    }

    pub fn tree(name: impl Into<String>, hash: Hash) -> Self {
        Self {
            hash,
            name: name.into(),
            flags: MODE_TREE,
        }
    }

    pub fn is_tree(&self) -> bool {
        self.flags == MODE_TREE
    }
}

/// Directory snapshot: entries are always kept sorted by name, so that two
/// peers building the same logical tree always produce byte-identical
/// marshalled bytes (and therefore the same hash). The Go original iterated
/// a `map[string]*Blob` here, which produced nondeterministic order and
/// defeated content addressing; sorting at construction time closes that
/// hole for good instead of hoping every call site remembers to sort.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeBlob {
    pub entries: Vec<TreeEntry>,
}

impl TreeBlob {
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub bytes: Vec<u8>,
}

impl FileBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// `text` is the already-formatted author/committer/message blob; the commit
/// pipeline is responsible for its shape, the serializer just carries it
/// verbatim after the tree/parent lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBlob {
    pub tree: Hash,
    pub parents: Vec<Hash>,
    pub text: String,
    pub timestamp: i64,
}

/// Legacy/optional variant named in the data model; not produced by this
/// implementation's commit pipeline (which publishes BranchStatus over the
/// wire instead), kept so the serializer's format is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchBlob {
    pub commit_hash: Hash,
}

/// A tagged union with exactly one populated variant, by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blob {
    File(FileBlob),
    Tree(TreeBlob),
    Commit(CommitBlob),
    Branch(BranchBlob),
}

impl Blob {
    pub fn file(bytes: Vec<u8>) -> Self {
        Blob::File(FileBlob::new(bytes))
    }

    pub fn tree(entries: Vec<TreeEntry>) -> Self {
        Blob::Tree(TreeBlob::new(entries))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Blob::File(_) => "file",
            Blob::Tree(_) => "tree",
            Blob::Commit(_) => "commit",
            Blob::Branch(_) => "branch",
        }
    }

    pub fn as_file(&self) -> Option<&FileBlob> {
        match self {
            Blob::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&TreeBlob> {
        match self {
            Blob::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&CommitBlob> {
        match self {
            Blob::Commit(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchStatus {
    pub name: String,
    pub commit_hash: Hash,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tree_blob_sorts_entries() {
        let h = Hash::from_bytes(vec![0u8; 20]);
        let tree = TreeBlob::new(vec![
            TreeEntry::file("b.txt", h.clone()),
            TreeEntry::file("a.txt", h.clone()),
        ]);
        assert_eq!(tree.entries[0].name, "a.txt");
        assert_eq!(tree.entries[1].name, "b.txt");
    }

    #[test]
    fn hash_hex_round_trips() {
        let h = Hash::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(Hash::from_hex(&h.to_hex()).unwrap(), h);
    }

    proptest! {
        #[test]
        fn tree_blob_always_sorted(
            names in prop::collection::vec("[a-z]{1,10}", 0..20)
        ) {
            let entries = names
                .into_iter()
                .map(|n| TreeEntry::file(n, Hash::from_bytes(vec![1, 2, 3])))
                .collect();
            let tree = TreeBlob::new(entries);
            for w in tree.entries.windows(2) {
                prop_assert!(w[0].name <= w[1].name);
            }
        }
    }
}
