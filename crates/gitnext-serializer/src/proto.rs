//! protobuf format: one self-describing `PBlob` message per object, hashed
//! with SHA-256 flanked by the literal salts `"shared("` / `")"`. Unlike the
//! gut format there is no outer ASCII header — the protobuf field tag on
//! the populated `oneof` branch is what tells `unmarshal` which variant it
//! is looking at.

use gitnext_core::{Blob, BranchBlob, CommitBlob, FileBlob, Hash, TreeBlob, TreeEntry};
use prost::Message;
use sha2::{Digest, Sha256};

use crate::{Result, Serializer, SerializerError};

const SALT_PREFIX: &[u8] = b"shared(";
const SALT_SUFFIX: &[u8] = b")";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PFile {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PTreeEntry {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(uint32, tag = "3")]
    pub flags: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PTree {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<PTreeEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PCommit {
    #[prost(bytes = "vec", tag = "1")]
    pub tree: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub parents: Vec<Vec<u8>>,
    #[prost(string, tag = "3")]
    pub text: String,
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PBranch {
    #[prost(bytes = "vec", tag = "1")]
    pub commit_hash: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum PBlobKind {
    #[prost(message, tag = "1")]
    File(PFile),
    #[prost(message, tag = "2")]
    Tree(PTree),
    #[prost(message, tag = "3")]
    Commit(PCommit),
    #[prost(message, tag = "4")]
    Branch(PBranch),
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PBlob {
    #[prost(oneof = "PBlobKind", tags = "1,2,3,4")]
    pub kind: Option<PBlobKind>,
}

fn to_wire(blob: &Blob) -> PBlob {
    let kind = match blob {
        Blob::File(f) => PBlobKind::File(PFile {
            data: f.bytes.clone(),
        }),
        Blob::Tree(t) => PBlobKind::Tree(PTree {
            entries: t
                .entries
                .iter()
                .map(|e| PTreeEntry {
                    hash: e.hash.as_bytes().to_vec(),
                    name: e.name.clone(),
                    flags: e.flags,
                })
                .collect(),
        }),
        Blob::Commit(c) => PBlobKind::Commit(PCommit {
            tree: c.tree.as_bytes().to_vec(),
            parents: c.parents.iter().map(|p| p.as_bytes().to_vec()).collect(),
            text: c.text.clone(),
            timestamp: c.timestamp,
        }),
        Blob::Branch(b) => PBlobKind::Branch(PBranch {
            commit_hash: b.commit_hash.as_bytes().to_vec(),
        }),
    };
    PBlob { kind: Some(kind) }
}

fn from_wire(wire: PBlob) -> Result<Blob> {
    match wire.kind {
        Some(PBlobKind::File(f)) => Ok(Blob::File(FileBlob::new(f.data))),
        Some(PBlobKind::Tree(t)) => Ok(Blob::Tree(TreeBlob::new(
            t.entries
                .into_iter()
                .map(|e| TreeEntry {
                    hash: Hash::from_bytes(e.hash),
                    name: e.name,
                    flags: e.flags,
                })
                .collect(),
        ))),
        Some(PBlobKind::Commit(c)) => Ok(Blob::Commit(CommitBlob {
            tree: Hash::from_bytes(c.tree),
            parents: c.parents.into_iter().map(Hash::from_bytes).collect(),
            text: c.text,
            timestamp: c.timestamp,
        })),
        Some(PBlobKind::Branch(b)) => Ok(Blob::Branch(BranchBlob {
            commit_hash: Hash::from_bytes(b.commit_hash),
        })),
        None => Err(SerializerError::Malformed("empty PBlob oneof".into())),
    }
}

pub struct ProtoSerializer;

impl Serializer for ProtoSerializer {
    fn marshal(&self, blob: &Blob) -> Result<Vec<u8>> {
        Ok(to_wire(blob).encode_to_vec())
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Blob> {
        let wire = PBlob::decode(bytes).map_err(|e| SerializerError::Malformed(e.to_string()))?;
        from_wire(wire)
    }

    fn hash(&self, blob: &Blob) -> Result<Hash> {
        let encoded = to_wire(blob).encode_to_vec();
        let mut hasher = Sha256::new();
        hasher.update(SALT_PREFIX);
        hasher.update(&encoded);
        hasher.update(SALT_SUFFIX);
        Ok(Hash::from_bytes(hasher.finalize().to_vec()))
    }
}
