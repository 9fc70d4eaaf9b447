//! Document and decoded metadata types

use std::fmt;

use serde::Serialize;

/// Datatype classifiers carried in the extended-metadata byte.
pub mod datatype {
    /// Opaque bytes. Also the sentinel written for tombstones.
    pub const RAW_BYTES: u8 = 0x00;
    /// Body is a JSON document
    pub const JSON: u8 = 0x01;
    /// Body is compressed
    pub const COMPRESSED: u8 = 0x02;
    /// Body carries extended attributes
    pub const XATTR: u8 = 0x04;
}

/// How conflicting versions of a document are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConflictResolutionMode {
    /// Highest revision sequence number wins
    #[default]
    RevisionSeqno = 0,
    /// Highest CAS (hybrid logical clock) wins
    LastWriteWins = 1,
}

impl ConflictResolutionMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::RevisionSeqno),
            1 => Some(Self::LastWriteWins),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ConflictResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RevisionSeqno => write!(f, "revision_seqno"),
            Self::LastWriteWins => write!(f, "last_write_wins"),
        }
    }
}

/// An item handed to the adapter for a set or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Document key
    pub key: Vec<u8>,
    /// Owning partition
    pub partition: u16,
    /// Document body (ignored for deletes)
    pub body: Vec<u8>,
    /// Compare-and-swap value
    pub cas: u64,
    /// Revision sequence number
    pub rev_seqno: u64,
    /// Position in the partition's mutation sequence
    pub by_seqno: u64,
    /// Client flags
    pub flags: u32,
    /// Absolute expiry time in seconds, 0 = never
    pub expiry: u32,
    /// Datatype classifier, see [`datatype`]
    pub datatype: u8,
    /// Extended metadata. At most one byte; when present it is stored
    /// verbatim in place of the datatype.
    pub ext_meta: Vec<u8>,
    /// Conflict resolution mode of the owning bucket
    pub conflict_res_mode: ConflictResolutionMode,
}

impl Document {
    /// Create a document with zeroed metadata.
    pub fn new(partition: u16, key: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            partition,
            body: body.into(),
            cas: 0,
            rev_seqno: 0,
            by_seqno: 0,
            flags: 0,
            expiry: 0,
            datatype: datatype::RAW_BYTES,
            ext_meta: Vec::new(),
            conflict_res_mode: ConflictResolutionMode::RevisionSeqno,
        }
    }

    /// A document that only identifies a key, for deletes.
    pub fn key_only(partition: u16, key: impl Into<Vec<u8>>) -> Self {
        Self::new(partition, key, Vec::new())
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_rev_seqno(mut self, rev_seqno: u64) -> Self {
        self.rev_seqno = rev_seqno;
        self
    }

    pub fn with_by_seqno(mut self, by_seqno: u64) -> Self {
        self.by_seqno = by_seqno;
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_expiry(mut self, expiry: u32) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_datatype(mut self, datatype: u8) -> Self {
        self.datatype = datatype;
        self
    }

    pub fn with_ext_meta(mut self, ext_meta: impl Into<Vec<u8>>) -> Self {
        self.ext_meta = ext_meta.into();
        self
    }

    pub fn with_conflict_res_mode(mut self, mode: ConflictResolutionMode) -> Self {
        self.conflict_res_mode = mode;
        self
    }

    /// Key rendered for logs (lossy UTF-8).
    pub fn key_display(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}

/// Metadata fields recovered from an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub cas: u64,
    pub expiry: u32,
    /// Seconds since the epoch at deletion, 0 for live documents
    pub deleted_time: u32,
    pub flags: u32,
    pub rev_seqno: u64,
    /// Format marker byte
    pub flex_code: u8,
    /// Extended-metadata byte (datatype or tombstone sentinel)
    pub datatype: u8,
    pub conflict_res_mode: ConflictResolutionMode,
}

impl DocumentMetadata {
    /// Whether the envelope was written by a delete.
    pub fn is_tombstone(&self) -> bool {
        self.deleted_time != 0
    }
}
