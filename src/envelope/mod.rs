//! Document metadata envelope
//!
//! Encodes the fixed-width binary header stored alongside every document
//! body: CAS, expiry, deletion time, flags, revision number, format marker,
//! datatype and conflict resolution mode.
//!
//! # Invariants
//!
//! - Envelope length is identical for every document in a store
//! - Multi-byte integers are big-endian on disk
//! - Tombstones carry a non-zero deletion time and the raw-bytes sentinel

mod codec;
mod document;
mod errors;

pub use codec::{
    decode, encode, encode_at, now_seconds, CONFLICT_RES_META_LEN, EXT_META_LEN, FLEX_META_CODE,
    METADATA_SIZE,
};
pub use document::{datatype, ConflictResolutionMode, Document, DocumentMetadata};
pub use errors::{EnvelopeError, EnvelopeResult};
