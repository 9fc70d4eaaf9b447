//! Fixed-layout metadata envelope
//!
//! Every stored document carries a 31-byte envelope. The storage engine
//! treats it as opaque bytes; the layout is fixed so readers can skip the
//! body when only metadata is needed.
//!
//! ```text
//! offset  size  field
//! 0       8     CAS                        (u64 BE)
//! 8       4     expiry                     (u32 BE)
//! 12      4     deletion time              (u32 BE, 0 unless tombstone)
//! 16      4     flags                      (u32 BE)
//! 20      8     revision sequence number   (u64 BE)
//! 28      1     format marker              (FLEX_META_CODE)
//! 29      1     extended metadata          (datatype, RAW_BYTES for tombstones)
//! 30      1     conflict resolution mode
//! ```

use super::document::{datatype, ConflictResolutionMode, Document, DocumentMetadata};
use super::errors::{EnvelopeError, EnvelopeResult};

/// Format marker written at offset 28
pub const FLEX_META_CODE: u8 = 0x01;

/// Bytes reserved for extended metadata
pub const EXT_META_LEN: usize = 1;

/// Bytes reserved for the conflict resolution mode
pub const CONFLICT_RES_META_LEN: usize = 1;

/// Total envelope size
pub const METADATA_SIZE: usize = 8 + 4 + 4 + 4 + 8 + 1 + EXT_META_LEN + CONFLICT_RES_META_LEN;

const CAS_OFFSET: usize = 0;
const EXPIRY_OFFSET: usize = 8;
const DELETED_TIME_OFFSET: usize = 12;
const FLAGS_OFFSET: usize = 16;
const REV_SEQNO_OFFSET: usize = 20;
const FLEX_CODE_OFFSET: usize = 28;
const EXT_META_OFFSET: usize = 29;
const CONFLICT_RES_OFFSET: usize = EXT_META_OFFSET + EXT_META_LEN;

/// Current wall-clock time in seconds, as stored in the deletion-time field.
pub fn now_seconds() -> u32 {
    u32::try_from(chrono::Utc::now().timestamp().max(1)).unwrap_or(u32::MAX)
}

/// Encode the envelope for `doc`, stamping deletions with the current time.
///
/// # Panics
///
/// Panics if `doc.ext_meta` is longer than [`EXT_META_LEN`].
pub fn encode(doc: &Document, deletion: bool) -> [u8; METADATA_SIZE] {
    encode_at(doc, deletion, now_seconds())
}

/// Encode the envelope with an explicit deletion time.
///
/// `deleted_at` is ignored unless `deletion` is set.
///
/// # Panics
///
/// Panics if `doc.ext_meta` is longer than [`EXT_META_LEN`].
pub fn encode_at(doc: &Document, deletion: bool, deleted_at: u32) -> [u8; METADATA_SIZE] {
    assert!(
        doc.ext_meta.len() <= EXT_META_LEN,
        "extended metadata is {} bytes, envelope reserves {}",
        doc.ext_meta.len(),
        EXT_META_LEN
    );

    let mut meta = [0u8; METADATA_SIZE];

    let deleted_time = if deletion { deleted_at } else { 0 };

    meta[CAS_OFFSET..CAS_OFFSET + 8].copy_from_slice(&doc.cas.to_be_bytes());
    meta[EXPIRY_OFFSET..EXPIRY_OFFSET + 4].copy_from_slice(&doc.expiry.to_be_bytes());
    meta[DELETED_TIME_OFFSET..DELETED_TIME_OFFSET + 4].copy_from_slice(&deleted_time.to_be_bytes());
    meta[FLAGS_OFFSET..FLAGS_OFFSET + 4].copy_from_slice(&doc.flags.to_be_bytes());
    meta[REV_SEQNO_OFFSET..REV_SEQNO_OFFSET + 8].copy_from_slice(&doc.rev_seqno.to_be_bytes());

    meta[FLEX_CODE_OFFSET] = FLEX_META_CODE;

    meta[EXT_META_OFFSET] = if deletion {
        datatype::RAW_BYTES
    } else if let Some(&ext) = doc.ext_meta.first() {
        ext
    } else if doc.body.is_empty() {
        datatype::RAW_BYTES
    } else {
        doc.datatype
    };

    meta[CONFLICT_RES_OFFSET] = doc.conflict_res_mode.as_u8();

    meta
}

/// Decode an envelope read back from the engine.
pub fn decode(bytes: &[u8]) -> EnvelopeResult<DocumentMetadata> {
    if bytes.len() != METADATA_SIZE {
        return Err(EnvelopeError::InvalidLength {
            expected: METADATA_SIZE,
            actual: bytes.len(),
        });
    }

    let flex_code = bytes[FLEX_CODE_OFFSET];
    if flex_code != FLEX_META_CODE {
        return Err(EnvelopeError::UnknownFormat(flex_code));
    }

    let conflict_byte = bytes[CONFLICT_RES_OFFSET];
    let conflict_res_mode = ConflictResolutionMode::from_u8(conflict_byte)
        .ok_or(EnvelopeError::UnknownConflictMode(conflict_byte))?;

    Ok(DocumentMetadata {
        cas: read_u64(bytes, CAS_OFFSET),
        expiry: read_u32(bytes, EXPIRY_OFFSET),
        deleted_time: read_u32(bytes, DELETED_TIME_OFFSET),
        flags: read_u32(bytes, FLAGS_OFFSET),
        rev_seqno: read_u64(bytes, REV_SEQNO_OFFSET),
        flex_code,
        datatype: bytes[EXT_META_OFFSET],
        conflict_res_mode,
    })
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_be_bytes(buf)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(0, "k1", r#"{"a":1}"#)
            .with_cas(0x0102_0304_0506_0708)
            .with_rev_seqno(0x1112_1314_1516_1718)
            .with_flags(0xcafe_babe)
            .with_expiry(0x2122_2324)
            .with_ext_meta(vec![datatype::JSON])
            .with_conflict_res_mode(ConflictResolutionMode::LastWriteWins)
    }

    #[test]
    fn test_size_is_fixed() {
        assert_eq!(METADATA_SIZE, 31);
        assert_eq!(encode(&sample(), false).len(), METADATA_SIZE);
        assert_eq!(encode(&sample(), true).len(), METADATA_SIZE);
    }

    #[test]
    fn test_byte_layout_is_big_endian() {
        let meta = encode(&sample(), false);

        assert_eq!(&meta[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&meta[8..12], &[0x21, 0x22, 0x23, 0x24]);
        assert_eq!(&meta[12..16], &[0, 0, 0, 0]);
        assert_eq!(&meta[16..20], &[0xca, 0xfe, 0xba, 0xbe]);
        assert_eq!(&meta[20..28], &[0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18]);
        assert_eq!(meta[28], FLEX_META_CODE);
        assert_eq!(meta[29], datatype::JSON);
        assert_eq!(meta[30], 1);
    }

    #[test]
    fn test_roundtrip_live_document() {
        let doc = sample();
        let decoded = decode(&encode(&doc, false)).unwrap();

        assert_eq!(decoded.cas, doc.cas);
        assert_eq!(decoded.expiry, doc.expiry);
        assert_eq!(decoded.flags, doc.flags);
        assert_eq!(decoded.rev_seqno, doc.rev_seqno);
        assert_eq!(decoded.datatype, datatype::JSON);
        assert_eq!(decoded.deleted_time, 0);
        assert_eq!(decoded.conflict_res_mode, ConflictResolutionMode::LastWriteWins);
        assert!(!decoded.is_tombstone());
    }

    #[test]
    fn test_deletion_forces_sentinel_and_time() {
        let decoded = decode(&encode_at(&sample(), true, 1_700_000_000)).unwrap();

        assert_eq!(decoded.datatype, datatype::RAW_BYTES);
        assert_eq!(decoded.deleted_time, 1_700_000_000);
        assert!(decoded.is_tombstone());
    }

    #[test]
    fn test_deletion_uses_wall_clock() {
        let decoded = decode(&encode(&sample(), true)).unwrap();
        assert!(decoded.deleted_time > 0);
    }

    #[test]
    fn test_empty_body_gets_raw_bytes_classifier() {
        let doc = Document::new(0, "k", Vec::new()).with_datatype(datatype::JSON);
        assert_eq!(encode(&doc, false)[29], datatype::RAW_BYTES);
    }

    #[test]
    fn test_datatype_used_when_no_ext_meta() {
        let doc = Document::new(0, "k", "body").with_datatype(datatype::JSON);
        assert_eq!(encode(&doc, false)[29], datatype::JSON);
    }

    #[test]
    #[should_panic(expected = "extended metadata")]
    fn test_oversized_ext_meta_panics() {
        let doc = Document::new(0, "k", "v").with_ext_meta(vec![1, 2]);
        let _ = encode(&doc, false);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(
            decode(&[0u8; 18]),
            Err(EnvelopeError::InvalidLength {
                expected: METADATA_SIZE,
                actual: 18
            })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_marker() {
        let mut meta = encode(&sample(), false);
        meta[28] = 0x7f;
        assert_eq!(decode(&meta), Err(EnvelopeError::UnknownFormat(0x7f)));
    }

    #[test]
    fn test_decode_rejects_unknown_conflict_mode() {
        let mut meta = encode(&sample(), false);
        meta[30] = 9;
        assert_eq!(decode(&meta), Err(EnvelopeError::UnknownConflictMode(9)));
    }
}
