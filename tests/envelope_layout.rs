//! Metadata envelope layout tests
//!
//! The envelope is 31 bytes, big-endian, identical in length for every
//! document, and tombstones always carry the raw-bytes sentinel.

use shardstore::envelope::{
    datatype, decode, encode, encode_at, ConflictResolutionMode, Document, EnvelopeError,
    FLEX_META_CODE, METADATA_SIZE,
};

fn sample() -> Document {
    Document::new(3, "user::42", r#"{"name":"ada"}"#)
        .with_cas(0x0102_0304_0506_0708)
        .with_expiry(0x1122_3344)
        .with_flags(0xdead_beef)
        .with_rev_seqno(0x0a0b_0c0d_0e0f_1011)
        .with_datatype(datatype::JSON)
        .with_conflict_res_mode(ConflictResolutionMode::LastWriteWins)
}

#[test]
fn test_field_offsets() {
    let bytes = encode(&sample(), false);

    assert_eq!(bytes.len(), METADATA_SIZE);
    assert_eq!(&bytes[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(&bytes[8..12], &[0x11, 0x22, 0x33, 0x44]);
    assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    assert_eq!(&bytes[16..20], &[0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(&bytes[20..28], &[0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10, 0x11]);
    assert_eq!(bytes[28], FLEX_META_CODE);
    assert_eq!(bytes[29], datatype::JSON);
    assert_eq!(bytes[30], 1);
}

#[test]
fn test_live_document_round_trips_exactly() {
    let doc = sample();
    let meta = decode(&encode(&doc, false)).unwrap();

    assert_eq!(meta.cas, doc.cas);
    assert_eq!(meta.expiry, doc.expiry);
    assert_eq!(meta.flags, doc.flags);
    assert_eq!(meta.rev_seqno, doc.rev_seqno);
    assert_eq!(meta.datatype, datatype::JSON);
    assert_eq!(meta.conflict_res_mode, ConflictResolutionMode::LastWriteWins);
    assert!(!meta.is_tombstone());
}

#[test]
fn test_deletion_forces_sentinel_and_timestamp() {
    let doc = sample().with_ext_meta(vec![datatype::XATTR]);
    let meta = decode(&encode(&doc, true)).unwrap();

    assert!(meta.deleted_time > 0);
    assert!(meta.is_tombstone());
    assert_eq!(meta.datatype, datatype::RAW_BYTES);
    assert_eq!(meta.cas, doc.cas);
}

#[test]
fn test_deletion_time_is_stored_big_endian() {
    let bytes = encode_at(&sample(), true, 0x6000_0001);
    assert_eq!(&bytes[12..16], &[0x60, 0, 0, 1]);
}

#[test]
fn test_ext_meta_overrides_datatype() {
    let doc = sample().with_ext_meta(vec![datatype::COMPRESSED]);
    assert_eq!(encode(&doc, false)[29], datatype::COMPRESSED);
}

#[test]
fn test_empty_body_is_raw_bytes() {
    let doc = Document::new(0, "k", Vec::new()).with_datatype(datatype::JSON);
    assert_eq!(encode(&doc, false)[29], datatype::RAW_BYTES);
}

#[test]
fn test_length_is_constant() {
    let small = encode(&Document::new(0, "a", ""), false);
    let large = encode(&Document::new(0, vec![b'k'; 250], vec![0u8; 4096]), false);
    assert_eq!(small.len(), large.len());
}

#[test]
fn test_decode_rejects_truncated_and_foreign_bytes() {
    let bytes = encode(&sample(), false);
    assert!(matches!(
        decode(&bytes[..30]),
        Err(EnvelopeError::InvalidLength { .. })
    ));

    let mut foreign = bytes;
    foreign[28] = 0x7f;
    assert!(matches!(decode(&foreign), Err(EnvelopeError::UnknownFormat(0x7f))));
}

#[test]
#[should_panic(expected = "extended metadata")]
fn test_oversized_ext_meta_panics() {
    let doc = sample().with_ext_meta(vec![1, 2]);
    encode(&doc, false);
}
