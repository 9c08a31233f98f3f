//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Two inputs depend on it being byte-exact: the obligation-set fingerprint
//! (the key-derivation input) and the evidence record hash input. Any
//! divergence between platforms would make keys or chains irreproducible.

use ciborium::value::Value;

use crate::crypto::Blake3Hash;
use crate::types::ObligationSet;

/// Prefix of every fingerprint, so fingerprint bytes can never collide with
/// another canonical structure.
pub const FINGERPRINT_DOMAIN: &[u8] = b"chava-fingerprint-v0:";

/// Evidence record field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const PREV_HASH: u64 = 0;
    pub const KIND: u64 = 1;
    pub const SCOPE: u64 = 2;
    pub const VERIFIER_ID: u64 = 3;
    pub const TIMESTAMP: u64 = 4;
    pub const PROOF: u64 = 5;
}

/// Canonical bytes of an obligation set.
///
/// Format: `FINGERPRINT_DOMAIN || cbor([[kind, scope], ...])` with pairs in
/// `(kind, scope)` order. Insertion order never reaches this function because
/// [`ObligationSet`] iterates sorted; the pairs are sorted again here so the
/// encoding doesn't depend on that.
pub fn fingerprint_bytes(obligations: &ObligationSet) -> Vec<u8> {
    let mut pairs: Vec<(&str, &str)> = obligations
        .iter()
        .map(|o| (o.kind.as_str(), o.scope.as_str()))
        .collect();
    pairs.sort_unstable();

    let array: Vec<Value> = pairs
        .into_iter()
        .map(|(kind, scope)| {
            Value::Array(vec![Value::Text(kind.to_owned()), Value::Text(scope.to_owned())])
        })
        .collect();

    let mut buf = FINGERPRINT_DOMAIN.to_vec();
    encode_value_to(&mut buf, &Value::Array(array));
    buf
}

/// Canonical bytes hashed into an evidence record's `record_hash`.
///
/// Every field is length-delimited by CBOR, so no two distinct field tuples
/// share an encoding.
pub fn evidence_hash_input(
    prev_hash: &Blake3Hash,
    kind: &str,
    scope: &str,
    verifier_id: &str,
    timestamp: i64,
    proof: &[u8],
) -> Vec<u8> {
    let entries = vec![
        (
            Value::Integer(keys::PREV_HASH.into()),
            Value::Bytes(prev_hash.0.to_vec()),
        ),
        (Value::Integer(keys::KIND.into()), Value::Text(kind.to_owned())),
        (Value::Integer(keys::SCOPE.into()), Value::Text(scope.to_owned())),
        (
            Value::Integer(keys::VERIFIER_ID.into()),
            Value::Text(verifier_id.to_owned()),
        ),
        (
            Value::Integer(keys::TIMESTAMP.into()),
            Value::Integer(timestamp.into()),
        ),
        (Value::Integer(keys::PROOF.into()), Value::Bytes(proof.to_vec())),
    ];

    let mut buf = Vec::new();
    encode_value_to(&mut buf, &Value::Map(entries));
    buf
}

/// Recursively encode a CBOR value.
///
/// Only the value shapes built in this module are reachable; anything else
/// (floats, tags) encodes as null.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        _ => buf.push(0xf6),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);
    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();
        encode_integer(&mut buf, 0.into());
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        encode_integer(&mut buf, 23.into());
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_integer(&mut buf, 24.into());
        assert_eq!(buf, vec![0x18, 0x18]);

        buf.clear();
        encode_integer(&mut buf, 1000.into());
        assert_eq!(buf, vec![0x19, 0x03, 0xe8]);

        buf.clear();
        encode_integer(&mut buf, (-1).into());
        assert_eq!(buf, vec![0x20]);
    }

    #[test]
    fn test_map_keys_sorted() {
        let entries = vec![
            (Value::Integer(2.into()), Value::Bool(true)),
            (Value::Integer(0.into()), Value::Bool(false)),
        ];
        let mut buf = Vec::new();
        encode_map_canonical(&mut buf, &entries);
        assert_eq!(buf, vec![0xa2, 0x00, 0xf4, 0x02, 0xf5]);
    }

    #[test]
    fn test_empty_fingerprint() {
        let bytes = fingerprint_bytes(&ObligationSet::new());
        let mut expected = FINGERPRINT_DOMAIN.to_vec();
        expected.push(0x80); // empty array
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_fingerprint_layout() {
        let set = ObligationSet::from_pairs([("a", "")]).unwrap();
        let bytes = fingerprint_bytes(&set);
        let body = &bytes[FINGERPRINT_DOMAIN.len()..];
        // [ ["a", ""] ]
        assert_eq!(body, &[0x81, 0x82, 0x61, b'a', 0x60]);
    }

    #[test]
    fn test_evidence_input_separates_fields() {
        // Moving a byte between adjacent text fields must change the encoding.
        let a = evidence_hash_input(&Blake3Hash::ZERO, "ab", "c", "v", 1, b"");
        let b = evidence_hash_input(&Blake3Hash::ZERO, "a", "bc", "v", 1, b"");
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn fingerprint_is_insertion_order_independent(
            pairs in prop::collection::btree_set(("[a-z]{1,6}", "[a-z.]{0,8}"), 0..8)
        ) {
            let forward: Vec<_> = pairs.iter().cloned().collect();
            let mut backward = forward.clone();
            backward.reverse();

            let a = ObligationSet::from_pairs(forward).unwrap();
            let b = ObligationSet::from_pairs(backward).unwrap();
            prop_assert_eq!(fingerprint_bytes(&a), fingerprint_bytes(&b));
        }
    }
}
