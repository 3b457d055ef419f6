//! Deterministic keys for memoized calls.
//!
//! A call is encoded as `index:value` parts for positional arguments and
//! `"name":value` parts for keyword arguments, joined by `&#`, then hashed with
//! xxh3-128. The digest is not cryptographic; it only has to keep distinct
//! argument lists apart.

use serde::Serialize;
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_128;

use crate::error::MemoError;

const PART_SEPARATOR: &str = "&#";

/// Builds the textual encoding of a call.
///
/// A lone positional argument with no keywords is encoded as-is. Keyword
/// names are JSON-quoted so a name never reads as a positional index.
pub fn encode_call(positional: &[String], keyword: &[(String, String)]) -> String {
    if positional.len() == 1 && keyword.is_empty() {
        return positional[0].clone();
    }
    positional
        .iter()
        .enumerate()
        .map(|(i, arg)| format!("{}:{}", i, arg))
        .chain(
            keyword
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::from(k.as_str()), v)),
        )
        .collect::<Vec<_>>()
        .join(PART_SEPARATOR)
}

/// Hashes the encoded call into 32 lowercase hex characters.
pub fn compute_digest(
    positional: &[String],
    keyword: &[(String, String)],
) -> Result<String, MemoError> {
    if positional.is_empty() && keyword.is_empty() {
        return Err(MemoError::EmptyDigestInput);
    }
    let encoded = encode_call(positional, keyword);
    Ok(format!("{:032x}", xxh3_128(encoded.as_bytes())))
}

/// Derives the cache key for calling `name` (defined at `location`) with `args`.
///
/// The location is positional 0. `args` is serialized to JSON: an array
/// supplies positionals 1.., an object supplies keyword parts keyed by field
/// name, `null` (the unit type) supplies nothing, and any other value is a
/// single positional. Values are encoded as compact JSON so `"1"` and `1`
/// stay distinct.
pub fn derive_key<A: Serialize + ?Sized>(
    name: &str,
    location: &str,
    args: &A,
) -> Result<String, MemoError> {
    let mut positional = vec![location.to_string()];
    let mut keyword = Vec::new();
    match serde_json::to_value(args)? {
        Value::Null => {}
        Value::Array(items) => positional.extend(items.iter().map(Value::to_string)),
        Value::Object(fields) => {
            keyword.extend(fields.iter().map(|(k, v)| (k.clone(), v.to_string())))
        }
        other => positional.push(other.to_string()),
    }
    let digest = compute_digest(&positional, &keyword)?;
    Ok(format!("method:{}:{}", name, digest))
}
