//! CBOR processing for `WebAuthn`
//!
//! This module handles the CBOR (Concise Binary Object Representation)
//! processing needed for attestation objects, COSE keys and authenticator
//! extension maps.

use std::io::Cursor;

use ciborium::de::from_reader;
use ciborium::ser::into_writer;
use ciborium::value::Value;

use super::errors::Fido2Error;

/// CBOR map as ciborium exposes it
pub(crate) type CborMap = Vec<(Value, Value)>;

/// Decode a single CBOR item that must span the whole input
pub(crate) fn decode_value(bytes: &[u8], what: &str) -> Result<Value, Fido2Error> {
    let (value, consumed) = decode_prefix(bytes, what)?;
    if consumed != bytes.len() {
        return Err(Fido2Error::parse(format!(
            "Trailing bytes after {what}: {} unused",
            bytes.len() - consumed
        )));
    }
    Ok(value)
}

/// Decode the first CBOR item in `bytes`, returning it with the number of bytes it used
pub(crate) fn decode_prefix(bytes: &[u8], what: &str) -> Result<(Value, usize), Fido2Error> {
    let mut cursor = Cursor::new(bytes);
    let value: Value = from_reader(&mut cursor)
        .map_err(|e| Fido2Error::parse(format!("Invalid CBOR in {what}: {e}")))?;
    let consumed = usize::try_from(cursor.position())
        .map_err(|_| Fido2Error::parse(format!("Invalid CBOR length in {what}")))?;
    Ok((value, consumed))
}

/// Encode a CBOR value
pub(crate) fn encode_value(value: &Value) -> Result<Vec<u8>, Fido2Error> {
    let mut out = Vec::new();
    into_writer(value, &mut out)
        .map_err(|e| Fido2Error::internal(format!("CBOR encoding failed: {e}")))?;
    Ok(out)
}

pub(crate) fn as_map<'a>(value: &'a Value, what: &str) -> Result<&'a CborMap, Fido2Error> {
    value
        .as_map()
        .ok_or_else(|| Fido2Error::parse(format!("{what} is not a CBOR map")))
}

/// Look up a text key
pub(crate) fn text_entry<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

/// Look up an integer key
pub(crate) fn int_entry(map: &[(Value, Value)], key: i64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| value_to_i64(k) == Some(key))
        .map(|(_, v)| v)
}

pub(crate) fn value_to_i64(value: &Value) -> Option<i64> {
    value
        .as_integer()
        .and_then(|integer| i64::try_from(i128::from(integer)).ok())
}

pub(crate) fn required_bytes<'a>(
    map: &'a [(Value, Value)],
    key: &str,
    what: &str,
) -> Result<&'a [u8], Fido2Error> {
    text_entry(map, key)
        .ok_or_else(|| Fido2Error::parse(format!("Missing {key} in {what}")))?
        .as_bytes()
        .map(Vec::as_slice)
        .ok_or_else(|| Fido2Error::parse(format!("{key} in {what} is not a byte string")))
}

pub(crate) fn required_text<'a>(
    map: &'a [(Value, Value)],
    key: &str,
    what: &str,
) -> Result<&'a str, Fido2Error> {
    text_entry(map, key)
        .ok_or_else(|| Fido2Error::parse(format!("Missing {key} in {what}")))?
        .as_text()
        .ok_or_else(|| Fido2Error::parse(format!("{key} in {what} is not a text string")))
}

pub(crate) fn required_int(
    map: &[(Value, Value)],
    key: &str,
    what: &str,
) -> Result<i64, Fido2Error> {
    text_entry(map, key)
        .ok_or_else(|| Fido2Error::parse(format!("Missing {key} in {what}")))
        .and_then(|v| {
            value_to_i64(v)
                .ok_or_else(|| Fido2Error::parse(format!("{key} in {what} is not an integer")))
        })
}

/// Decoded attestation object: `{ fmt, attStmt, authData }`
#[derive(Debug, Clone)]
pub(crate) struct AttestationObject {
    pub format: String,
    pub statement: CborMap,
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, Fido2Error> {
        let value = decode_value(bytes, "attestation object")?;
        let map = as_map(&value, "Attestation object")?;

        let format = required_text(map, "fmt", "attestation object")?.to_string();
        let auth_data = required_bytes(map, "authData", "attestation object")?.to_vec();
        let statement = text_entry(map, "attStmt")
            .ok_or_else(|| Fido2Error::parse("Missing attStmt in attestation object"))?
            .as_map()
            .ok_or_else(|| Fido2Error::parse("attStmt in attestation object is not a map"))?
            .clone();

        Ok(Self {
            format,
            statement,
            auth_data,
        })
    }
}
