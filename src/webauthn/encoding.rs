//! Binary field canonicalization
//!
//! Identifier and payload fields arrive either as raw bytes or as base64 /
//! base64url text. They are resolved to raw bytes once, at the boundary, and
//! only raw bytes flow through the verification engine.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::Fido2Error;

/// A binary field as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinaryInput {
    /// base64 or base64url text, padded or not
    Encoded(String),
    /// Raw bytes
    Raw(Vec<u8>),
}

impl BinaryInput {
    /// Resolve to raw bytes
    ///
    /// # Errors
    /// Returns `ParseError` if the text form is not valid base64 or base64url
    pub fn to_bytes(&self) -> Result<Vec<u8>, Fido2Error> {
        match self {
            Self::Raw(bytes) => Ok(bytes.clone()),
            Self::Encoded(text) => decode_base64(text),
        }
    }

    /// Whether the field carries no data at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Raw(bytes) => bytes.is_empty(),
            Self::Encoded(text) => text.trim().is_empty(),
        }
    }
}

impl From<Vec<u8>> for BinaryInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(bytes)
    }
}

impl From<&[u8]> for BinaryInput {
    fn from(bytes: &[u8]) -> Self {
        Self::Raw(bytes.to_vec())
    }
}

impl From<&str> for BinaryInput {
    fn from(text: &str) -> Self {
        Self::Encoded(text.to_string())
    }
}

impl From<String> for BinaryInput {
    fn from(text: String) -> Self {
        Self::Encoded(text)
    }
}

/// Decode base64 in either alphabet, with or without padding
///
/// # Errors
/// Returns `ParseError` if the input is not valid base64
pub fn decode_base64(text: &str) -> Result<Vec<u8>, Fido2Error> {
    let normalized: String = text
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| Fido2Error::parse(format!("Invalid base64 data: {e}")))
}

/// Encode raw bytes as unpadded base64url
#[must_use]
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Resolve the credential identifier: `rawId` wins, `id` is the fallback
///
/// # Errors
/// Returns `ParseError` if both are absent or the present one cannot be decoded
pub fn resolve_credential_id(
    raw_id: Option<&BinaryInput>,
    id: Option<&BinaryInput>,
) -> Result<Vec<u8>, Fido2Error> {
    let source = raw_id
        .filter(|value| !value.is_empty())
        .or(id.filter(|value| !value.is_empty()))
        .ok_or_else(|| Fido2Error::parse("Credential has neither rawId nor id"))?;
    source.to_bytes()
}

/// Serde adapter: raw bytes on the Rust side, base64url on the wire
///
/// Deserialization accepts either encoded text or a byte array.
pub mod base64url {
    use super::{encode_base64url, BinaryInput, Deserialize, Deserializer, Serializer};

    /// Serialize bytes as unpadded base64url text
    ///
    /// # Errors
    /// Propagates serializer errors
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_base64url(bytes))
    }

    /// Deserialize from base64/base64url text or a byte array
    ///
    /// # Errors
    /// Returns a deserializer error if the text cannot be decoded
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        BinaryInput::deserialize(deserializer)?
            .to_bytes()
            .map_err(serde::de::Error::custom)
    }

    /// Same adapter for optional fields
    pub mod option {
        use super::super::{encode_base64url, BinaryInput, Deserialize, Deserializer, Serializer};

        /// Serialize optional bytes as base64url text or null
        ///
        /// # Errors
        /// Propagates serializer errors
        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&encode_base64url(bytes)),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize optional bytes
        ///
        /// # Errors
        /// Returns a deserializer error if the text cannot be decoded
        #[allow(dead_code)]
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<BinaryInput>::deserialize(deserializer)?
                .map(|input| input.to_bytes().map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_both_alphabets() {
        let bytes = vec![0xfb, 0xff, 0xbf, 0x01];
        let url = BinaryInput::from("-_-_AQ");
        let standard = BinaryInput::from("+/+/AQ==");
        assert_eq!(url.to_bytes().unwrap(), bytes);
        assert_eq!(standard.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_raw_bytes_pass_through() {
        let input = BinaryInput::from(vec![1u8, 2, 3]);
        assert_eq!(input.to_bytes().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_base64_is_parse_error() {
        let input = BinaryInput::from("not base64 !!");
        assert!(matches!(input.to_bytes(), Err(Fido2Error::ParseError(_))));
    }

    #[test]
    fn test_raw_id_falls_back_to_id() {
        let id = BinaryInput::from("AQID");
        assert_eq!(resolve_credential_id(None, Some(&id)).unwrap(), vec![1, 2, 3]);

        let raw_id = BinaryInput::from(vec![9u8]);
        assert_eq!(
            resolve_credential_id(Some(&raw_id), Some(&id)).unwrap(),
            vec![9]
        );

        assert!(matches!(
            resolve_credential_id(None, None),
            Err(Fido2Error::ParseError(_))
        ));
    }

    #[test]
    fn test_untagged_deserialization() {
        let text: BinaryInput = serde_json::from_str("\"AQID\"").unwrap();
        assert_eq!(text, BinaryInput::Encoded("AQID".to_string()));

        let raw: BinaryInput = serde_json::from_str("[1,2,3]").unwrap();
        assert_eq!(raw, BinaryInput::Raw(vec![1, 2, 3]));
    }
}
