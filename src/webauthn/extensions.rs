//! `WebAuthn` extensions
//!
//! Client extension inputs are sent in the options objects; authenticator
//! extension outputs come back in the extension map of the authenticator data.
//! Both are closed sets of known variants plus an unrecognized fallback, so an
//! extension this crate does not know is carried along instead of failing.

use std::collections::BTreeMap;

use ciborium::value::Value;
use serde::{Serialize, Serializer};

use super::cbor;
use super::errors::Fido2Error;

/// `largeBlob` client extension input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct LargeBlobInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

/// A client extension input, keyed by its identifier in the options map
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionInput {
    /// `appid`: legacy U2F application identifier
    AppId(String),
    /// `credProps`
    CredProps(bool),
    /// `uvm`
    Uvm(bool),
    /// `hmacCreateSecret`
    HmacCreateSecret(bool),
    /// `credentialProtectionPolicy`
    CredentialProtectionPolicy(String),
    /// `enforceCredentialProtectionPolicy`
    EnforceCredentialProtectionPolicy(bool),
    /// `largeBlob`
    LargeBlob(LargeBlobInput),
    /// Anything else, passed through untouched
    Unrecognized(serde_json::Value),
}

const PROTECTION_POLICIES: [&str; 3] = [
    "userVerificationOptional",
    "userVerificationOptionalWithCredentialIDList",
    "userVerificationRequired",
];

fn expect_bool(name: &str, value: &serde_json::Value) -> Result<bool, Fido2Error> {
    value
        .as_bool()
        .ok_or_else(|| Fido2Error::parse(format!("Extension {name} expects a boolean")))
}

impl ExtensionInput {
    /// Interpret a JSON extension value by its identifier
    ///
    /// # Errors
    /// Returns `ParseError` when a known extension has a value of the wrong shape
    pub fn from_json(name: &str, value: &serde_json::Value) -> Result<Self, Fido2Error> {
        match name {
            "appid" => value
                .as_str()
                .map(|s| Self::AppId(s.to_string()))
                .ok_or_else(|| Fido2Error::parse("Extension appid expects a string")),
            "credProps" => expect_bool(name, value).map(Self::CredProps),
            "uvm" => expect_bool(name, value).map(Self::Uvm),
            "hmacCreateSecret" => expect_bool(name, value).map(Self::HmacCreateSecret),
            "enforceCredentialProtectionPolicy" => {
                expect_bool(name, value).map(Self::EnforceCredentialProtectionPolicy)
            }
            "credentialProtectionPolicy" | "credProtect" => {
                let policy = value.as_str().filter(|p| PROTECTION_POLICIES.contains(p));
                policy
                    .map(|p| Self::CredentialProtectionPolicy(p.to_string()))
                    .ok_or_else(|| {
                        Fido2Error::parse(format!("Unknown credential protection policy {value}"))
                    })
            }
            "largeBlob" => serde_json::from_value(value.clone())
                .map(Self::LargeBlob)
                .map_err(|e| Fido2Error::parse(format!("Invalid largeBlob input: {e}"))),
            _ => Ok(Self::Unrecognized(value.clone())),
        }
    }

    /// Identifier used on the wire; `credProtect` is normalized to its WebAuthn name
    #[must_use]
    pub fn wire_name(name: &str) -> &str {
        if name == "credProtect" {
            "credentialProtectionPolicy"
        } else {
            name
        }
    }
}

impl Serialize for ExtensionInput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::AppId(value) | Self::CredentialProtectionPolicy(value) => {
                serializer.serialize_str(value)
            }
            Self::CredProps(flag)
            | Self::Uvm(flag)
            | Self::HmacCreateSecret(flag)
            | Self::EnforceCredentialProtectionPolicy(flag) => serializer.serialize_bool(*flag),
            Self::LargeBlob(input) => input.serialize(serializer),
            Self::Unrecognized(value) => value.serialize(serializer),
        }
    }
}

/// Extension inputs for one ceremony
///
/// Non-empty per-call options replace the configured defaults entirely;
/// otherwise the defaults apply. Returns `None` when no extension is
/// requested at all.
///
/// # Errors
/// Returns `ParseError` if any known extension value is malformed
pub fn build_extension_inputs(
    defaults: &BTreeMap<String, serde_json::Value>,
    overrides: &BTreeMap<String, serde_json::Value>,
) -> Result<Option<BTreeMap<String, ExtensionInput>>, Fido2Error> {
    let source = if overrides.is_empty() { defaults } else { overrides };
    let mut inputs = BTreeMap::new();
    for (name, value) in source {
        let input = ExtensionInput::from_json(name, value)?;
        inputs.insert(ExtensionInput::wire_name(name).to_string(), input);
    }
    Ok((!inputs.is_empty()).then_some(inputs))
}

/// An authenticator extension output from the authenticator data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticatorExtension {
    /// `credProtect`: protection level 1..=3
    CredProtect(u8),
    /// `hmac-secret`
    HmacSecret(bool),
    /// `credBlob` at registration: whether the blob was stored
    CredBlobStored(bool),
    /// `credBlob` at authentication: the stored blob
    CredBlob(#[serde(with = "super::encoding::base64url")] Vec<u8>),
    /// `minPinLength`
    MinPinLength(u64),
    /// `largeBlobKey`
    LargeBlobKey(#[serde(with = "super::encoding::base64url")] Vec<u8>),
    /// Raw CBOR of an extension this crate does not interpret
    Unrecognized(#[serde(with = "super::encoding::base64url")] Vec<u8>),
}

impl AuthenticatorExtension {
    fn decode(name: &str, value: &Value) -> Result<Self, Fido2Error> {
        let malformed = || Fido2Error::parse(format!("Malformed {name} extension output"));
        match name {
            "credProtect" => cbor::value_to_i64(value)
                .and_then(|level| u8::try_from(level).ok())
                .filter(|level| (1..=3).contains(level))
                .map(Self::CredProtect)
                .ok_or_else(malformed),
            "hmac-secret" => value.as_bool().map(Self::HmacSecret).ok_or_else(malformed),
            "credBlob" => match value {
                Value::Bool(stored) => Ok(Self::CredBlobStored(*stored)),
                Value::Bytes(blob) => Ok(Self::CredBlob(blob.clone())),
                _ => Err(malformed()),
            },
            "minPinLength" => cbor::value_to_i64(value)
                .and_then(|len| u64::try_from(len).ok())
                .map(Self::MinPinLength)
                .ok_or_else(malformed),
            "largeBlobKey" => value
                .as_bytes()
                .map(|key| Self::LargeBlobKey(key.clone()))
                .ok_or_else(malformed),
            _ => cbor::encode_value(value).map(Self::Unrecognized),
        }
    }
}

/// Decode the extension map that trails the authenticator data
///
/// # Errors
/// Returns `ParseError` if the map has non-text keys or a known output is malformed
pub fn decode_authenticator_extensions(
    value: &Value,
) -> Result<BTreeMap<String, AuthenticatorExtension>, Fido2Error> {
    let map = cbor::as_map(value, "Authenticator extension data")?;
    map.iter()
        .map(|(key, value)| {
            let name = key
                .as_text()
                .ok_or_else(|| Fido2Error::parse("Extension identifiers must be text"))?;
            Ok((name.to_string(), AuthenticatorExtension::decode(name, value)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_and_unrecognized_inputs() {
        assert_eq!(
            ExtensionInput::from_json("credProps", &json!(true)).unwrap(),
            ExtensionInput::CredProps(true)
        );
        assert_eq!(
            ExtensionInput::from_json("example.com/custom", &json!({"a": 1})).unwrap(),
            ExtensionInput::Unrecognized(json!({"a": 1}))
        );
        assert!(ExtensionInput::from_json("uvm", &json!("yes")).is_err());
        assert!(ExtensionInput::from_json("credProtect", &json!("nope")).is_err());
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let defaults = BTreeMap::from([
            ("credProps".to_string(), json!(true)),
            ("credProtect".to_string(), json!("userVerificationOptional")),
        ]);
        let overrides = BTreeMap::from([("credProps".to_string(), json!(false))]);

        let replaced = build_extension_inputs(&defaults, &overrides).unwrap().unwrap();
        assert_eq!(serde_json::to_value(&replaced).unwrap(), json!({"credProps": false}));

        let configured = build_extension_inputs(&defaults, &BTreeMap::new()).unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&configured).unwrap(),
            json!({"credProps": true, "credentialProtectionPolicy": "userVerificationOptional"})
        );

        assert!(build_extension_inputs(&BTreeMap::new(), &BTreeMap::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_authenticator_outputs() {
        let text = |s: &str| Value::Text(s.to_string());
        let map = Value::Map(vec![
            (text("credProtect"), Value::Integer(2.into())),
            (text("hmac-secret"), Value::Bool(true)),
            (text("vendorThing"), Value::Array(vec![Value::Null])),
        ]);
        let decoded = decode_authenticator_extensions(&map).unwrap();
        assert_eq!(decoded["credProtect"], AuthenticatorExtension::CredProtect(2));
        assert_eq!(decoded["hmac-secret"], AuthenticatorExtension::HmacSecret(true));
        assert_eq!(
            decoded["vendorThing"],
            AuthenticatorExtension::Unrecognized(vec![0x81, 0xf6])
        );

        let bad = Value::Map(vec![(text("credProtect"), Value::Integer(9.into()))]);
        assert!(decode_authenticator_extensions(&bad).is_err());
    }
}
