//! Authenticator data
//!
//! Layout: `rpIdHash (32) | flags (1) | signCount (4, big-endian)`, then the
//! attested credential data when `AT` is set and a CBOR extension map when `ED`
//! is set. Nothing may follow.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use super::bytes::ByteReader;
use super::cbor;
use super::cose::CoseKey;
use super::crypto::sha256;
use super::errors::Fido2Error;
use super::extensions::{decode_authenticator_extensions, AuthenticatorExtension};

const FLAG_UP: u8 = 0x01;
const FLAG_UV: u8 = 0x04;
const FLAG_BE: u8 = 0x08;
const FLAG_BS: u8 = 0x10;
const FLAG_AT: u8 = 0x40;
const FLAG_ED: u8 = 0x80;

/// Length of the fixed header
pub const HEADER_LEN: usize = 37;

/// The authenticator data flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuthenticatorFlags(u8);

impl AuthenticatorFlags {
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn user_present(self) -> bool {
        self.0 & FLAG_UP != 0
    }

    #[must_use]
    pub const fn user_verified(self) -> bool {
        self.0 & FLAG_UV != 0
    }

    #[must_use]
    pub const fn backup_eligible(self) -> bool {
        self.0 & FLAG_BE != 0
    }

    #[must_use]
    pub const fn backed_up(self) -> bool {
        self.0 & FLAG_BS != 0
    }

    #[must_use]
    pub const fn attested_credential_data(self) -> bool {
        self.0 & FLAG_AT != 0
    }

    #[must_use]
    pub const fn extension_data(self) -> bool {
        self.0 & FLAG_ED != 0
    }
}

/// The credential created during registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestedCredentialData {
    pub aaguid: Uuid,
    #[serde(with = "super::encoding::base64url")]
    pub credential_id: Vec<u8>,
    pub credential_public_key: CoseKey,
    /// COSE bytes exactly as the authenticator encoded them
    #[serde(skip)]
    pub public_key_bytes: Vec<u8>,
}

/// Decoded authenticator data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorData {
    #[serde(serialize_with = "super::encoding::base64url::serialize")]
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub counter: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attested_credential_data: Option<AttestedCredentialData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, AuthenticatorExtension>>,
    #[serde(skip)]
    raw_extensions: Vec<u8>,
}

impl AuthenticatorData {
    /// Decode authenticator data
    ///
    /// # Errors
    /// Returns `ParseError` on truncation, trailing bytes, or flags that
    /// disagree with the sections present
    pub fn parse(bytes: &[u8]) -> Result<Self, Fido2Error> {
        let mut reader = ByteReader::new(bytes);
        let rp_id_hash = reader.array::<32>("rpIdHash")?;
        let flags = AuthenticatorFlags(reader.u8("flags")?);
        let counter = reader.u32("signCount")?;

        let attested_credential_data = if flags.attested_credential_data() {
            let aaguid = Uuid::from_bytes(reader.array::<16>("AAGUID")?);
            let credential_id = reader.sized("credential ID")?.to_vec();
            let (value, used) =
                cbor::decode_prefix(reader.remaining(), "credential public key")?;
            let public_key_bytes = reader.take(used, "credential public key")?.to_vec();
            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                credential_public_key: CoseKey::from_cbor(&value)?,
                public_key_bytes,
            })
        } else {
            None
        };

        let (extensions, raw_extensions) = if flags.extension_data() {
            if reader.is_empty() {
                return Err(Fido2Error::parse(
                    "ED flag is set but no extension data follows",
                ));
            }
            let (value, used) = cbor::decode_prefix(reader.remaining(), "extension data")?;
            let raw = reader.take(used, "extension data")?.to_vec();
            (Some(decode_authenticator_extensions(&value)?), raw)
        } else {
            (None, Vec::new())
        };

        if !reader.is_empty() {
            return Err(Fido2Error::parse(format!(
                "{} unexpected bytes after authenticator data at offset {}",
                reader.remaining().len(),
                reader.position()
            )));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            counter,
            attested_credential_data,
            extensions,
            raw_extensions,
        })
    }

    /// Re-encode; yields the exact bytes that were parsed
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(self.flags.bits());
        out.extend_from_slice(&self.counter.to_be_bytes());
        if let Some(acd) = &self.attested_credential_data {
            out.extend_from_slice(acd.aaguid.as_bytes());
            let id_len = u16::try_from(acd.credential_id.len()).unwrap_or(u16::MAX);
            out.extend_from_slice(&id_len.to_be_bytes());
            out.extend_from_slice(&acd.credential_id);
            out.extend_from_slice(&acd.public_key_bytes);
        }
        out.extend_from_slice(&self.raw_extensions);
        out
    }

    /// Compare the RP ID hash against `sha256(rp_id)`
    ///
    /// # Errors
    /// Returns `ExpectationMismatch` if the hashes differ
    pub fn verify_rp_id_hash(&self, rp_id: &str) -> Result<(), Fido2Error> {
        if self.rp_id_hash == sha256(rp_id.as_bytes()) {
            Ok(())
        } else {
            Err(Fido2Error::mismatch(format!(
                "Authenticator data RP ID hash does not match {rp_id}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::cose::{CoseAlgorithm, CoseKeyParameters};
    use ciborium::value::Value;

    fn sample_key() -> CoseKey {
        CoseKey {
            algorithm: CoseAlgorithm::EdDSA,
            parameters: CoseKeyParameters::Okp { x: vec![7u8; 32] },
        }
    }

    fn registration_bytes(with_extensions: bool) -> Vec<u8> {
        let mut flags = FLAG_UP | FLAG_AT;
        if with_extensions {
            flags |= FLAG_ED;
        }
        let mut out = sha256(b"example.org").to_vec();
        out.push(flags);
        out.extend_from_slice(&5u32.to_be_bytes());
        out.extend_from_slice(&[0xaa; 16]);
        out.extend_from_slice(&3u16.to_be_bytes());
        out.extend_from_slice(&[1, 2, 3]);
        out.extend(sample_key().to_bytes().unwrap());
        if with_extensions {
            let map = Value::Map(vec![(
                Value::Text("credProtect".to_string()),
                Value::Integer(1.into()),
            )]);
            out.extend(cbor::encode_value(&map).unwrap());
        }
        out
    }

    #[test]
    fn test_parse_registration_data() {
        let bytes = registration_bytes(true);
        let parsed = AuthenticatorData::parse(&bytes).unwrap();
        assert!(parsed.flags.user_present());
        assert!(!parsed.flags.user_verified());
        assert_eq!(parsed.counter, 5);

        let acd = parsed.attested_credential_data.as_ref().unwrap();
        assert_eq!(acd.credential_id, vec![1, 2, 3]);
        assert_eq!(acd.credential_public_key, sample_key());
        assert_eq!(
            parsed.extensions.as_ref().unwrap()["credProtect"],
            AuthenticatorExtension::CredProtect(1)
        );
        parsed.verify_rp_id_hash("example.org").unwrap();
        assert!(matches!(
            parsed.verify_rp_id_hash("evil.example"),
            Err(Fido2Error::ExpectationMismatch(_))
        ));
    }

    #[test]
    fn test_round_trip_and_every_truncation_fails() {
        for with_extensions in [false, true] {
            let bytes = registration_bytes(with_extensions);
            let parsed = AuthenticatorData::parse(&bytes).unwrap();
            assert_eq!(parsed.to_bytes(), bytes);

            for cut in 1..=bytes.len() {
                let truncated = &bytes[..bytes.len() - cut];
                assert!(
                    matches!(
                        AuthenticatorData::parse(truncated),
                        Err(Fido2Error::ParseError(_))
                    ),
                    "truncating {cut} bytes should fail"
                );
            }
        }
    }

    #[test]
    fn test_flags_must_match_sections() {
        // AT clear but credential data present
        let mut bytes = registration_bytes(false);
        bytes[32] = FLAG_UP;
        assert!(matches!(
            AuthenticatorData::parse(&bytes),
            Err(Fido2Error::ParseError(_))
        ));

        // ED set with nothing after the header
        let mut header = sha256(b"example.org").to_vec();
        header.push(FLAG_UP | FLAG_ED);
        header.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            AuthenticatorData::parse(&header),
            Err(Fido2Error::ParseError(_))
        ));

        header[32] = FLAG_UP;
        let parsed = AuthenticatorData::parse(&header).unwrap();
        assert!(parsed.attested_credential_data.is_none());
        assert_eq!(parsed.to_bytes(), header);
    }
}
