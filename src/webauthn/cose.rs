//! COSE public keys
//!
//! Credential public keys arrive as COSE_Key maps inside the attested
//! credential data. This module decodes them into a typed record, verifies
//! signatures with them and exports them as PEM `SubjectPublicKeyInfo`.

use std::fmt;

use ciborium::value::Value;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, PKeyRef, Public};
use openssl::rsa::Rsa;
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};
use serde::{Deserialize, Serialize};

use super::cbor::{self, int_entry, value_to_i64};
use super::crypto::{self, HashAlgorithm};
use super::errors::Fido2Error;

const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_N: i64 = -1;
const LABEL_E: i64 = -2;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

const CRV_ED25519: i64 = 6;

/// COSE signature algorithms accepted for credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum CoseAlgorithm {
    ES256,
    ES384,
    ES512,
    EdDSA,
    PS256,
    PS384,
    PS512,
    RS256,
    RS384,
    RS512,
    RS1,
}

impl CoseAlgorithm {
    /// Every algorithm, in the default preference order
    pub const ALL: [Self; 11] = [
        Self::ES256,
        Self::ES384,
        Self::ES512,
        Self::EdDSA,
        Self::PS256,
        Self::PS384,
        Self::PS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::RS1,
    ];

    /// The IANA COSE algorithm identifier
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::ES256 => -7,
            Self::ES384 => -35,
            Self::ES512 => -36,
            Self::EdDSA => -8,
            Self::PS256 => -37,
            Self::PS384 => -38,
            Self::PS512 => -39,
            Self::RS256 => -257,
            Self::RS384 => -258,
            Self::RS512 => -259,
            Self::RS1 => -65535,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
            Self::EdDSA => "EdDSA",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::RS1 => "RS1",
        }
    }

    /// Digest applied before signing; `None` for `EdDSA`, which hashes internally
    #[must_use]
    pub const fn hash(self) -> Option<HashAlgorithm> {
        match self {
            Self::ES256 | Self::PS256 | Self::RS256 => Some(HashAlgorithm::Sha256),
            Self::ES384 | Self::PS384 | Self::RS384 => Some(HashAlgorithm::Sha384),
            Self::ES512 | Self::PS512 | Self::RS512 => Some(HashAlgorithm::Sha512),
            Self::RS1 => Some(HashAlgorithm::Sha1),
            Self::EdDSA => None,
        }
    }

    #[must_use]
    pub const fn is_pss(self) -> bool {
        matches!(self, Self::PS256 | Self::PS384 | Self::PS512)
    }

    #[must_use]
    pub const fn is_ecdsa(self) -> bool {
        matches!(self, Self::ES256 | Self::ES384 | Self::ES512)
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> Self {
        alg.id()
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = Fido2Error;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.id() == id)
            .ok_or_else(|| Fido2Error::parse(format!("Unsupported COSE algorithm {id}")))
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Elliptic curves used by EC2 keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcCurve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
}

impl EcCurve {
    fn from_cose(crv: i64) -> Result<Self, Fido2Error> {
        match crv {
            1 => Ok(Self::P256),
            2 => Ok(Self::P384),
            3 => Ok(Self::P521),
            other => Err(Fido2Error::parse(format!("Unsupported EC2 curve {other}"))),
        }
    }

    const fn cose_id(self) -> i64 {
        match self {
            Self::P256 => 1,
            Self::P384 => 2,
            Self::P521 => 3,
        }
    }

    /// Byte length of one affine coordinate
    #[must_use]
    pub const fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    pub(crate) const fn nid(self) -> Nid {
        match self {
            Self::P256 => Nid::X9_62_PRIME256V1,
            Self::P384 => Nid::SECP384R1,
            Self::P521 => Nid::SECP521R1,
        }
    }

    const fn algorithm(self) -> CoseAlgorithm {
        match self {
            Self::P256 => CoseAlgorithm::ES256,
            Self::P384 => CoseAlgorithm::ES384,
            Self::P521 => CoseAlgorithm::ES512,
        }
    }
}

/// Key material, by COSE key type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum CoseKeyParameters {
    #[serde(rename = "EC2")]
    Ec2 {
        curve: EcCurve,
        #[serde(with = "super::encoding::base64url")]
        x: Vec<u8>,
        #[serde(with = "super::encoding::base64url")]
        y: Vec<u8>,
    },
    /// Ed25519 only
    #[serde(rename = "OKP")]
    Okp {
        #[serde(with = "super::encoding::base64url")]
        x: Vec<u8>,
    },
    #[serde(rename = "RSA")]
    Rsa {
        #[serde(with = "super::encoding::base64url")]
        n: Vec<u8>,
        #[serde(with = "super::encoding::base64url")]
        e: Vec<u8>,
    },
}

/// A decoded credential public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoseKey {
    pub algorithm: CoseAlgorithm,
    #[serde(flatten)]
    pub parameters: CoseKeyParameters,
}

fn key_bytes(map: &[(Value, Value)], label: i64, what: &str) -> Result<Vec<u8>, Fido2Error> {
    int_entry(map, label)
        .ok_or_else(|| Fido2Error::parse(format!("COSE key is missing {what}")))?
        .as_bytes()
        .cloned()
        .ok_or_else(|| Fido2Error::parse(format!("COSE key {what} is not a byte string")))
}

fn key_int(map: &[(Value, Value)], label: i64, what: &str) -> Result<i64, Fido2Error> {
    int_entry(map, label)
        .and_then(value_to_i64)
        .ok_or_else(|| Fido2Error::parse(format!("COSE key is missing integer {what}")))
}

impl CoseKey {
    /// Decode an already parsed COSE_Key map
    ///
    /// # Errors
    /// Returns `ParseError` if the map is incomplete, uses an unsupported key
    /// type or algorithm, or pairs an algorithm with the wrong key type
    pub fn from_cbor(value: &Value) -> Result<Self, Fido2Error> {
        let map = cbor::as_map(value, "COSE key")?;
        let kty = key_int(map, LABEL_KTY, "kty")?;
        let algorithm = CoseAlgorithm::try_from(key_int(map, LABEL_ALG, "alg")?)?;

        let parameters = match kty {
            KTY_EC2 => {
                let curve = EcCurve::from_cose(key_int(map, LABEL_CRV, "crv")?)?;
                let x = key_bytes(map, LABEL_X, "x")?;
                let y = key_bytes(map, LABEL_Y, "y")?;
                if x.len() != curve.coordinate_len() || y.len() != curve.coordinate_len() {
                    return Err(Fido2Error::parse(format!(
                        "EC2 coordinates must be {} bytes for {curve:?}",
                        curve.coordinate_len()
                    )));
                }
                if curve.algorithm() != algorithm {
                    return Err(Fido2Error::parse(format!(
                        "Algorithm {algorithm} does not match curve {curve:?}"
                    )));
                }
                CoseKeyParameters::Ec2 { curve, x, y }
            }
            KTY_OKP => {
                if key_int(map, LABEL_CRV, "crv")? != CRV_ED25519 {
                    return Err(Fido2Error::parse("Only Ed25519 OKP keys are supported"));
                }
                let x = key_bytes(map, LABEL_X, "x")?;
                if x.len() != 32 || algorithm != CoseAlgorithm::EdDSA {
                    return Err(Fido2Error::parse("Invalid Ed25519 COSE key"));
                }
                CoseKeyParameters::Okp { x }
            }
            KTY_RSA => {
                if algorithm.is_ecdsa() || algorithm == CoseAlgorithm::EdDSA {
                    return Err(Fido2Error::parse(format!(
                        "Algorithm {algorithm} cannot be used with an RSA key"
                    )));
                }
                let n = key_bytes(map, LABEL_N, "n")?;
                let e = key_bytes(map, LABEL_E, "e")?;
                if n.is_empty() || e.is_empty() {
                    return Err(Fido2Error::parse("RSA COSE key has empty components"));
                }
                CoseKeyParameters::Rsa { n, e }
            }
            other => {
                return Err(Fido2Error::parse(format!("Unsupported COSE key type {other}")))
            }
        };

        Ok(Self {
            algorithm,
            parameters,
        })
    }

    /// Decode a complete COSE_Key byte string
    ///
    /// # Errors
    /// Returns `ParseError` on invalid CBOR, trailing bytes or an invalid key
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Fido2Error> {
        Self::from_cbor(&cbor::decode_value(bytes, "COSE key")?)
    }

    /// Canonical CBOR encoding of this key
    ///
    /// # Errors
    /// Returns `InternalError` if CBOR encoding fails
    pub fn to_bytes(&self) -> Result<Vec<u8>, Fido2Error> {
        let int = |i: i64| Value::Integer(i.into());
        let mut map = Vec::with_capacity(5);
        match &self.parameters {
            CoseKeyParameters::Ec2 { curve, x, y } => {
                map.push((int(LABEL_KTY), int(KTY_EC2)));
                map.push((int(LABEL_ALG), int(self.algorithm.id())));
                map.push((int(LABEL_CRV), int(curve.cose_id())));
                map.push((int(LABEL_X), Value::Bytes(x.clone())));
                map.push((int(LABEL_Y), Value::Bytes(y.clone())));
            }
            CoseKeyParameters::Okp { x } => {
                map.push((int(LABEL_KTY), int(KTY_OKP)));
                map.push((int(LABEL_ALG), int(self.algorithm.id())));
                map.push((int(LABEL_CRV), int(CRV_ED25519)));
                map.push((int(LABEL_X), Value::Bytes(x.clone())));
            }
            CoseKeyParameters::Rsa { n, e } => {
                map.push((int(LABEL_KTY), int(KTY_RSA)));
                map.push((int(LABEL_ALG), int(self.algorithm.id())));
                map.push((int(LABEL_N), Value::Bytes(n.clone())));
                map.push((int(LABEL_E), Value::Bytes(e.clone())));
            }
        }
        cbor::encode_value(&Value::Map(map))
    }

    /// Uncompressed SEC1 point `0x04 || x || y`, as fido-u2f signs it
    ///
    /// # Errors
    /// Returns `ParseError` if this is not a P-256 key
    pub fn x962_point(&self) -> Result<Vec<u8>, Fido2Error> {
        match &self.parameters {
            CoseKeyParameters::Ec2 {
                curve: EcCurve::P256,
                x,
                y,
            } => {
                let mut point = Vec::with_capacity(65);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Ok(point)
            }
            _ => Err(Fido2Error::parse("Expected a P-256 EC2 public key")),
        }
    }

    /// Verify a signature made by the credential's private key
    ///
    /// ECDSA signatures are DER encoded, as authenticators produce them.
    ///
    /// # Errors
    /// Returns `ParseError` for a malformed ECDSA signature and
    /// `SignatureVerification` if the signature does not verify
    pub fn verify(&self, data: &[u8], signature_bytes: &[u8]) -> Result<(), Fido2Error> {
        if self.algorithm.is_ecdsa() {
            EcdsaSig::from_der(signature_bytes)
                .map_err(|e| Fido2Error::parse(format!("Malformed ECDSA signature: {e}")))?;
        }

        let outcome = match (&self.parameters, self.algorithm) {
            (CoseKeyParameters::Ec2 { curve, .. }, _) if *curve != EcCurve::P521 => {
                let point = self.sec1_point();
                let params = if *curve == EcCurve::P256 {
                    &signature::ECDSA_P256_SHA256_ASN1
                } else {
                    &signature::ECDSA_P384_SHA384_ASN1
                };
                UnparsedPublicKey::new(params, point).verify(data, signature_bytes)
            }
            (CoseKeyParameters::Ec2 { .. }, _) => {
                // ring has no P-521
                let key = self.to_pkey()?;
                return crypto::verify_with_key(self.algorithm, &key, data, signature_bytes);
            }
            (CoseKeyParameters::Okp { x }, _) => {
                UnparsedPublicKey::new(&signature::ED25519, x).verify(data, signature_bytes)
            }
            (CoseKeyParameters::Rsa { n, e }, alg) => {
                let params = match alg {
                    CoseAlgorithm::RS256 => &signature::RSA_PKCS1_2048_8192_SHA256,
                    CoseAlgorithm::RS384 => &signature::RSA_PKCS1_2048_8192_SHA384,
                    CoseAlgorithm::RS512 => &signature::RSA_PKCS1_2048_8192_SHA512,
                    CoseAlgorithm::RS1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
                    CoseAlgorithm::PS256 => &signature::RSA_PSS_2048_8192_SHA256,
                    CoseAlgorithm::PS384 => &signature::RSA_PSS_2048_8192_SHA384,
                    CoseAlgorithm::PS512 => &signature::RSA_PSS_2048_8192_SHA512,
                    other => {
                        return Err(Fido2Error::signature(format!(
                            "Algorithm {other} cannot be used with an RSA key"
                        )))
                    }
                };
                RsaPublicKeyComponents { n, e }.verify(params, data, signature_bytes)
            }
        };

        outcome.map_err(|_| {
            Fido2Error::signature(format!(
                "{} signature does not verify with the credential public key",
                self.algorithm
            ))
        })
    }

    fn sec1_point(&self) -> Vec<u8> {
        match &self.parameters {
            CoseKeyParameters::Ec2 { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                point
            }
            CoseKeyParameters::Okp { x } => x.clone(),
            CoseKeyParameters::Rsa { n, .. } => n.clone(),
        }
    }

    /// Convert to an openssl public key
    ///
    /// # Errors
    /// Returns `ParseError` if the key material is not a valid public key
    pub fn to_pkey(&self) -> Result<PKey<Public>, Fido2Error> {
        let invalid = |e: openssl::error::ErrorStack| {
            Fido2Error::parse(format!("Invalid credential public key: {e}"))
        };
        match &self.parameters {
            CoseKeyParameters::Ec2 { curve, x, y } => {
                let group = EcGroup::from_curve_name(curve.nid()).map_err(invalid)?;
                let x = BigNum::from_slice(x).map_err(invalid)?;
                let y = BigNum::from_slice(y).map_err(invalid)?;
                let key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)
                    .map_err(invalid)?;
                PKey::from_ec_key(key).map_err(invalid)
            }
            CoseKeyParameters::Okp { x } => {
                PKey::public_key_from_raw_bytes(x, Id::ED25519).map_err(invalid)
            }
            CoseKeyParameters::Rsa { n, e } => {
                let n = BigNum::from_slice(n).map_err(invalid)?;
                let e = BigNum::from_slice(e).map_err(invalid)?;
                let rsa = Rsa::from_public_components(n, e).map_err(invalid)?;
                PKey::from_rsa(rsa).map_err(invalid)
            }
        }
    }

    /// PEM `SubjectPublicKeyInfo` encoding of the key
    ///
    /// # Errors
    /// Returns `ParseError` if the key material is invalid
    pub fn to_pem(&self) -> Result<String, Fido2Error> {
        let pem = self
            .to_pkey()?
            .public_key_to_pem()
            .map_err(|e| Fido2Error::internal(format!("PEM export failed: {e}")))?;
        String::from_utf8(pem).map_err(|e| Fido2Error::internal(format!("PEM is not UTF-8: {e}")))
    }

    /// Whether an openssl key (typically from a certificate) is this key
    ///
    /// # Errors
    /// Returns `ParseError` if this key cannot be converted
    pub fn matches(&self, other: &PKeyRef<Public>) -> Result<bool, Fido2Error> {
        Ok(self.to_pkey()?.public_eq(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use ring::signature::{EcdsaKeyPair, Ed25519KeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

    fn p256_pair() -> (EcdsaKeyPair, CoseKey) {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .unwrap();
        let public = pair.public_key().as_ref();
        let key = CoseKey {
            algorithm: CoseAlgorithm::ES256,
            parameters: CoseKeyParameters::Ec2 {
                curve: EcCurve::P256,
                x: public[1..33].to_vec(),
                y: public[33..65].to_vec(),
            },
        };
        (pair, key)
    }

    #[test]
    fn test_es256_verify() {
        let (pair, key) = p256_pair();
        let sig = pair.sign(&SystemRandom::new(), b"signed data").unwrap();

        key.verify(b"signed data", sig.as_ref()).unwrap();
        assert!(matches!(
            key.verify(b"other data", sig.as_ref()),
            Err(Fido2Error::SignatureVerification(_))
        ));
        assert!(matches!(
            key.verify(b"signed data", &[0x01, 0x02]),
            Err(Fido2Error::ParseError(_))
        ));
    }

    #[test]
    fn test_ed25519_verify_and_pem() {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let key = CoseKey {
            algorithm: CoseAlgorithm::EdDSA,
            parameters: CoseKeyParameters::Okp {
                x: pair.public_key().as_ref().to_vec(),
            },
        };

        let sig = pair.sign(b"hello");
        key.verify(b"hello", sig.as_ref()).unwrap();
        assert!(key.to_pem().unwrap().starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[test]
    fn test_cbor_encoding_is_stable() {
        let (_, key) = p256_pair();
        let bytes = key.to_bytes().unwrap();
        let decoded = CoseKey::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
        assert_eq!(key.x962_point().unwrap().len(), 65);
    }

    #[test]
    fn test_rejects_inconsistent_keys() {
        let int = |i: i64| Value::Integer(i.into());
        // ES384 paired with a P-256 curve
        let mismatched = Value::Map(vec![
            (int(1), int(2)),
            (int(3), int(-35)),
            (int(-1), int(1)),
            (int(-2), Value::Bytes(vec![0; 32])),
            (int(-3), Value::Bytes(vec![0; 32])),
        ]);
        assert!(matches!(
            CoseKey::from_cbor(&mismatched),
            Err(Fido2Error::ParseError(_))
        ));

        let unknown_alg = Value::Map(vec![(int(1), int(2)), (int(3), int(-999))]);
        assert!(CoseKey::from_cbor(&unknown_alg).is_err());

        let missing_y = Value::Map(vec![
            (int(1), int(2)),
            (int(3), int(-7)),
            (int(-1), int(1)),
            (int(-2), Value::Bytes(vec![0; 32])),
        ]);
        assert!(CoseKey::from_cbor(&missing_y).is_err());
    }

    #[test]
    fn test_algorithm_ids() {
        assert_eq!(CoseAlgorithm::try_from(-257).unwrap(), CoseAlgorithm::RS256);
        assert_eq!(i64::from(CoseAlgorithm::PS384), -38);
        assert_eq!(serde_json::to_string(&CoseAlgorithm::ES256).unwrap(), "-7");
        assert!(CoseAlgorithm::try_from(0).is_err());
    }
}
