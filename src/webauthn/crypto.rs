//! `WebAuthn` cryptography operations
//!
//! Hashing and randomness come from `ring`. Verification against keys that
//! arrive as certificates or PEM goes through `openssl`, which also covers the
//! curves and padding modes `ring` does not expose.

use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKeyRef, Public};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Verifier};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use super::cose::CoseAlgorithm;
use super::errors::Fido2Error;

/// Fill a buffer of `len` bytes from the system CSPRNG
///
/// # Errors
/// Returns `InternalError` if the random source fails
pub fn random_bytes(len: usize) -> Result<Vec<u8>, Fido2Error> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| Fido2Error::internal("System random source unavailable"))?;
    Ok(bytes)
}

/// Hash data using SHA-256
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest::digest(&digest::SHA256, data).as_ref());
    out
}

/// Hash functions referenced by COSE algorithms and TPM structures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Map a `TPM_ALG_ID` hash identifier
    pub(crate) fn from_tpm(alg: u16) -> Result<Self, Fido2Error> {
        match alg {
            0x0004 => Ok(Self::Sha1),
            0x000b => Ok(Self::Sha256),
            0x000c => Ok(Self::Sha384),
            0x000d => Ok(Self::Sha512),
            other => Err(Fido2Error::parse(format!(
                "Unsupported TPM hash algorithm {other:#06x}"
            ))),
        }
    }

    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let algorithm = match self {
            Self::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &digest::SHA256,
            Self::Sha384 => &digest::SHA384,
            Self::Sha512 => &digest::SHA512,
        };
        digest::digest(algorithm, data).as_ref().to_vec()
    }

    pub(crate) fn message_digest(self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha256 => MessageDigest::sha256(),
            Self::Sha384 => MessageDigest::sha384(),
            Self::Sha512 => MessageDigest::sha512(),
        }
    }
}

/// Curve name of an EC key, if it is one
fn ec_curve(key: &PKeyRef<Public>) -> Option<Nid> {
    key.ec_key().ok().and_then(|ec| ec.group().curve_name())
}

/// Choose the COSE algorithm matching a bare public key (PEM or certificate)
///
/// A bare RSA key does not say which padding it signs with, so RSA always
/// maps to RS256 (PKCS#1 v1.5 with SHA-256). Credentials registered with a
/// PSS or other RSA algorithm must be stored as COSE to keep it.
///
/// # Errors
/// Returns `ParseError` for key types that have no `WebAuthn` algorithm
pub fn algorithm_for_key(key: &PKeyRef<Public>) -> Result<CoseAlgorithm, Fido2Error> {
    match key.id() {
        Id::EC => match ec_curve(key) {
            Some(Nid::X9_62_PRIME256V1) => Ok(CoseAlgorithm::ES256),
            Some(Nid::SECP384R1) => Ok(CoseAlgorithm::ES384),
            Some(Nid::SECP521R1) => Ok(CoseAlgorithm::ES512),
            _ => Err(Fido2Error::parse("Unsupported elliptic curve in public key")),
        },
        Id::RSA => Ok(CoseAlgorithm::RS256),
        Id::ED25519 => Ok(CoseAlgorithm::EdDSA),
        _ => Err(Fido2Error::parse("Unsupported public key type")),
    }
}

/// Whether an openssl key is of the family (and curve) `alg` requires
fn key_matches_algorithm(alg: CoseAlgorithm, key: &PKeyRef<Public>) -> bool {
    match alg {
        CoseAlgorithm::ES256 => ec_curve(key) == Some(Nid::X9_62_PRIME256V1),
        CoseAlgorithm::ES384 => ec_curve(key) == Some(Nid::SECP384R1),
        CoseAlgorithm::ES512 => ec_curve(key) == Some(Nid::SECP521R1),
        CoseAlgorithm::EdDSA => key.id() == Id::ED25519,
        _ => key.id() == Id::RSA,
    }
}

/// Verify `signature` over `data` with an openssl public key
///
/// ECDSA signatures are expected in DER form.
///
/// # Errors
/// Returns `SignatureVerification` if the key does not fit `alg` or the
/// signature does not verify
pub fn verify_with_key(
    alg: CoseAlgorithm,
    key: &PKeyRef<Public>,
    data: &[u8],
    signature: &[u8],
) -> Result<(), Fido2Error> {
    if !key_matches_algorithm(alg, key) {
        return Err(Fido2Error::signature(format!(
            "Public key type does not match algorithm {}",
            alg.name()
        )));
    }

    let verified = match alg.hash() {
        None => Verifier::new_without_digest(key)
            .and_then(|mut verifier| verifier.verify_oneshot(signature, data)),
        Some(hash) => Verifier::new(hash.message_digest(), key).and_then(|mut verifier| {
            if alg.is_pss() {
                verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
                verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
                verifier.set_rsa_mgf1_md(hash.message_digest())?;
            }
            verifier.update(data)?;
            verifier.verify(signature)
        }),
    };

    match verified {
        Ok(true) => Ok(()),
        Ok(false) => Err(Fido2Error::signature(format!(
            "{} signature does not verify",
            alg.name()
        ))),
        Err(e) => Err(Fido2Error::signature(format!(
            "{} signature could not be checked: {e}",
            alg.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::sign::Signer;

    #[test]
    fn test_random_bytes_length_and_uniqueness() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256(b"abc")[..4],
            [0xba, 0x78, 0x16, 0xbf],
        );
        assert_eq!(HashAlgorithm::Sha384.digest(b"abc").len(), 48);
        assert_eq!(HashAlgorithm::from_tpm(0x000b).unwrap(), HashAlgorithm::Sha256);
        assert!(HashAlgorithm::from_tpm(0x0012).is_err());
    }

    #[test]
    fn test_verify_with_openssl_key() {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let private = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        let public = PKey::public_key_from_der(&private.public_key_to_der().unwrap()).unwrap();

        let mut signer = Signer::new(MessageDigest::sha256(), &private).unwrap();
        signer.update(b"payload").unwrap();
        let signature = signer.sign_to_vec().unwrap();

        assert_eq!(algorithm_for_key(&public).unwrap(), CoseAlgorithm::ES256);
        verify_with_key(CoseAlgorithm::ES256, &public, b"payload", &signature).unwrap();
        assert!(matches!(
            verify_with_key(CoseAlgorithm::ES256, &public, b"tampered", &signature),
            Err(Fido2Error::SignatureVerification(_))
        ));
        assert!(matches!(
            verify_with_key(CoseAlgorithm::RS256, &public, b"payload", &signature),
            Err(Fido2Error::SignatureVerification(_))
        ));
    }

    #[test]
    fn test_bare_rsa_key_verifies_as_rs256_only() {
        let private = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let public = PKey::public_key_from_der(&private.public_key_to_der().unwrap()).unwrap();
        assert_eq!(algorithm_for_key(&public).unwrap(), CoseAlgorithm::RS256);

        let mut signer = Signer::new(MessageDigest::sha256(), &private).unwrap();
        signer.set_rsa_padding(Padding::PKCS1_PSS).unwrap();
        signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH).unwrap();
        signer.set_rsa_mgf1_md(MessageDigest::sha256()).unwrap();
        signer.update(b"payload").unwrap();
        let pss_signature = signer.sign_to_vec().unwrap();

        let inferred = algorithm_for_key(&public).unwrap();
        assert!(verify_with_key(inferred, &public, b"payload", &pss_signature).is_err());
        verify_with_key(CoseAlgorithm::PS256, &public, b"payload", &pss_signature).unwrap();
    }
}
