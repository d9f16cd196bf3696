//! Attestation statements for every supported format
//!
//! Each builder returns a closure for [`SoftAuthenticator::make_credential_with`]
//! producing a statement that passes verification. Tests break one field at
//! a time from there.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ciborium::value::Value;
use openssl::pkey::{PKey, Private};

use super::authenticator::{text, RegistrationParts, SoftAuthenticator};
use super::certificates::{ec_key, rsa_key, sign_sha256, CertificateFactory, LeafSpec};
use crate::webauthn::{encode_base64url, sha256, AttestationRequest, CoseAlgorithm, CoseKeyParameters};

const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;
const TPM_ALG_ECC: u16 = 0x0023;
const TPM_ALG_NULL: u16 = 0x0010;
const TPM_ALG_SHA256: u16 = 0x000b;
const TPM_ECC_NIST_P256: u16 = 0x0003;

fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

fn x5c(chain: Vec<Vec<u8>>) -> Value {
    Value::Array(chain.into_iter().map(Value::Bytes).collect())
}

fn push_sized(out: &mut Vec<u8>, data: &[u8]) {
    let len = u16::try_from(data.len()).expect("TPM2B too long");
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(data);
}

/// Builds attested registrations for one authenticator
pub struct AttestationFixtures<'a> {
    pub authenticator: &'a SoftAuthenticator,
    pub factory: CertificateFactory,
    /// Private key of the attestation certificate (packed, fido-u2f, tpm)
    pub attestation_key: PKey<Private>,
}

impl<'a> AttestationFixtures<'a> {
    #[must_use]
    pub fn new(authenticator: &'a SoftAuthenticator) -> Self {
        Self {
            authenticator,
            factory: CertificateFactory::new(),
            attestation_key: ec_key(),
        }
    }

    /// `packed` with an attestation certificate issued from `spec`
    #[must_use]
    pub fn packed_full_with(&self, challenge: &[u8], spec: &LeafSpec) -> AttestationRequest {
        self.packed_full_chain(challenge, spec, self.factory.ca_der())
    }

    /// `packed` whose `x5c` is the leaf followed by `issuer_der`, which need
    /// not be the certificate that issued the leaf
    #[must_use]
    pub fn packed_full_chain(
        &self,
        challenge: &[u8],
        spec: &LeafSpec,
        issuer_der: Vec<u8>,
    ) -> AttestationRequest {
        let leaf = self.factory.issue(spec, &self.attestation_key);
        self.authenticator.make_credential_with(challenge, "packed", |parts| {
            vec![
                (text("alg"), int(CoseAlgorithm::ES256.id())),
                (text("sig"), Value::Bytes(sign_sha256(&self.attestation_key, &parts.signed_data()))),
                (text("x5c"), x5c(vec![leaf, issuer_der])),
            ]
        })
    }

    #[must_use]
    pub fn packed_full(&self, challenge: &[u8]) -> AttestationRequest {
        self.packed_full_with(challenge, &LeafSpec::packed(self.authenticator.aaguid()))
    }

    /// `fido-u2f`; the credential must be P-256
    #[must_use]
    pub fn fido_u2f(&self, challenge: &[u8]) -> AttestationRequest {
        let leaf = self.factory.issue(&LeafSpec::fido_u2f(), &self.attestation_key);
        self.authenticator.make_credential_with(challenge, "fido-u2f", |parts| {
            let point = parts.credential_key.x962_point().expect("P-256 credential");
            let mut signed = vec![0x00];
            signed.extend_from_slice(&parts.auth_data[..32]); // rpIdHash
            signed.extend_from_slice(&parts.client_data_hash);
            signed.extend_from_slice(&parts.credential_id);
            signed.extend_from_slice(&point);
            vec![
                (text("sig"), Value::Bytes(sign_sha256(&self.attestation_key, &signed))),
                (text("x5c"), x5c(vec![leaf])),
            ]
        })
    }

    /// `tpm` with an ECC pubArea for a P-256 credential
    #[must_use]
    pub fn tpm(&self, challenge: &[u8]) -> AttestationRequest {
        let leaf = self
            .factory
            .issue(&LeafSpec::tpm_aik(self.authenticator.aaguid()), &self.attestation_key);
        self.authenticator.make_credential_with(challenge, "tpm", |parts| {
            let pub_area = tpm_pub_area(parts);
            let cert_info = tpm_cert_info(&sha256(&parts.signed_data()), &pub_area);
            vec![
                (text("ver"), text("2.0")),
                (text("alg"), int(CoseAlgorithm::ES256.id())),
                (text("x5c"), x5c(vec![leaf, self.factory.ca_der()])),
                (text("sig"), Value::Bytes(sign_sha256(&self.attestation_key, &cert_info))),
                (text("certInfo"), Value::Bytes(cert_info)),
                (text("pubArea"), Value::Bytes(pub_area)),
            ]
        })
    }

    /// `android-key`: the leaf certifies the credential key itself
    #[must_use]
    pub fn android_key(&self, challenge: &[u8]) -> AttestationRequest {
        let credential_key = self
            .authenticator
            .cose_key()
            .to_pkey()
            .expect("credential key");
        self.authenticator.make_credential_with(challenge, "android-key", |parts| {
            let leaf = self
                .factory
                .issue(&LeafSpec::android_key(&parts.client_data_hash), &credential_key);
            vec![
                (text("alg"), int(self.authenticator.algorithm().id())),
                (text("sig"), Value::Bytes(self.authenticator.sign(&parts.signed_data()))),
                (text("x5c"), x5c(vec![leaf, self.factory.ca_der()])),
            ]
        })
    }

    /// `apple`: nonce extension over `authData || clientDataHash`
    #[must_use]
    pub fn apple(&self, challenge: &[u8]) -> AttestationRequest {
        let credential_key = self
            .authenticator
            .cose_key()
            .to_pkey()
            .expect("credential key");
        self.authenticator.make_credential_with(challenge, "apple", |parts| {
            let nonce = sha256(&parts.signed_data());
            let leaf = self.factory.issue(&LeafSpec::apple(&nonce), &credential_key);
            vec![(text("x5c"), x5c(vec![leaf, self.factory.ca_der()]))]
        })
    }

    /// `android-safetynet` with an RS256 JWS from a leaf issued to `hostname`
    #[must_use]
    pub fn android_safetynet(
        &self,
        challenge: &[u8],
        hostname: &str,
        cts_profile_match: bool,
        timestamp_ms: i64,
    ) -> AttestationRequest {
        let jws_key = rsa_key();
        let leaf = self.factory.issue(&LeafSpec::safetynet(hostname), &jws_key);
        self.authenticator
            .make_credential_with(challenge, "android-safetynet", |parts| {
                let header = serde_json::json!({
                    "alg": "RS256",
                    "x5c": [STANDARD.encode(&leaf), STANDARD.encode(self.factory.ca_der())],
                });
                let payload = serde_json::json!({
                    "nonce": STANDARD.encode(sha256(&parts.signed_data())),
                    "timestampMs": timestamp_ms,
                    "apkPackageName": "com.google.android.gms",
                    "ctsProfileMatch": cts_profile_match,
                    "basicIntegrity": true,
                });
                let signing_input = format!(
                    "{}.{}",
                    encode_base64url(header.to_string().as_bytes()),
                    encode_base64url(payload.to_string().as_bytes())
                );
                let signature = sign_sha256(&jws_key, signing_input.as_bytes());
                let jws = format!("{signing_input}.{}", encode_base64url(&signature));
                vec![
                    (text("ver"), text("14366018")),
                    (text("response"), Value::Bytes(jws.into_bytes())),
                ]
            })
    }
}

/// `TPMT_PUBLIC` for the P-256 credential key
fn tpm_pub_area(parts: &RegistrationParts) -> Vec<u8> {
    let CoseKeyParameters::Ec2 { x, y, .. } = &parts.credential_key.parameters else {
        panic!("TPM fixture needs an EC2 credential key");
    };
    let mut out = Vec::new();
    out.extend_from_slice(&TPM_ALG_ECC.to_be_bytes());
    out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
    out.extend_from_slice(&0x0006_0472u32.to_be_bytes());
    push_sized(&mut out, &[]);
    out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // symmetric
    out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // scheme
    out.extend_from_slice(&TPM_ECC_NIST_P256.to_be_bytes());
    out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // kdf
    push_sized(&mut out, x);
    push_sized(&mut out, y);
    out
}

/// `TPMS_ATTEST` certifying `pub_area`, with `extra_data` as the attested hash
fn tpm_cert_info(extra_data: &[u8], pub_area: &[u8]) -> Vec<u8> {
    let mut name = TPM_ALG_SHA256.to_be_bytes().to_vec();
    name.extend_from_slice(&sha256(pub_area));

    let mut out = Vec::new();
    out.extend_from_slice(&TPM_GENERATED_VALUE.to_be_bytes());
    out.extend_from_slice(&TPM_ST_ATTEST_CERTIFY.to_be_bytes());
    push_sized(&mut out, &[0x00, 0x0b, 0xaa, 0xbb]); // qualifiedSigner
    push_sized(&mut out, extra_data);
    out.extend_from_slice(&[0u8; 17]); // clockInfo
    out.extend_from_slice(&0u64.to_be_bytes()); // firmwareVersion
    push_sized(&mut out, &name);
    push_sized(&mut out, &[]); // qualifiedName
    out
}
