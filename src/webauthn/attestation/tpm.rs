//! `tpm` attestation (TPM 2.0)
//!
//! The AIK signs a `TPMS_ATTEST` structure (`certInfo`) whose `extraData` is
//! the hash of the attested data and whose attested name is the hash of the
//! `TPMT_PUBLIC` area (`pubArea`) describing the credential key.

use der_parser::Oid;

use super::certificate::{self, AttestationCertificate};
use super::{AttestationTrust, StatementContext};
use crate::webauthn::bytes::ByteReader;
use crate::webauthn::cbor::{required_bytes, required_text};
use crate::webauthn::cose::{CoseKeyParameters, EcCurve};
use crate::webauthn::crypto::HashAlgorithm;
use crate::webauthn::errors::Fido2Error;

const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;
const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_ECC: u16 = 0x0023;
const TPM_ALG_NULL: u16 = 0x0010;
const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

const OID_TCG_KP_AIK_CERTIFICATE: Oid<'static> = der_parser::oid!(2.23.133 .8 .3);

/// Public key described by `pubArea.unique`
#[derive(Debug, Clone, PartialEq, Eq)]
enum TpmPublicKey {
    /// Exponent is big-endian without leading zeros
    Rsa { modulus: Vec<u8>, exponent: Vec<u8> },
    Ecc { curve: u16, x: Vec<u8>, y: Vec<u8> },
}

/// Decoded `TPMT_PUBLIC`
#[derive(Debug, Clone)]
struct PubArea {
    key: TpmPublicKey,
}

/// Skip a scheme selector and, unless it is `TPM_ALG_NULL`, its hash algorithm
fn skip_scheme(reader: &mut ByteReader<'_>, what: &str) -> Result<(), Fido2Error> {
    if reader.u16(what)? != TPM_ALG_NULL {
        reader.u16(what)?;
    }
    Ok(())
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

impl PubArea {
    fn parse(bytes: &[u8]) -> Result<Self, Fido2Error> {
        let mut reader = ByteReader::new(bytes);
        let kind = reader.u16("pubArea type")?;
        reader.u16("pubArea nameAlg")?;
        reader.u32("pubArea objectAttributes")?;
        reader.sized("pubArea authPolicy")?;

        if reader.u16("pubArea symmetric")? != TPM_ALG_NULL {
            return Err(Fido2Error::parse("pubArea symmetric algorithm must be TPM_ALG_NULL"));
        }

        let key = match kind {
            TPM_ALG_RSA => {
                skip_scheme(&mut reader, "pubArea RSA scheme")?;
                reader.u16("pubArea keyBits")?;
                let exponent = match reader.u32("pubArea exponent")? {
                    0 => 65537u32,
                    e => e,
                };
                let exponent = strip_leading_zeros(&exponent.to_be_bytes()).to_vec();
                let modulus = reader.sized("pubArea RSA unique")?.to_vec();
                TpmPublicKey::Rsa { modulus, exponent }
            }
            TPM_ALG_ECC => {
                skip_scheme(&mut reader, "pubArea ECC scheme")?;
                let curve = reader.u16("pubArea curveID")?;
                skip_scheme(&mut reader, "pubArea kdf")?;
                let x = reader.sized("pubArea ECC x")?.to_vec();
                let y = reader.sized("pubArea ECC y")?.to_vec();
                TpmPublicKey::Ecc { curve, x, y }
            }
            other => {
                return Err(Fido2Error::parse(format!(
                    "Unsupported pubArea type {other:#06x}"
                )))
            }
        };

        if !reader.is_empty() {
            return Err(Fido2Error::parse("Trailing bytes after pubArea"));
        }
        Ok(Self { key })
    }

    fn matches_credential(&self, credential: &CoseKeyParameters) -> bool {
        match (&self.key, credential) {
            (TpmPublicKey::Rsa { modulus, exponent }, CoseKeyParameters::Rsa { n, e }) => {
                modulus == n && exponent.as_slice() == strip_leading_zeros(e)
            }
            (TpmPublicKey::Ecc { curve, x, y }, CoseKeyParameters::Ec2 { curve: cose, x: cx, y: cy }) => {
                let expected = match cose {
                    EcCurve::P256 => TPM_ECC_NIST_P256,
                    EcCurve::P384 => TPM_ECC_NIST_P384,
                    EcCurve::P521 => TPM_ECC_NIST_P521,
                };
                *curve == expected && x == cx && y == cy
            }
            _ => false,
        }
    }
}

/// The parts of `TPMS_ATTEST` that are checked
#[derive(Debug, Clone)]
struct CertInfo {
    extra_data: Vec<u8>,
    attested_name: Vec<u8>,
}

impl CertInfo {
    fn parse(bytes: &[u8]) -> Result<Self, Fido2Error> {
        let mut reader = ByteReader::new(bytes);
        if reader.u32("certInfo magic")? != TPM_GENERATED_VALUE {
            return Err(Fido2Error::signature("certInfo magic is not TPM_GENERATED_VALUE"));
        }
        if reader.u16("certInfo type")? != TPM_ST_ATTEST_CERTIFY {
            return Err(Fido2Error::signature("certInfo type is not TPM_ST_ATTEST_CERTIFY"));
        }
        reader.sized("certInfo qualifiedSigner")?;
        let extra_data = reader.sized("certInfo extraData")?.to_vec();
        reader.take(17, "certInfo clockInfo")?;
        reader.u64("certInfo firmwareVersion")?;
        let attested_name = reader.sized("certInfo attested name")?.to_vec();
        reader.sized("certInfo attested qualifiedName")?;
        if !reader.is_empty() {
            return Err(Fido2Error::parse("Trailing bytes after certInfo"));
        }
        Ok(Self {
            extra_data,
            attested_name,
        })
    }

    /// The attested name must be `nameAlg || H_nameAlg(pubArea)`
    fn check_name(&self, pub_area: &[u8]) -> Result<(), Fido2Error> {
        let mut reader = ByteReader::new(&self.attested_name);
        let name_alg = HashAlgorithm::from_tpm(reader.u16("attested nameAlg")?)?;
        if reader.remaining() != name_alg.digest(pub_area).as_slice() {
            return Err(Fido2Error::signature("certInfo attested name does not match pubArea"));
        }
        Ok(())
    }
}

fn check_aik_certificate(cert: &AttestationCertificate, aaguid: &[u8; 16]) -> Result<(), Fido2Error> {
    if cert.version() != 3 {
        return Err(Fido2Error::signature("AIK certificate must be X.509 v3"));
    }
    if !cert.subject_is_empty() {
        return Err(Fido2Error::signature("AIK certificate subject must be empty"));
    }
    if !cert.has_extended_key_usage(&OID_TCG_KP_AIK_CERTIFICATE)? {
        return Err(Fido2Error::signature(
            "AIK certificate lacks the tcg-kp-AIKCertificate extended key usage",
        ));
    }
    if cert.is_ca()? {
        return Err(Fido2Error::signature("AIK certificate must not be a CA"));
    }
    cert.check_aaguid(aaguid)
}

pub(super) fn verify(ctx: &StatementContext<'_>) -> Result<AttestationTrust, Fido2Error> {
    let version = required_text(ctx.statement, "ver", "tpm attStmt")?;
    if version != "2.0" {
        return Err(Fido2Error::parse(format!("Unsupported TPM version {version}")));
    }
    ctx.reject_ecdaa()?;
    let alg = ctx.algorithm()?;
    let sig = ctx.signature()?;
    let cert_info_bytes = required_bytes(ctx.statement, "certInfo", "tpm attStmt")?;
    let pub_area_bytes = required_bytes(ctx.statement, "pubArea", "tpm attStmt")?;

    let pub_area = PubArea::parse(pub_area_bytes)?;
    if !pub_area.matches_credential(&ctx.credential.credential_public_key.parameters) {
        return Err(Fido2Error::signature(
            "pubArea key does not match the credential public key",
        ));
    }

    let cert_info = CertInfo::parse(cert_info_bytes)?;
    let Some(hash) = alg.hash() else {
        return Err(Fido2Error::signature(format!(
            "Algorithm {alg} cannot be used for TPM attestation"
        )));
    };
    if cert_info.extra_data != hash.digest(&ctx.signed_data()) {
        return Err(Fido2Error::signature(
            "certInfo extraData does not match the attested data",
        ));
    }
    cert_info.check_name(pub_area_bytes)?;

    let Some(chain) = certificate::certificate_chain(ctx.statement)? else {
        return Err(Fido2Error::parse("tpm attStmt is missing x5c"));
    };
    let aik = &chain[0];
    aik.verify(alg, cert_info_bytes, sig)?;
    check_aik_certificate(aik, ctx.credential.aaguid.as_bytes())?;

    Ok(AttestationTrust::Basic {
        x5c: certificate::chain_der(&chain),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ecc_pub_area(x: &[u8], y: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&TPM_ALG_ECC.to_be_bytes());
        out.extend_from_slice(&0x000bu16.to_be_bytes());
        out.extend_from_slice(&0x0006_0472u32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        out.extend_from_slice(&TPM_ECC_NIST_P256.to_be_bytes());
        out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        for coord in [x, y] {
            out.extend_from_slice(&u16::try_from(coord.len()).unwrap().to_be_bytes());
            out.extend_from_slice(coord);
        }
        out
    }

    #[test]
    fn test_pub_area_matches_ec2_key() {
        let bytes = ecc_pub_area(&[1; 32], &[2; 32]);
        let pub_area = PubArea::parse(&bytes).unwrap();
        let credential = CoseKeyParameters::Ec2 {
            curve: EcCurve::P256,
            x: vec![1; 32],
            y: vec![2; 32],
        };
        assert!(pub_area.matches_credential(&credential));

        let other = CoseKeyParameters::Ec2 {
            curve: EcCurve::P256,
            x: vec![1; 32],
            y: vec![3; 32],
        };
        assert!(!pub_area.matches_credential(&other));
    }

    #[test]
    fn test_rsa_default_exponent() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&TPM_ALG_RSA.to_be_bytes());
        bytes.extend_from_slice(&0x000bu16.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        bytes.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        bytes.extend_from_slice(&2048u16.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(&[0xc0, 0xff, 0xee, 0x01]);

        let pub_area = PubArea::parse(&bytes).unwrap();
        let credential = CoseKeyParameters::Rsa {
            n: vec![0xc0, 0xff, 0xee, 0x01],
            e: vec![0x01, 0x00, 0x01],
        };
        assert!(pub_area.matches_credential(&credential));

        let padded = CoseKeyParameters::Rsa {
            n: vec![0xc0, 0xff, 0xee, 0x01],
            e: vec![0x00, 0x01, 0x00, 0x01],
        };
        assert!(pub_area.matches_credential(&padded));
    }

    #[test]
    fn test_rsa_exponent_longer_than_eight_bytes() {
        let pub_area = PubArea {
            key: TpmPublicKey::Rsa {
                modulus: vec![0xc0, 0xff, 0xee, 0x01],
                exponent: vec![0x01, 0x00, 0x01],
            },
        };
        // Low 64 bits equal 65537
        let mut e = vec![0x07, 0, 0, 0, 0, 0, 0];
        e.extend_from_slice(&[0x01, 0x00, 0x01]);
        let credential = CoseKeyParameters::Rsa {
            n: vec![0xc0, 0xff, 0xee, 0x01],
            e,
        };
        assert!(!pub_area.matches_credential(&credential));
    }

    #[test]
    fn test_cert_info_rejects_bad_magic() {
        let mut bytes = 0xdead_beefu32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&TPM_ST_ATTEST_CERTIFY.to_be_bytes());
        assert!(matches!(
            CertInfo::parse(&bytes),
            Err(Fido2Error::SignatureVerification(_))
        ));
        assert!(matches!(
            CertInfo::parse(&[0xff, 0x54]),
            Err(Fido2Error::ParseError(_))
        ));
    }
}
