//! `android-safetynet` attestation
//!
//! The statement carries a SafetyNet JWS. Its payload nonce binds the
//! registration, and its certificate must be issued to `attest.android.com`.

use chrono::Utc;
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::nid::Nid;
use serde::Deserialize;

use super::certificate::{self, AttestationCertificate};
use super::{AttestationTrust, StatementContext};
use crate::webauthn::audit::AuditBuilder;
use crate::webauthn::cbor::{required_bytes, required_text};
use crate::webauthn::cose::CoseAlgorithm;
use crate::webauthn::crypto::sha256;
use crate::webauthn::encoding::decode_base64;
use crate::webauthn::errors::Fido2Error;

const ATTEST_HOSTNAME: &str = "attest.android.com";
/// Allowed clock skew for a `timestampMs` ahead of now
const MAX_CLOCK_SKEW_MS: i64 = 60_000;
/// Oldest accepted `timestampMs`, relative to now
const MAX_RESPONSE_AGE_MS: i64 = 60_000;

#[derive(Debug, Deserialize)]
struct JwsHeader {
    alg: String,
    x5c: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetPayload {
    nonce: String,
    timestamp_ms: i64,
    #[serde(default)]
    cts_profile_match: bool,
    #[serde(default)]
    basic_integrity: bool,
    #[serde(default)]
    apk_package_name: Option<String>,
}

fn decode_json<T: for<'de> Deserialize<'de>>(segment: &str, what: &str) -> Result<T, Fido2Error> {
    let bytes = decode_base64(segment)?;
    serde_json::from_slice(&bytes).map_err(|e| Fido2Error::parse(format!("Invalid JWS {what}: {e}")))
}

/// JWS ECDSA signatures are fixed-width `r || s`; openssl wants DER
fn jws_signature(alg: CoseAlgorithm, signature: Vec<u8>) -> Result<Vec<u8>, Fido2Error> {
    if !alg.is_ecdsa() {
        return Ok(signature);
    }
    let half = signature.len() / 2;
    if half == 0 || half * 2 != signature.len() {
        return Err(Fido2Error::parse(format!(
            "JWS ECDSA signature has invalid length {}",
            signature.len()
        )));
    }
    let (r, s) = signature.split_at(half);
    BigNum::from_slice(r)
        .and_then(|r| BigNum::from_slice(s).map(|s| (r, s)))
        .and_then(|(r, s)| EcdsaSig::from_private_components(r, s))
        .and_then(|sig| sig.to_der())
        .map_err(|e| Fido2Error::parse(format!("Invalid JWS ECDSA signature: {e}")))
}

pub(super) fn verify(
    ctx: &StatementContext<'_>,
    audit: &mut AuditBuilder,
) -> Result<AttestationTrust, Fido2Error> {
    let version = required_text(ctx.statement, "ver", "android-safetynet attStmt")?;
    let response = required_bytes(ctx.statement, "response", "android-safetynet attStmt")?;
    let jws = std::str::from_utf8(response)
        .map_err(|_| Fido2Error::parse("SafetyNet response is not UTF-8"))?;

    let mut segments = jws.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(Fido2Error::parse("SafetyNet response is not a compact JWS"));
    };

    let header: JwsHeader = decode_json(header_b64, "header")?;
    let payload: SafetyNetPayload = decode_json(payload_b64, "payload")?;

    let expected_nonce = sha256(&ctx.signed_data());
    if decode_base64(&payload.nonce)? != expected_nonce {
        return Err(Fido2Error::signature("SafetyNet nonce does not match"));
    }
    if !payload.cts_profile_match {
        return Err(Fido2Error::signature("SafetyNet ctsProfileMatch is false"));
    }
    let now_ms = Utc::now().timestamp_millis();
    if payload.timestamp_ms > now_ms + MAX_CLOCK_SKEW_MS {
        return Err(Fido2Error::signature("SafetyNet timestamp is in the future"));
    }
    if payload.timestamp_ms < now_ms - MAX_RESPONSE_AGE_MS {
        return Err(Fido2Error::signature(format!(
            "SafetyNet response is older than {}s",
            MAX_RESPONSE_AGE_MS / 1000
        )));
    }

    let chain = header
        .x5c
        .iter()
        .map(|cert| decode_base64(cert).and_then(|der| AttestationCertificate::from_der(&der)))
        .collect::<Result<Vec<_>, _>>()?;
    let Some(leaf) = chain.first() else {
        return Err(Fido2Error::parse("SafetyNet JWS header has no x5c"));
    };
    certificate::verify_chain(&chain)?;
    if leaf.subject_entry(Nid::COMMONNAME).as_deref() != Some(ATTEST_HOSTNAME) {
        return Err(Fido2Error::signature(format!(
            "SafetyNet certificate is not issued to {ATTEST_HOSTNAME}"
        )));
    }

    let alg = CoseAlgorithm::ALL
        .into_iter()
        .find(|candidate| candidate.name() == header.alg)
        .ok_or_else(|| Fido2Error::parse(format!("Unsupported JWS alg {}", header.alg)))?;
    let signature = jws_signature(alg, decode_base64(signature_b64)?)?;
    let signing_input = format!("{header_b64}.{payload_b64}");
    leaf.verify(alg, signing_input.as_bytes(), &signature)?;

    audit.info("safetynet-version", version);
    if !payload.basic_integrity {
        audit.warn("safetynet-basic-integrity", "basicIntegrity is false");
    }
    if let Some(package) = payload.apk_package_name {
        audit.info("safetynet-apk", package);
    }

    Ok(AttestationTrust::Basic {
        x5c: certificate::chain_der(&chain),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jws_ecdsa_signature_conversion() {
        let raw = [vec![0x11u8; 32], vec![0x22u8; 32]].concat();
        let der = jws_signature(CoseAlgorithm::ES256, raw.clone()).unwrap();
        let sig = EcdsaSig::from_der(&der).unwrap();
        assert_eq!(sig.r().to_vec(), vec![0x11u8; 32]);
        assert_eq!(sig.s().to_vec(), vec![0x22u8; 32]);

        assert!(jws_signature(CoseAlgorithm::ES256, vec![0x11; 63]).is_err());
        assert_eq!(jws_signature(CoseAlgorithm::RS256, raw.clone()).unwrap(), raw);
    }
}
