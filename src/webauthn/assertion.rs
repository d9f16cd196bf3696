//! `WebAuthn` assertion verification
//!
//! An assertion is checked against the public key the caller stored at
//! registration, never against key material in the request. The signature
//! covers `authenticatorData || sha256(clientDataJSON)`.

use openssl::pkey::{PKey, Public};

use super::attestation::note_authenticator_info;
use super::audit::AuditBuilder;
use super::authenticator_data::AuthenticatorData;
use super::client_data::{resolve_rp_id, Ceremony, ClientData};
use super::cose::{CoseAlgorithm, CoseKey};
use super::crypto::{self, sha256};
use super::encoding::{resolve_credential_id, BinaryInput};
use super::errors::Fido2Error;
use super::types::{
    check_credential_type, AssertionRequest, ExpectedAssertion, Fido2AssertionResult,
    ResolvedExpectations, StoredPublicKey,
};

/// Checks every successful authentication must have passed
const REQUIRED_CHECKS: [&str; 10] = [
    "rawId",
    "type",
    "challenge",
    "origin",
    "tokenBinding",
    "rpIdHash",
    "flags",
    "signature",
    "userHandle",
    "counter",
];

/// The stored key, ready to verify with
enum VerificationKey {
    Cose(CoseKey),
    Pem {
        key: PKey<Public>,
        algorithm: CoseAlgorithm,
    },
}

impl VerificationKey {
    fn load(stored: &StoredPublicKey) -> Result<Self, Fido2Error> {
        match stored {
            StoredPublicKey::Cose(bytes) => Ok(Self::Cose(CoseKey::from_bytes(&bytes.to_bytes()?)?)),
            StoredPublicKey::Pem(pem) => {
                let key = PKey::public_key_from_pem(pem.as_bytes())
                    .map_err(|e| Fido2Error::parse(format!("Invalid PEM public key: {e}")))?;
                let algorithm = crypto::algorithm_for_key(&key)?;
                Ok(Self::Pem { key, algorithm })
            }
        }
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), Fido2Error> {
        match self {
            Self::Cose(key) => key.verify(data, signature),
            Self::Pem { key, algorithm } => {
                crypto::verify_with_key(*algorithm, key, data, signature)
            }
        }
    }
}

/// Null and empty user handles both mean "none"
fn normalize_user_handle(handle: Option<&BinaryInput>) -> Result<Option<Vec<u8>>, Fido2Error> {
    match handle {
        Some(input) if !input.is_empty() => {
            let bytes = input.to_bytes()?;
            Ok((!bytes.is_empty()).then_some(bytes))
        }
        _ => Ok(None),
    }
}

/// Enforce the signature counter rule
///
/// # Errors
/// Returns `CounterRegression` unless `received > previous` or both are zero
pub(crate) fn check_counter(
    previous: u32,
    received: u32,
    audit: &mut AuditBuilder,
) -> Result<(), Fido2Error> {
    if previous == 0 && received == 0 {
        audit.info("counter", "authenticator does not implement a signature counter");
    } else if received <= previous {
        log::warn!(
            "🚨 Signature counter regression ({previous} -> {received}): credential may be cloned"
        );
        return Err(Fido2Error::CounterRegression { previous, received });
    }
    audit.pass("counter");
    Ok(())
}

/// Verify an authentication response
///
/// # Arguments
/// * `request` - The credential returned by `navigator.credentials.get()`
/// * `expected` - Challenge, origin, factor, stored key and counter, and
///   optional user handle, allowed credentials and RP ID
///
/// # Errors
/// Returns the first check that fails; no partial result is produced
pub(crate) fn verify_assertion(
    request: &AssertionRequest,
    expected: &ExpectedAssertion,
) -> Result<Fido2AssertionResult, Fido2Error> {
    let mut audit = AuditBuilder::new();

    let challenge = expected.challenge.to_bytes()?;
    let rp_id = resolve_rp_id(expected.rp_id.as_deref(), &expected.origin)?;
    let expected_user_handle = normalize_user_handle(expected.user_handle.as_ref())?;
    let key = VerificationKey::load(&expected.public_key)?;
    audit.expectations_validated();

    check_credential_type(request.r#type.as_deref())?;
    let credential_id = resolve_credential_id(request.raw_id.as_ref(), request.id.as_ref())?;
    audit.pass("rawId");

    if let Some(allowed) = &expected.allow_credentials {
        if !allowed.iter().any(|descriptor| descriptor.id == credential_id) {
            return Err(Fido2Error::mismatch(
                "Credential is not in the allowCredentials list",
            ));
        }
        audit.pass("allowCredentials");
    }

    let client_data_bytes = request.response.client_data_json.to_bytes()?;
    let client_data = ClientData::parse(&client_data_bytes)?;
    client_data.validate(Ceremony::Get, &challenge, &expected.origin, &mut audit)?;

    let auth_data_bytes = request.response.authenticator_data.to_bytes()?;
    let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
    if auth_data.attested_credential_data.is_some() {
        return Err(Fido2Error::parse(
            "Assertion authenticator data must not carry attested credential data",
        ));
    }
    auth_data.verify_rp_id_hash(&rp_id)?;
    audit.pass("rpIdHash");
    expected.factor.check(auth_data.flags)?;
    audit.pass("flags");
    note_authenticator_info(&auth_data, &mut audit);

    let mut signed = auth_data_bytes;
    signed.extend_from_slice(&sha256(&client_data_bytes));
    key.verify(&signed, &request.response.signature.to_bytes()?)?;
    audit.pass("signature");

    let user_handle = normalize_user_handle(request.response.user_handle.as_ref())?;
    match (&user_handle, &expected_user_handle) {
        (Some(received), Some(wanted)) if received == wanted => {}
        (Some(_), Some(_)) => {
            return Err(Fido2Error::mismatch("userHandle does not match"));
        }
        (Some(_), None) => {
            return Err(Fido2Error::mismatch(
                "userHandle returned but none was expected",
            ));
        }
        (None, Some(_)) => audit.info("userHandle", "authenticator returned no userHandle"),
        (None, None) => {}
    }
    audit.pass("userHandle");

    check_counter(expected.prev_counter, auth_data.counter, &mut audit)?;

    audit.request_validated();
    let mut required = REQUIRED_CHECKS.to_vec();
    if expected.allow_credentials.is_some() {
        required.push("allowCredentials");
    }
    let audit = audit.finish(&required)?;
    log::debug!("Assertion verified, counter {}", auth_data.counter);

    Ok(Fido2AssertionResult {
        authenticator_data: auth_data,
        client_data,
        expectations: ResolvedExpectations {
            challenge,
            origin: expected.origin.clone(),
            factor: expected.factor,
            rp_id,
            prev_counter: Some(expected.prev_counter),
            user_handle: expected_user_handle,
        },
        request: request.clone(),
        audit,
        credential_id,
        user_handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_rules() {
        let mut audit = AuditBuilder::new();
        check_counter(0, 0, &mut audit).unwrap();
        check_counter(5, 6, &mut audit).unwrap();
        assert_eq!(
            check_counter(5, 5, &mut audit),
            Err(Fido2Error::CounterRegression {
                previous: 5,
                received: 5
            })
        );
        assert!(check_counter(5, 4, &mut audit).is_err());
        assert!(check_counter(5, 0, &mut audit).is_err());
    }

    #[test]
    fn test_empty_user_handle_is_none() {
        assert_eq!(normalize_user_handle(None).unwrap(), None);
        assert_eq!(normalize_user_handle(Some(&BinaryInput::from(""))).unwrap(), None);
        assert_eq!(normalize_user_handle(Some(&BinaryInput::Raw(Vec::new()))).unwrap(), None);
        assert_eq!(
            normalize_user_handle(Some(&BinaryInput::from("AQID"))).unwrap(),
            Some(vec![1, 2, 3])
        );
    }
}
