//! `packed` attestation
//!
//! With `x5c` the statement is signed by an attestation certificate (basic
//! attestation); without it the credential key signs its own registration.

use openssl::nid::Nid;

use super::certificate::{self, AttestationCertificate};
use super::{AttestationTrust, StatementContext};
use crate::webauthn::audit::AuditBuilder;
use crate::webauthn::errors::Fido2Error;

const ATTESTATION_OU: &str = "Authenticator Attestation";

/// Requirements on a packed attestation certificate
fn check_certificate(cert: &AttestationCertificate, aaguid: &[u8; 16]) -> Result<(), Fido2Error> {
    if cert.version() != 3 {
        return Err(Fido2Error::signature(
            "Packed attestation certificate must be X.509 v3",
        ));
    }
    if cert.subject_entry(Nid::ORGANIZATIONALUNITNAME).as_deref() != Some(ATTESTATION_OU) {
        return Err(Fido2Error::signature(format!(
            "Packed attestation certificate subject OU must be \"{ATTESTATION_OU}\""
        )));
    }
    for (nid, field) in [
        (Nid::COUNTRYNAME, "C"),
        (Nid::ORGANIZATIONNAME, "O"),
        (Nid::COMMONNAME, "CN"),
    ] {
        let present = cert.subject_entry(nid).is_some_and(|value| !value.is_empty());
        if !present {
            return Err(Fido2Error::signature(format!(
                "Packed attestation certificate subject is missing {field}"
            )));
        }
    }
    if cert.is_ca()? {
        return Err(Fido2Error::signature(
            "Packed attestation certificate must not be a CA",
        ));
    }
    cert.check_aaguid(aaguid)
}

pub(super) fn verify(
    ctx: &StatementContext<'_>,
    audit: &mut AuditBuilder,
) -> Result<AttestationTrust, Fido2Error> {
    ctx.reject_ecdaa()?;
    let alg = ctx.algorithm()?;
    let sig = ctx.signature()?;
    let signed = ctx.signed_data();

    if let Some(chain) = certificate::certificate_chain(ctx.statement)? {
        let leaf = &chain[0];
        leaf.verify(alg, &signed, sig)?;
        check_certificate(leaf, ctx.credential.aaguid.as_bytes())?;
        audit.info("attestation-type", "basic");
        return Ok(AttestationTrust::Basic {
            x5c: certificate::chain_der(&chain),
        });
    }

    let key = &ctx.credential.credential_public_key;
    if key.algorithm != alg {
        return Err(Fido2Error::signature(format!(
            "Self attestation alg {alg} does not match credential key alg {}",
            key.algorithm
        )));
    }
    key.verify(&signed, sig)?;
    audit.info("attestation-type", "self");
    Ok(AttestationTrust::SelfAttestation)
}
