//! `fido-u2f` attestation
//!
//! Signed data: `0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F`,
//! where `publicKeyU2F` is the uncompressed P-256 point of the credential key.

use openssl::nid::Nid;
use openssl::pkey::Id;

use super::certificate;
use super::{AttestationTrust, StatementContext};
use crate::webauthn::cose::CoseAlgorithm;
use crate::webauthn::errors::Fido2Error;

pub(super) fn verify(ctx: &StatementContext<'_>) -> Result<AttestationTrust, Fido2Error> {
    let sig = ctx.signature()?;
    let Some(chain) = certificate::certificate_chain(ctx.statement)? else {
        return Err(Fido2Error::parse("fido-u2f attStmt is missing x5c"));
    };
    if chain.len() != 1 {
        return Err(Fido2Error::signature(format!(
            "fido-u2f x5c must hold exactly one certificate, found {}",
            chain.len()
        )));
    }

    let cert_key = chain[0].public_key()?;
    let on_p256 = cert_key.id() == Id::EC
        && cert_key
            .ec_key()
            .ok()
            .and_then(|ec| ec.group().curve_name())
            == Some(Nid::X9_62_PRIME256V1);
    if !on_p256 {
        return Err(Fido2Error::signature(
            "fido-u2f attestation certificate key must be P-256",
        ));
    }

    let point = ctx.credential.credential_public_key.x962_point()?;
    let mut signed = Vec::with_capacity(1 + 32 + 32 + ctx.credential.credential_id.len() + 65);
    signed.push(0x00);
    signed.extend_from_slice(&ctx.auth_data.rp_id_hash);
    signed.extend_from_slice(ctx.client_data_hash);
    signed.extend_from_slice(&ctx.credential.credential_id);
    signed.extend_from_slice(&point);

    chain[0].verify(CoseAlgorithm::ES256, &signed, sig)?;
    Ok(AttestationTrust::Basic {
        x5c: certificate::chain_der(&chain),
    })
}
