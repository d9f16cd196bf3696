//! `android-key` attestation
//!
//! The leaf certificate holds the credential key itself and carries the
//! Android key attestation extension, whose `attestationChallenge` must be
//! the client data hash.

use der_parser::der::{
    parse_der_container, parse_der_enum, parse_der_integer, parse_der_octetstring, Header, Tag,
};
use der_parser::error::{BerError, BerResult};
use der_parser::{nom, Oid};

use super::certificate;
use super::{AttestationTrust, StatementContext};
use crate::webauthn::errors::Fido2Error;

const OID_ANDROID_KEY_DESCRIPTION: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);

/// `attestationChallenge` from a `KeyDescription` sequence
///
/// KeyDescription ::= SEQUENCE { attestationVersion INTEGER,
/// attestationSecurityLevel ENUMERATED, keymasterVersion INTEGER,
/// keymasterSecurityLevel ENUMERATED, attestationChallenge OCTET STRING, ... }
fn parse_attestation_challenge(i: &[u8]) -> BerResult<'_, Vec<u8>> {
    parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(nom::Err::Error(BerError::BerTypeError));
        }
        let (i, _) = parse_der_integer(i)?;
        let (i, _) = parse_der_enum(i)?;
        let (i, _) = parse_der_integer(i)?;
        let (i, _) = parse_der_enum(i)?;
        let (i, challenge) = parse_der_octetstring(i)?;
        // uniqueId and the authorization lists are not inspected
        Ok((i, challenge.as_slice()?.to_vec()))
    })(i)
}

fn attestation_challenge(key_description: &[u8]) -> Result<Vec<u8>, Fido2Error> {
    parse_attestation_challenge(key_description)
        .map(|(_, challenge)| challenge)
        .map_err(|e| Fido2Error::parse(format!("Invalid android key description: {e}")))
}

pub(super) fn verify(ctx: &StatementContext<'_>) -> Result<AttestationTrust, Fido2Error> {
    let alg = ctx.algorithm()?;
    let sig = ctx.signature()?;
    let Some(chain) = certificate::certificate_chain(ctx.statement)? else {
        return Err(Fido2Error::parse("android-key attStmt is missing x5c"));
    };
    let leaf = &chain[0];

    leaf.verify(alg, &ctx.signed_data(), sig)?;
    let leaf_key = leaf.public_key()?;
    if !ctx.credential.credential_public_key.matches(&leaf_key)? {
        return Err(Fido2Error::signature(
            "android-key certificate key does not match the credential public key",
        ));
    }

    let Some(extension) = leaf.extension(&OID_ANDROID_KEY_DESCRIPTION)? else {
        return Err(Fido2Error::signature(
            "android-key certificate lacks the key attestation extension",
        ));
    };
    if attestation_challenge(&extension.value)? != ctx.client_data_hash.as_slice() {
        return Err(Fido2Error::signature(
            "android-key attestationChallenge does not match clientDataHash",
        ));
    }

    Ok(AttestationTrust::Basic {
        x5c: certificate::chain_der(&chain),
    })
}
