//! `apple` anonymous attestation
//!
//! Apple issues a certificate per credential. Its nonce extension must equal
//! `sha256(authenticatorData || clientDataHash)` and its key must be the
//! credential key.

use der_parser::der::{
    parse_der_container, parse_der_octetstring, parse_der_tagged_explicit, Class, Header, Tag,
};
use der_parser::error::{BerError, BerResult};
use der_parser::{nom, Oid};

use super::certificate;
use super::{AttestationTrust, StatementContext};
use crate::webauthn::crypto::sha256;
use crate::webauthn::errors::Fido2Error;

const OID_APPLE_NONCE: Oid<'static> = der_parser::oid!(1.2.840 .113635 .100 .8 .2);

/// `SEQUENCE { [1] EXPLICIT OCTET STRING }`
fn parse_nonce(i: &[u8]) -> BerResult<'_, Vec<u8>> {
    parse_der_container(|i: &[u8], hdr: Header| {
        if hdr.tag() != Tag::Sequence {
            return Err(nom::Err::Error(BerError::BerTypeError));
        }
        let (i, tagged) = parse_der_tagged_explicit(1, parse_der_octetstring)(i)?;
        let (class, _, nonce) = tagged.as_tagged()?;
        if class != Class::ContextSpecific {
            return Err(nom::Err::Error(BerError::BerTypeError));
        }
        Ok((i, nonce.as_slice()?.to_vec()))
    })(i)
}

fn extension_nonce(value: &[u8]) -> Result<Vec<u8>, Fido2Error> {
    parse_nonce(value)
        .map(|(_, nonce)| nonce)
        .map_err(|e| Fido2Error::parse(format!("Invalid apple nonce extension: {e}")))
}

pub(super) fn verify(ctx: &StatementContext<'_>) -> Result<AttestationTrust, Fido2Error> {
    let Some(chain) = certificate::certificate_chain(ctx.statement)? else {
        return Err(Fido2Error::parse("apple attStmt is missing x5c"));
    };
    let leaf = &chain[0];

    let Some(extension) = leaf.extension(&OID_APPLE_NONCE)? else {
        return Err(Fido2Error::signature(
            "apple certificate lacks the nonce extension",
        ));
    };
    if extension_nonce(&extension.value)? != sha256(&ctx.signed_data()) {
        return Err(Fido2Error::signature("apple attestation nonce does not match"));
    }
    let leaf_key = leaf.public_key()?;
    if !ctx.credential.credential_public_key.matches(&leaf_key)? {
        return Err(Fido2Error::signature(
            "apple certificate key does not match the credential public key",
        ));
    }

    Ok(AttestationTrust::AnonCa {
        x5c: certificate::chain_der(&chain),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::certificates::apple_nonce_extension;
    use der_parser::asn1_rs::{OctetString, Sequence, ToDer};

    #[test]
    fn test_extension_nonce() {
        let nonce = [0x5a; 32];
        assert_eq!(
            extension_nonce(&apple_nonce_extension(&nonce)).unwrap(),
            nonce.to_vec()
        );

        let empty = Sequence::new(Vec::new().into()).to_der_vec().unwrap();
        assert!(extension_nonce(&empty).is_err());
        assert!(extension_nonce(&OctetString::new(&nonce).to_der_vec().unwrap()).is_err());
    }
}
