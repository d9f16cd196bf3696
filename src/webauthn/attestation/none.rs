//! `none` attestation: the authenticator makes no provenance claim

use super::{AttestationTrust, StatementContext};
use crate::webauthn::audit::AuditBuilder;
use crate::webauthn::errors::Fido2Error;

pub(super) fn verify(
    ctx: &StatementContext<'_>,
    audit: &mut AuditBuilder,
) -> Result<AttestationTrust, Fido2Error> {
    if !ctx.statement.is_empty() {
        return Err(Fido2Error::parse("none attestation must have an empty attStmt"));
    }
    audit.warn(
        "attestation-not-verified",
        "none attestation: authenticator provenance was not verified",
    );
    Ok(AttestationTrust::None)
}
