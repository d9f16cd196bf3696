//! `WebAuthn` attestation processing
//!
//! Attestation statement formats form a closed set. Each variant carries its
//! own verification routine; a format name outside the set is kept as
//! [`AttestationFormat::Unsupported`] so the caller's policy can decide between
//! rejecting it and tolerating it as `none`.

mod android_key;
mod android_safetynet;
mod apple;
mod certificate;
mod fido_u2f;
mod none;
mod packed;
mod tpm;

use std::fmt;

use serde::{Serialize, Serializer};

use super::audit::AuditBuilder;
use super::authenticator_data::{AttestedCredentialData, AuthenticatorData};
use super::cbor::{required_bytes, required_int, text_entry, AttestationObject, CborMap};
use super::client_data::{resolve_rp_id, Ceremony, ClientData};
use super::cose::CoseAlgorithm;
use super::crypto::sha256;
use super::encoding::resolve_credential_id;
use super::errors::Fido2Error;
use super::types::{
    check_credential_type, AttestationRequest, ExpectedAttestation, Fido2AttestationResult,
    RegisteredCredential, ResolvedExpectations,
};

/// Checks every successful registration must have passed
const REQUIRED_CHECKS: [&str; 13] = [
    "rawId",
    "type",
    "challenge",
    "origin",
    "tokenBinding",
    "rpIdHash",
    "flags",
    "counter",
    "credId",
    "credentialPublicKey",
    "aaguid",
    "fmt",
    "attStmt",
];

/// Attestation statement format
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttestationFormat {
    None,
    Packed,
    FidoU2f,
    Tpm,
    AndroidKey,
    AndroidSafetyNet,
    Apple,
    /// A format identifier this crate does not implement
    Unsupported(String),
}

impl AttestationFormat {
    /// Every implemented format
    pub const SUPPORTED: [Self; 7] = [
        Self::None,
        Self::Packed,
        Self::FidoU2f,
        Self::Tpm,
        Self::AndroidKey,
        Self::AndroidSafetyNet,
        Self::Apple,
    ];

    /// Look up a format by its registered identifier
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "none" => Self::None,
            "packed" => Self::Packed,
            "fido-u2f" => Self::FidoU2f,
            "tpm" => Self::Tpm,
            "android-key" => Self::AndroidKey,
            "android-safetynet" => Self::AndroidSafetyNet,
            "apple" => Self::Apple,
            other => Self::Unsupported(other.to_string()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Packed => "packed",
            Self::FidoU2f => "fido-u2f",
            Self::Tpm => "tpm",
            Self::AndroidKey => "android-key",
            Self::AndroidSafetyNet => "android-safetynet",
            Self::Apple => "apple",
            Self::Unsupported(name) => name,
        }
    }

    #[must_use]
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for AttestationFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// What the attestation statement proves about the credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AttestationTrust {
    /// No statement was verified
    None,
    /// Signed by the credential key itself
    #[serde(rename = "self")]
    SelfAttestation,
    /// Signed by an attestation certificate
    Basic {
        #[serde(serialize_with = "serialize_chain")]
        x5c: Vec<Vec<u8>>,
    },
    /// Signed by an anonymizing CA certificate issued per credential
    AnonCa {
        #[serde(serialize_with = "serialize_chain")]
        x5c: Vec<Vec<u8>>,
    },
}

fn serialize_chain<S: Serializer>(chain: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(chain.iter().map(|der| super::encoding::encode_base64url(der)))
}

/// Everything a statement verifier may look at
pub(crate) struct StatementContext<'a> {
    pub statement: &'a CborMap,
    pub auth_data: &'a AuthenticatorData,
    pub auth_data_bytes: &'a [u8],
    pub client_data_hash: &'a [u8; 32],
    pub credential: &'a AttestedCredentialData,
}

impl StatementContext<'_> {
    /// `authenticatorData || clientDataHash`, signed by most formats
    pub(crate) fn signed_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.auth_data_bytes.len() + 32);
        data.extend_from_slice(self.auth_data_bytes);
        data.extend_from_slice(self.client_data_hash);
        data
    }

    pub(crate) fn algorithm(&self) -> Result<CoseAlgorithm, Fido2Error> {
        CoseAlgorithm::try_from(required_int(self.statement, "alg", "attStmt")?)
    }

    pub(crate) fn signature(&self) -> Result<&[u8], Fido2Error> {
        required_bytes(self.statement, "sig", "attStmt")
    }

    pub(crate) fn reject_ecdaa(&self) -> Result<(), Fido2Error> {
        if text_entry(self.statement, "ecdaaKeyId").is_some() {
            return Err(Fido2Error::UnsupportedFormat(
                "ECDAA attestation is not supported".to_string(),
            ));
        }
        Ok(())
    }
}

/// Run the statement verifier for `format`
///
/// # Errors
/// `UnsupportedFormat` for an unimplemented format, otherwise whatever the
/// format's verification reports
pub(crate) fn verify_statement(
    format: &AttestationFormat,
    ctx: &StatementContext<'_>,
    audit: &mut AuditBuilder,
) -> Result<AttestationTrust, Fido2Error> {
    log::debug!("Verifying {format} attestation statement");
    let trust = match format {
        AttestationFormat::None => none::verify(ctx, audit),
        AttestationFormat::Packed => packed::verify(ctx, audit),
        AttestationFormat::FidoU2f => fido_u2f::verify(ctx),
        AttestationFormat::Tpm => tpm::verify(ctx),
        AttestationFormat::AndroidKey => android_key::verify(ctx),
        AttestationFormat::AndroidSafetyNet => android_safetynet::verify(ctx, audit),
        AttestationFormat::Apple => apple::verify(ctx),
        AttestationFormat::Unsupported(name) => {
            Err(Fido2Error::UnsupportedFormat(name.clone()))
        }
    }?;
    audit.pass("attStmt");
    Ok(trust)
}

/// Which statement formats the relying party accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationPolicy {
    pub allowed_formats: Vec<AttestationFormat>,
    /// Treat unimplemented formats as `none` instead of rejecting them
    pub tolerate_unsupported: bool,
}

impl Default for AttestationPolicy {
    fn default() -> Self {
        Self {
            allowed_formats: AttestationFormat::SUPPORTED.to_vec(),
            tolerate_unsupported: false,
        }
    }
}

/// Record backup and extension facts that do not affect the outcome
pub(crate) fn note_authenticator_info(auth_data: &AuthenticatorData, audit: &mut AuditBuilder) {
    if auth_data.flags.backup_eligible() {
        let state = if auth_data.flags.backed_up() {
            "backed up"
        } else {
            "not backed up"
        };
        audit.info("backup", format!("backup eligible, {state}"));
    }
    if let Some(extensions) = &auth_data.extensions {
        let names: Vec<&str> = extensions.keys().map(String::as_str).collect();
        audit.info("extensions", names.join(", "));
    }
}

/// Verify a registration response
///
/// # Arguments
/// * `request` - The credential returned by `navigator.credentials.create()`
/// * `expected` - Challenge, origin, factor and optional RP ID
/// * `policy` - Accepted attestation formats
///
/// # Errors
/// Returns the first check that fails; no partial result is produced
pub(crate) fn verify_attestation(
    request: &AttestationRequest,
    expected: &ExpectedAttestation,
    policy: &AttestationPolicy,
) -> Result<Fido2AttestationResult, Fido2Error> {
    let mut audit = AuditBuilder::new();

    let challenge = expected.challenge.to_bytes()?;
    let rp_id = resolve_rp_id(expected.rp_id.as_deref(), &expected.origin)?;
    audit.expectations_validated();

    check_credential_type(request.r#type.as_deref())?;
    let credential_id = resolve_credential_id(request.raw_id.as_ref(), request.id.as_ref())?;
    audit.pass("rawId");

    let client_data_bytes = request.response.client_data_json.to_bytes()?;
    let client_data = ClientData::parse(&client_data_bytes)?;
    client_data.validate(Ceremony::Create, &challenge, &expected.origin, &mut audit)?;

    let object = AttestationObject::parse(&request.response.attestation_object.to_bytes()?)?;
    let auth_data = AuthenticatorData::parse(&object.auth_data)?;
    let Some(credential) = &auth_data.attested_credential_data else {
        return Err(Fido2Error::parse(
            "Registration authenticator data has no attested credential data",
        ));
    };

    auth_data.verify_rp_id_hash(&rp_id)?;
    audit.pass("rpIdHash");
    expected.factor.check(auth_data.flags)?;
    audit.pass("flags");
    audit.pass("counter");
    note_authenticator_info(&auth_data, &mut audit);

    if credential.credential_id != credential_id {
        return Err(Fido2Error::mismatch(
            "rawId does not match the credential ID in authenticator data",
        ));
    }
    audit.pass("credId");
    audit.pass("credentialPublicKey");
    audit.pass("aaguid");

    let format = AttestationFormat::from_name(&object.format);
    let client_data_hash = sha256(&client_data_bytes);
    let ctx = StatementContext {
        statement: &object.statement,
        auth_data: &auth_data,
        auth_data_bytes: &object.auth_data,
        client_data_hash: &client_data_hash,
        credential,
    };
    let trust = if !format.is_supported() && policy.tolerate_unsupported {
        audit.warn(
            "fmt",
            format!("unsupported attestation format {format} treated as none"),
        );
        audit.pass("fmt");
        audit.pass("attStmt");
        AttestationTrust::None
    } else {
        if format.is_supported() && !policy.allowed_formats.contains(&format) {
            return Err(Fido2Error::UnsupportedFormat(format!(
                "{format} is not an allowed attestation format"
            )));
        }
        audit.pass("fmt");
        verify_statement(&format, &ctx, &mut audit)?
    };

    audit.request_validated();
    let audit = audit.finish(&REQUIRED_CHECKS)?;

    let registered = RegisteredCredential {
        id: credential_id,
        public_key: credential.credential_public_key.clone(),
        public_key_cose: credential.public_key_bytes.clone(),
        public_key_pem: credential.credential_public_key.to_pem()?,
        aaguid: credential.aaguid,
        counter: auth_data.counter,
        transports: request.transports.clone(),
    };
    log::info!(
        "✅ Registration verified: format {format}, credential algorithm {}",
        registered.public_key.algorithm
    );

    Ok(Fido2AttestationResult {
        authenticator_data: auth_data.clone(),
        client_data,
        expectations: ResolvedExpectations {
            challenge,
            origin: expected.origin.clone(),
            factor: expected.factor,
            rp_id,
            prev_counter: None,
            user_handle: None,
        },
        request: request.clone(),
        audit,
        format,
        attestation_trust: trust,
        credential: registered,
    })
}
