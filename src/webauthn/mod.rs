//! `WebAuthn` implementation
//!
//! This module provides the FIDO2 relying-party verification engine,
//! independent of any transport, session or credential storage. Options are
//! generated and responses verified through [`Fido2Service`]; the codec and
//! verification layers underneath are pure functions of their inputs.

mod assertion;
mod attestation;
mod audit;
mod authenticator_data;
mod bytes;
mod cbor;
mod challenge;
mod client_data;
mod cose;
mod crypto;
mod encoding;
mod errors;
mod extensions;
mod service;
mod types;

// Re-exports for public use
pub use attestation::{AttestationFormat, AttestationPolicy, AttestationTrust};
pub use audit::Audit;
pub use authenticator_data::{AttestedCredentialData, AuthenticatorData, AuthenticatorFlags};
pub use challenge::{bound_challenge, generate_challenge, GeneratedChallenge};
pub use client_data::{canonical_origin, Ceremony, ClientData, TokenBinding, TokenBindingStatus};
pub use cose::{CoseAlgorithm, CoseKey, CoseKeyParameters, EcCurve};
pub use encoding::{decode_base64, encode_base64url, BinaryInput};
pub use errors::Fido2Error;
pub use extensions::{AuthenticatorExtension, ExtensionInput, LargeBlobInput};
pub use service::{generate_user_handle, Fido2Service};
pub use types::*;

#[cfg(any(test, feature = "testing"))]
pub(crate) use {
    cbor::encode_value,
    crypto::{random_bytes, sha256},
};
