//! FIDO2 error types
//!
//! Every verification step terminates the call with one of these errors.
//! There is no partial result: callers never inspect a result object to find
//! out whether a ceremony failed.

use thiserror::Error;

/// Errors that can occur while generating options or verifying a ceremony
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fido2Error {
    /// Malformed binary or JSON input (truncated authenticator data, bad CBOR, bad base64, ...)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The response does not match what the relying party expected
    /// (challenge, origin, type, RP ID, user handle, factor, allowed credentials)
    #[error("Expectation mismatch: {0}")]
    ExpectationMismatch(String),

    /// A cryptographic check failed
    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    /// The signature counter did not increase; the authenticator may have been cloned
    #[error("Signature counter regression: stored {previous}, received {received}")]
    CounterRegression {
        /// Counter value the caller had stored for the credential
        previous: u32,
        /// Counter value reported by the authenticator
        received: u32,
    },

    /// Attestation statement format not implemented or not allowed by policy
    #[error("Unsupported attestation format: {0}")]
    UnsupportedFormat(String),

    /// Invalid relying-party settings
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Randomness or crypto backend failure
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Fido2Error {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        Self::ExpectationMismatch(msg.into())
    }

    pub(crate) fn signature(msg: impl Into<String>) -> Self {
        Self::SignatureVerification(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
