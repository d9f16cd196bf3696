#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the fido2-rp library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod settings;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use settings::{Fido2Settings, RelyingPartySettings};
pub use webauthn::{
    AssertionOptionsInput, AssertionRequest, AttestationOptionsInput, AttestationRequest,
    ExpectedAssertion, ExpectedAttestation, Fido2AssertionResult, Fido2AttestationResult,
    Fido2Error, Fido2Service,
};
