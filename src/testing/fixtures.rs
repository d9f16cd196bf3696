//! Test fixtures providing pre-built test objects
//!
//! Settings, a ready service and the expectation objects the ceremonies are
//! verified against, so individual tests only spell out what they change.

use super::authenticator::SoftAuthenticator;
use super::constants::{TEST_ORIGIN, TEST_RP_ID, TEST_RP_NAME, TEST_USER_NAME};
use crate::settings::RelyingPartySettings;
use crate::webauthn::{
    AttestationOptionsInput, BinaryInput, ExpectedAssertion, ExpectedAttestation, Factor,
    Fido2Service, StoredPublicKey, UserEntity,
};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Relying party settings for `example.org` with 32-byte challenges
    #[must_use]
    pub fn settings() -> RelyingPartySettings {
        RelyingPartySettings {
            rp_id: TEST_RP_ID.to_string(),
            rp_name: TEST_RP_NAME.to_string(),
            rp_origin: TEST_ORIGIN.to_string(),
            challenge_size: 32,
            ..RelyingPartySettings::default()
        }
    }

    #[must_use]
    pub fn service() -> Fido2Service {
        Fido2Service::new(Self::settings()).expect("test settings are valid")
    }

    /// A service that verifies unsupported formats as `none`
    #[must_use]
    pub fn tolerant_service() -> Fido2Service {
        Fido2Service::new(RelyingPartySettings {
            tolerate_unsupported_formats: true,
            ..Self::settings()
        })
        .expect("test settings are valid")
    }

    #[must_use]
    pub fn user() -> UserEntity {
        UserEntity {
            id: b"user-handle-0001".to_vec(),
            name: TEST_USER_NAME.to_string(),
            display_name: "Test User".to_string(),
        }
    }

    #[must_use]
    pub fn attestation_options_input() -> AttestationOptionsInput {
        AttestationOptionsInput::new(Self::user())
    }

    #[must_use]
    pub fn expected_attestation(challenge: &[u8]) -> ExpectedAttestation {
        ExpectedAttestation {
            challenge: BinaryInput::Raw(challenge.to_vec()),
            origin: TEST_ORIGIN.to_string(),
            factor: Factor::Either,
            rp_id: None,
        }
    }

    /// Expectations for an assertion from `authenticator`, keyed by its COSE key
    #[must_use]
    pub fn expected_assertion(
        challenge: &[u8],
        authenticator: &SoftAuthenticator,
        prev_counter: u32,
    ) -> ExpectedAssertion {
        let public_key = authenticator.cose_key().to_bytes().expect("COSE key encodes");
        ExpectedAssertion {
            challenge: BinaryInput::Raw(challenge.to_vec()),
            origin: TEST_ORIGIN.to_string(),
            factor: Factor::Either,
            public_key: StoredPublicKey::Cose(BinaryInput::Raw(public_key)),
            prev_counter,
            user_handle: None,
            allow_credentials: None,
            rp_id: None,
        }
    }
}
