//! `WebAuthn` service implementation
//!
//! This module provides the relying-party facade: it builds the options
//! objects for both ceremonies and verifies the responses against the
//! caller's expectations. The service holds only immutable settings, so one
//! instance can be shared across threads.

use super::assertion::verify_assertion;
use super::attestation::{verify_attestation, AttestationPolicy};
use super::challenge::generate_challenge;
use super::cose::CoseAlgorithm;
use super::crypto;
use super::errors::Fido2Error;
use super::extensions::build_extension_inputs;
use super::types::{
    AssertionOptionsInput, AssertionRequest, AttestationOptionsInput, AttestationRequest,
    AuthenticatorSelectionCriteria, ExpectedAssertion, ExpectedAttestation, Fido2AssertionResult,
    Fido2AttestationResult, PublicKeyCredentialCreationOptions, PublicKeyCredentialParameters,
    PublicKeyCredentialRequestOptions, RelyingPartyEntity,
};
use crate::settings::RelyingPartySettings;

/// Length of a generated user handle
const USER_HANDLE_LEN: usize = 32;

/// Generate a user handle using secure random data
///
/// # Errors
/// Returns `InternalError` if the random source fails
pub fn generate_user_handle() -> Result<Vec<u8>, Fido2Error> {
    crypto::random_bytes(USER_HANDLE_LEN)
}

/// Core `WebAuthn` relying-party service
#[derive(Debug, Clone)]
pub struct Fido2Service {
    settings: RelyingPartySettings,
    algorithms: Vec<CoseAlgorithm>,
    policy: AttestationPolicy,
}

impl Fido2Service {
    /// Create a new `Fido2Service` from validated settings
    ///
    /// # Errors
    /// Returns `ConfigurationError` if the settings do not validate
    pub fn new(settings: RelyingPartySettings) -> Result<Self, Fido2Error> {
        settings.validate()?;
        let algorithms = settings.algorithms()?;
        let policy = settings.attestation_policy()?;
        log::debug!(
            "Relying party {} ready: algorithms {:?}, formats {:?}",
            settings.rp_id,
            algorithms,
            policy.allowed_formats
        );
        Ok(Self {
            settings,
            algorithms,
            policy,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &RelyingPartySettings {
        &self.settings
    }

    #[must_use]
    pub fn attestation_policy(&self) -> &AttestationPolicy {
        &self.policy
    }

    fn relying_party(&self) -> RelyingPartyEntity {
        RelyingPartyEntity {
            id: self.settings.rp_id.clone(),
            name: self.settings.rp_name.clone(),
            icon: self.settings.rp_icon.clone(),
        }
    }

    /// Create registration options for a new credential
    ///
    /// # Arguments
    /// * `input` - The user entity plus optional extra data, excluded
    ///   credentials and extension overrides
    ///
    /// # Errors
    /// Returns `InternalError` if randomness is unavailable, or `ParseError`
    /// for a malformed extension value
    pub fn attestation_options(
        &self,
        input: AttestationOptionsInput,
    ) -> Result<PublicKeyCredentialCreationOptions, Fido2Error> {
        let generated =
            generate_challenge(self.settings.challenge_size, input.extra_data.as_deref())?;
        let extensions = build_extension_inputs(&self.settings.extensions, &input.extension_options)?;

        Ok(PublicKeyCredentialCreationOptions {
            rp: self.relying_party(),
            user: input.user,
            challenge: generated.challenge,
            pub_key_cred_params: self
                .algorithms
                .iter()
                .copied()
                .map(PublicKeyCredentialParameters::from)
                .collect(),
            timeout: self.settings.timeout_ms,
            attestation: self.settings.attestation,
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: self.settings.authenticator_attachment,
                require_resident_key: self.settings.require_resident_key,
                user_verification: self.settings.user_verification,
            },
            exclude_credentials: input.exclude_credentials,
            raw_challenge: generated.raw_challenge,
            extensions,
        })
    }

    /// Verify a registration response
    ///
    /// # Arguments
    /// * `request` - Credential returned by the client
    /// * `expected` - Challenge, origin, factor and optional RP ID
    ///
    /// # Errors
    /// Returns the first failed check; see [`Fido2Error`]
    pub fn attestation_result(
        &self,
        request: &AttestationRequest,
        expected: &ExpectedAttestation,
    ) -> Result<Fido2AttestationResult, Fido2Error> {
        verify_attestation(request, expected, &self.policy)
    }

    /// Create authentication options
    ///
    /// # Errors
    /// Returns `InternalError` if randomness is unavailable, or `ParseError`
    /// for a malformed extension value
    pub fn assertion_options(
        &self,
        input: AssertionOptionsInput,
    ) -> Result<PublicKeyCredentialRequestOptions, Fido2Error> {
        let generated =
            generate_challenge(self.settings.challenge_size, input.extra_data.as_deref())?;
        let extensions = build_extension_inputs(&self.settings.extensions, &input.extension_options)?;

        Ok(PublicKeyCredentialRequestOptions {
            challenge: generated.challenge,
            timeout: self.settings.timeout_ms,
            rp_id: self.settings.rp_id.clone(),
            user_verification: self.settings.user_verification,
            allow_credentials: input.allow_credentials,
            raw_challenge: generated.raw_challenge,
            extensions,
        })
    }

    /// Verify an authentication response against the stored credential
    ///
    /// # Arguments
    /// * `request` - Credential returned by the client
    /// * `expected` - Challenge, origin, factor, stored key, previous counter
    ///   and optional user handle, allow list and RP ID
    ///
    /// # Errors
    /// Returns the first failed check; a counter that did not increase is
    /// reported as `CounterRegression`
    pub fn assertion_result(
        &self,
        request: &AssertionRequest,
        expected: &ExpectedAssertion,
    ) -> Result<Fido2AssertionResult, Fido2Error> {
        verify_assertion(request, expected)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::webauthn::challenge::bound_challenge;
    use crate::webauthn::extensions::ExtensionInput;
    use crate::webauthn::types::{PublicKeyCredentialDescriptor, UserEntity};

    fn service() -> Fido2Service {
        Fido2Service::new(RelyingPartySettings {
            rp_id: "example.org".to_string(),
            rp_name: "Example".to_string(),
            challenge_size: 32,
            ..Default::default()
        })
        .unwrap()
    }

    fn user() -> UserEntity {
        UserEntity {
            id: vec![1, 2, 3, 4],
            name: "alice@example.org".to_string(),
            display_name: "Alice".to_string(),
        }
    }

    #[test]
    fn test_service_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fido2Service>();
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let result = Fido2Service::new(RelyingPartySettings {
            challenge_size: 8,
            ..Default::default()
        });
        assert!(matches!(result, Err(Fido2Error::ConfigurationError(_))));
    }

    #[test]
    fn test_attestation_options() {
        let options = service().attestation_options(AttestationOptionsInput::new(user())).unwrap();

        assert_eq!(options.challenge.len(), 32);
        assert!(options.raw_challenge.is_none());
        assert_eq!(options.rp.id, "example.org");
        assert_eq!(options.user.display_name, "Alice");
        let algs: Vec<i64> = options.pub_key_cred_params.iter().map(|p| p.alg.id()).collect();
        assert_eq!(algs, vec![-7, -257]);
        assert_eq!(options.timeout, 60_000);
        assert!(options.extensions.is_none());

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["pubKeyCredParams"][0], serde_json::json!({"type": "public-key", "alg": -7}));
        assert_eq!(json["attestation"], "direct");
        assert_eq!(json["authenticatorSelection"]["userVerification"], "preferred");
        assert!(json.get("excludeCredentials").is_none());
    }

    #[test]
    fn test_extra_data_binds_challenge() {
        let mut input = AttestationOptionsInput::new(user());
        input.extra_data = Some(b"transaction #42".to_vec());
        let options = service().attestation_options(input).unwrap();

        let raw = options.raw_challenge.unwrap();
        assert_eq!(raw.len(), 32);
        assert_eq!(options.challenge, bound_challenge(&raw, b"transaction #42").to_vec());
    }

    #[test]
    fn test_assertion_options() {
        let service = service();
        let options = service
            .assertion_options(AssertionOptionsInput {
                allow_credentials: Some(vec![PublicKeyCredentialDescriptor::new(vec![9, 9])]),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(options.rp_id, "example.org");
        assert_eq!(options.challenge.len(), 32);
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["allowCredentials"][0]["id"], "CQk");
        assert_eq!(json["allowCredentials"][0]["type"], "public-key");

        let other = service.assertion_options(AssertionOptionsInput::default()).unwrap();
        assert_ne!(options.challenge, other.challenge);
    }

    #[test]
    fn test_extension_overrides() {
        let mut defaults = BTreeMap::new();
        defaults.insert("credProps".to_string(), serde_json::json!(true));
        defaults.insert("uvm".to_string(), serde_json::json!(false));
        let service = Fido2Service::new(RelyingPartySettings {
            extensions: defaults,
            ..Default::default()
        })
        .unwrap();

        let mut input = AttestationOptionsInput::new(user());
        input
            .extension_options
            .insert("uvm".to_string(), serde_json::json!(true));
        let extensions = service.attestation_options(input).unwrap().extensions.unwrap();

        assert_eq!(extensions.len(), 1);
        assert_eq!(extensions["uvm"], ExtensionInput::Uvm(true));
        assert!(!extensions.contains_key("credProps"));

        let configured = service
            .attestation_options(AttestationOptionsInput::new(user()))
            .unwrap()
            .extensions
            .unwrap();
        assert_eq!(configured["credProps"], ExtensionInput::CredProps(true));
        assert_eq!(configured["uvm"], ExtensionInput::Uvm(false));
    }

    #[test]
    fn test_parallel_option_generation() {
        let service = Arc::new(service());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    service
                        .assertion_options(AssertionOptionsInput::default())
                        .unwrap()
                        .challenge
                })
            })
            .collect();

        let mut challenges: Vec<Vec<u8>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        challenges.sort();
        challenges.dedup();
        assert_eq!(challenges.len(), 8);
    }

    #[test]
    fn test_generate_user_handle() {
        let first = generate_user_handle().unwrap();
        assert_eq!(first.len(), USER_HANDLE_LEN);
        assert_ne!(first, generate_user_handle().unwrap());
    }
}
