//! `WebAuthn` core types
//!
//! Options handed to the client, the credential payloads it sends back, the
//! caller's expectations for a ceremony and the results of a successful
//! verification.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attestation::{AttestationFormat, AttestationTrust};
use super::audit::Audit;
use super::authenticator_data::{AuthenticatorData, AuthenticatorFlags};
use super::client_data::ClientData;
use super::cose::{CoseAlgorithm, CoseKey};
use super::encoding::BinaryInput;
use super::errors::Fido2Error;
use super::extensions::ExtensionInput;

/// Credential type; `WebAuthn` defines only one
pub const PUBLIC_KEY_TYPE: &str = "public-key";

fn public_key_type() -> String {
    PUBLIC_KEY_TYPE.to_string()
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Fido2Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(Fido2Error::ConfigurationError(format!(
                        "Invalid {} value: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

/// Attestation conveyance preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    None,
    Indirect,
    #[default]
    Direct,
    Enterprise,
}

string_enum!(AttestationConveyance {
    None => "none",
    Indirect => "indirect",
    Direct => "direct",
    Enterprise => "enterprise",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticatorAttachment {
    #[serde(rename = "platform")]
    Platform,
    #[serde(rename = "cross-platform")]
    CrossPlatform,
}

string_enum!(AuthenticatorAttachment {
    Platform => "platform",
    CrossPlatform => "cross-platform",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

string_enum!(UserVerificationRequirement {
    Required => "required",
    Preferred => "preferred",
    Discouraged => "discouraged",
});

/// Required proof level for a ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Factor {
    /// User verification required (the credential is the first factor)
    First,
    /// User presence suffices (the credential backs up a password)
    Second,
    /// Presence or verification
    Either,
}

string_enum!(Factor {
    First => "first",
    Second => "second",
    Either => "either",
});

impl Factor {
    /// Check the UP/UV flags against this factor
    ///
    /// # Errors
    /// Returns `ExpectationMismatch` if the required flag is not set
    pub fn check(self, flags: AuthenticatorFlags) -> Result<(), Fido2Error> {
        let satisfied = match self {
            Self::First => flags.user_verified(),
            Self::Second => flags.user_present(),
            Self::Either => flags.user_present() || flags.user_verified(),
        };
        if satisfied {
            Ok(())
        } else {
            Err(Fido2Error::mismatch(format!(
                "Factor {self} not satisfied (UP={}, UV={})",
                flags.user_present(),
                flags.user_verified()
            )))
        }
    }
}

/// A credential's `type`, when sent, must be `public-key`
pub(crate) fn check_credential_type(kind: Option<&str>) -> Result<(), Fido2Error> {
    match kind {
        None | Some(PUBLIC_KEY_TYPE) => Ok(()),
        Some(other) => Err(Fido2Error::parse(format!(
            "Credential type must be {PUBLIC_KEY_TYPE}, got {other}"
        ))),
    }
}

/// Relying party entity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// `WebAuthn` user entity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserEntity {
    #[serde(with = "super::encoding::base64url")]
    pub id: Vec<u8>, // user handle
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Public key credential parameters
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
    pub alg: CoseAlgorithm,
}

impl From<CoseAlgorithm> for PublicKeyCredentialParameters {
    fn from(alg: CoseAlgorithm) -> Self {
        Self {
            r#type: public_key_type(),
            alg,
        }
    }
}

/// Authenticator selection criteria
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
}

/// Reference to a previously registered credential
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type", default = "public_key_type")]
    pub r#type: String,
    #[serde(with = "super::encoding::base64url")]
    pub id: Vec<u8>, // credential ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>, // "usb", "nfc", "ble", "internal", "hybrid"
}

impl PublicKeyCredentialDescriptor {
    #[must_use]
    pub fn new(id: Vec<u8>) -> Self {
        Self {
            r#type: PUBLIC_KEY_TYPE.to_string(),
            id,
            transports: None,
        }
    }
}

/// Registration options sent to the client
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    #[serde(with = "super::encoding::base64url")]
    pub challenge: Vec<u8>,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    pub timeout: u64, // milliseconds, advisory
    pub attestation: AttestationConveyance,
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    /// Random value the challenge was derived from when extra data was bound
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "super::encoding::base64url::option"
    )]
    pub raw_challenge: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, ExtensionInput>>,
}

/// Authentication options sent to the client
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    #[serde(with = "super::encoding::base64url")]
    pub challenge: Vec<u8>,
    pub timeout: u64,
    pub rp_id: String,
    pub user_verification: UserVerificationRequirement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<Vec<PublicKeyCredentialDescriptor>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "super::encoding::base64url::option"
    )]
    pub raw_challenge: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, ExtensionInput>>,
}

/// Per-call input for registration options
#[derive(Debug, Clone)]
pub struct AttestationOptionsInput {
    pub user: UserEntity,
    /// Bound into the challenge as `sha256(rawChallenge || extraData)`
    pub extra_data: Option<Vec<u8>>,
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    /// Replaces the configured default extensions when non-empty
    pub extension_options: BTreeMap<String, serde_json::Value>,
}

impl AttestationOptionsInput {
    #[must_use]
    pub fn new(user: UserEntity) -> Self {
        Self {
            user,
            extra_data: None,
            exclude_credentials: Vec::new(),
            extension_options: BTreeMap::new(),
        }
    }
}

/// Per-call input for authentication options
#[derive(Debug, Clone, Default)]
pub struct AssertionOptionsInput {
    pub extra_data: Option<Vec<u8>>,
    pub allow_credentials: Option<Vec<PublicKeyCredentialDescriptor>>,
    pub extension_options: BTreeMap<String, serde_json::Value>,
}

/// Authenticator response to a registration ceremony
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: BinaryInput,
    #[serde(rename = "attestationObject")]
    pub attestation_object: BinaryInput,
}

/// Credential returned by `navigator.credentials.create()`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BinaryInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<BinaryInput>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    pub response: AuthenticatorAttestationResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

/// Authenticator response to an authentication ceremony
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: BinaryInput,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: BinaryInput,
    pub signature: BinaryInput,
    #[serde(rename = "userHandle", default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<BinaryInput>,
}

/// Credential returned by `navigator.credentials.get()`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssertionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BinaryInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<BinaryInput>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    pub response: AuthenticatorAssertionResponse,
}

/// What the relying party expects of a registration response
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedAttestation {
    pub challenge: BinaryInput,
    pub origin: String,
    pub factor: Factor,
    /// Defaults to the host of `origin`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
}

/// A credential public key as the caller stored it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StoredPublicKey {
    /// COSE_Key bytes
    Cose(BinaryInput),
    /// PEM `SubjectPublicKeyInfo`
    ///
    /// Carries no algorithm: EC and Ed25519 keys imply theirs, RSA keys are
    /// verified as RS256. Store RSA-PSS credentials as COSE.
    Pem(String),
}

/// What the relying party expects of an authentication response
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedAssertion {
    pub challenge: BinaryInput,
    pub origin: String,
    pub factor: Factor,
    pub public_key: StoredPublicKey,
    pub prev_counter: u32,
    /// Null and empty are both "no user handle"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<BinaryInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<Vec<PublicKeyCredentialDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
}

/// Expectations after canonicalization, as they were applied
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedExpectations {
    #[serde(with = "super::encoding::base64url")]
    pub challenge: Vec<u8>,
    pub origin: String,
    pub factor: Factor,
    pub rp_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_counter: Option<u32>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "super::encoding::base64url::option"
    )]
    pub user_handle: Option<Vec<u8>>,
}

/// The artifact a caller persists after registration
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredCredential {
    #[serde(with = "super::encoding::base64url")]
    pub id: Vec<u8>,
    pub public_key: CoseKey,
    #[serde(with = "super::encoding::base64url")]
    pub public_key_cose: Vec<u8>,
    /// Loses the COSE algorithm; see [`StoredPublicKey::Pem`]
    pub public_key_pem: String,
    pub aaguid: Uuid,
    pub counter: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

impl RegisteredCredential {
    /// The public key in the form assertion expectations take
    ///
    /// Always the COSE form, which keeps the registered algorithm.
    #[must_use]
    pub fn stored_public_key(&self) -> StoredPublicKey {
        StoredPublicKey::Cose(BinaryInput::Raw(self.public_key_cose.clone()))
    }

    /// Descriptor for `allowCredentials` / `excludeCredentials`
    #[must_use]
    pub fn descriptor(&self) -> PublicKeyCredentialDescriptor {
        PublicKeyCredentialDescriptor {
            transports: self.transports.clone(),
            ..PublicKeyCredentialDescriptor::new(self.id.clone())
        }
    }
}

/// Outcome of a successful registration ceremony
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Fido2AttestationResult {
    pub authenticator_data: AuthenticatorData,
    pub client_data: ClientData,
    pub expectations: ResolvedExpectations,
    pub request: AttestationRequest,
    pub audit: Audit,
    pub format: AttestationFormat,
    pub attestation_trust: AttestationTrust,
    pub credential: RegisteredCredential,
}

impl Fido2AttestationResult {
    #[must_use]
    pub fn credential_id(&self) -> &[u8] {
        &self.credential.id
    }

    #[must_use]
    pub fn credential_public_key(&self) -> &CoseKey {
        &self.credential.public_key
    }

    #[must_use]
    pub fn public_key_pem(&self) -> &str {
        &self.credential.public_key_pem
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.authenticator_data.counter
    }

    #[must_use]
    pub fn aaguid(&self) -> Uuid {
        self.credential.aaguid
    }
}

/// Outcome of a successful authentication ceremony
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Fido2AssertionResult {
    pub authenticator_data: AuthenticatorData,
    pub client_data: ClientData,
    pub expectations: ResolvedExpectations,
    pub request: AssertionRequest,
    pub audit: Audit,
    #[serde(with = "super::encoding::base64url")]
    pub credential_id: Vec<u8>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "super::encoding::base64url::option"
    )]
    pub user_handle: Option<Vec<u8>>,
}

impl Fido2AssertionResult {
    /// New counter value for the caller to persist
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.authenticator_data.counter
    }
}
