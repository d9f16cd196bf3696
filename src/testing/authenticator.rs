//! Software authenticator
//!
//! Produces the exact payloads a browser and authenticator would send for
//! both ceremonies, signed with a freshly generated credential key. Flags,
//! counter, origin and user handle can be set per test to exercise each check.

use ciborium::value::Value;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, Ed25519KeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

use super::constants::{TEST_ORIGIN, TEST_RP_ID};
use crate::webauthn::{
    encode_base64url, encode_value, random_bytes, sha256, AssertionRequest, AttestationRequest,
    AuthenticatorAssertionResponse, AuthenticatorAttestationResponse, BinaryInput, Ceremony,
    CoseAlgorithm, CoseKey, CoseKeyParameters, EcCurve, PUBLIC_KEY_TYPE,
};

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_BE: u8 = 0x08;
pub const FLAG_BS: u8 = 0x10;
pub const FLAG_AT: u8 = 0x40;
pub const FLAG_ED: u8 = 0x80;

/// AAGUID reported by the software authenticator
pub const SOFT_AAGUID: [u8; 16] = [
    0x6d, 0x44, 0xba, 0x9b, 0xf6, 0xec, 0x2e, 0x49, 0xb9, 0x30, 0x0c, 0x8f, 0xe9, 0x20, 0xcb, 0x73,
];

/// CBOR text key, as used in attestation objects and statements
#[must_use]
pub fn text(key: &str) -> Value {
    Value::Text(key.to_string())
}

enum CredentialKey {
    Es256(EcdsaKeyPair),
    EdDsa(Ed25519KeyPair),
}

/// The pieces of one registration that statement builders sign over
pub struct RegistrationParts {
    pub auth_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub client_data_hash: [u8; 32],
    pub credential_id: Vec<u8>,
    pub credential_key: CoseKey,
}

impl RegistrationParts {
    /// `authenticatorData || clientDataHash`
    #[must_use]
    pub fn signed_data(&self) -> Vec<u8> {
        let mut data = self.auth_data.clone();
        data.extend_from_slice(&self.client_data_hash);
        data
    }
}

pub struct SoftAuthenticator {
    key: CredentialKey,
    rng: SystemRandom,
    credential_id: Vec<u8>,
    aaguid: [u8; 16],
    rp_id: String,
    origin: String,
    flags: u8,
    counter: u32,
    user_handle: Option<Vec<u8>>,
    extensions: Option<Value>,
}

impl SoftAuthenticator {
    /// An ES256 authenticator for the default test relying party
    #[must_use]
    pub fn new() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("Failed to generate P-256 key");
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
            .expect("Failed to load P-256 key");
        Self::with_key(CredentialKey::Es256(pair), rng)
    }

    /// An `EdDSA` (Ed25519) authenticator for the default test relying party
    #[must_use]
    pub fn ed25519() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("Failed to generate Ed25519 key");
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("Failed to load Ed25519 key");
        Self::with_key(CredentialKey::EdDsa(pair), rng)
    }

    fn with_key(key: CredentialKey, rng: SystemRandom) -> Self {
        Self {
            key,
            rng,
            credential_id: random_bytes(32).expect("Failed to generate credential ID"),
            aaguid: SOFT_AAGUID,
            rp_id: TEST_RP_ID.to_string(),
            origin: TEST_ORIGIN.to_string(),
            flags: FLAG_UP | FLAG_UV,
            counter: 0,
            user_handle: None,
            extensions: None,
        }
    }

    /// Set the UP/UV/BE/BS bits; AT and ED are derived per ceremony
    #[must_use]
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags & !(FLAG_AT | FLAG_ED);
        self
    }

    #[must_use]
    pub fn with_counter(mut self, counter: u32) -> Self {
        self.counter = counter;
        self
    }

    /// Origin the simulated browser reports in client data
    #[must_use]
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    #[must_use]
    pub fn with_rp_id(mut self, rp_id: &str) -> Self {
        self.rp_id = rp_id.to_string();
        self
    }

    #[must_use]
    pub fn with_user_handle(mut self, user_handle: Option<Vec<u8>>) -> Self {
        self.user_handle = user_handle;
        self
    }

    #[must_use]
    pub fn with_aaguid(mut self, aaguid: [u8; 16]) -> Self {
        self.aaguid = aaguid;
        self
    }

    /// Authenticator extension outputs, appended as the ED section
    #[must_use]
    pub fn with_extensions(mut self, extensions: Value) -> Self {
        self.extensions = Some(extensions);
        self
    }

    #[must_use]
    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    #[must_use]
    pub fn aaguid(&self) -> [u8; 16] {
        self.aaguid
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    #[must_use]
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self.key {
            CredentialKey::Es256(_) => CoseAlgorithm::ES256,
            CredentialKey::EdDsa(_) => CoseAlgorithm::EdDSA,
        }
    }

    /// The credential public key as the relying party will decode it
    #[must_use]
    pub fn cose_key(&self) -> CoseKey {
        let parameters = match &self.key {
            CredentialKey::Es256(pair) => {
                let point = pair.public_key().as_ref();
                CoseKeyParameters::Ec2 {
                    curve: EcCurve::P256,
                    x: point[1..33].to_vec(),
                    y: point[33..65].to_vec(),
                }
            }
            CredentialKey::EdDsa(pair) => CoseKeyParameters::Okp {
                x: pair.public_key().as_ref().to_vec(),
            },
        };
        CoseKey {
            algorithm: self.algorithm(),
            parameters,
        }
    }

    /// Sign with the credential private key (DER for ECDSA)
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        match &self.key {
            CredentialKey::Es256(pair) => pair
                .sign(&self.rng, data)
                .expect("ECDSA signing failed")
                .as_ref()
                .to_vec(),
            CredentialKey::EdDsa(pair) => pair.sign(data).as_ref().to_vec(),
        }
    }

    #[must_use]
    pub fn client_data_json(&self, ceremony: Ceremony, challenge: &[u8]) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": ceremony.client_data_type(),
            "challenge": encode_base64url(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        }))
        .expect("Failed to encode client data")
    }

    /// Authenticator data, with the attested credential section when `attested`
    #[must_use]
    pub fn authenticator_data(&self, attested: bool) -> Vec<u8> {
        let mut flags = self.flags;
        if attested {
            flags |= FLAG_AT;
        }
        if self.extensions.is_some() {
            flags |= FLAG_ED;
        }

        let mut out = sha256(self.rp_id.as_bytes()).to_vec();
        out.push(flags);
        out.extend_from_slice(&self.counter.to_be_bytes());
        if attested {
            out.extend_from_slice(&self.aaguid);
            let id_len = u16::try_from(self.credential_id.len()).expect("credential ID too long");
            out.extend_from_slice(&id_len.to_be_bytes());
            out.extend_from_slice(&self.credential_id);
            out.extend(self.cose_key().to_bytes().expect("Failed to encode COSE key"));
        }
        if let Some(extensions) = &self.extensions {
            out.extend(encode_value(extensions).expect("Failed to encode extensions"));
        }
        out
    }

    /// Registration parts for `challenge`, before any statement is attached
    #[must_use]
    pub fn registration_parts(&self, challenge: &[u8]) -> RegistrationParts {
        let client_data_json = self.client_data_json(Ceremony::Create, challenge);
        RegistrationParts {
            auth_data: self.authenticator_data(true),
            client_data_hash: sha256(&client_data_json),
            client_data_json,
            credential_id: self.credential_id.clone(),
            credential_key: self.cose_key(),
        }
    }

    /// Create a credential whose attestation object uses `format`, with the
    /// statement produced by `statement`
    pub fn make_credential_with<F>(&self, challenge: &[u8], format: &str, statement: F) -> AttestationRequest
    where
        F: FnOnce(&RegistrationParts) -> Vec<(Value, Value)>,
    {
        let parts = self.registration_parts(challenge);
        let att_stmt = statement(&parts);
        let object = Value::Map(vec![
            (text("fmt"), text(format)),
            (text("attStmt"), Value::Map(att_stmt)),
            (text("authData"), Value::Bytes(parts.auth_data.clone())),
        ]);
        let attestation_object = encode_value(&object).expect("Failed to encode attestation object");

        AttestationRequest {
            id: Some(BinaryInput::Encoded(encode_base64url(&self.credential_id))),
            raw_id: Some(BinaryInput::Raw(self.credential_id.clone())),
            r#type: Some(PUBLIC_KEY_TYPE.to_string()),
            response: AuthenticatorAttestationResponse {
                client_data_json: BinaryInput::Raw(parts.client_data_json),
                attestation_object: BinaryInput::Raw(attestation_object),
            },
            transports: Some(vec!["usb".to_string()]),
        }
    }

    /// Create a credential with `none` attestation
    #[must_use]
    pub fn make_credential(&self, challenge: &[u8]) -> AttestationRequest {
        self.make_credential_with(challenge, "none", |_| Vec::new())
    }

    /// Create a credential with `packed` self attestation
    #[must_use]
    pub fn make_credential_packed_self(&self, challenge: &[u8]) -> AttestationRequest {
        self.make_credential_with(challenge, "packed", |parts| {
            vec![
                (text("alg"), Value::Integer(self.algorithm().id().into())),
                (text("sig"), Value::Bytes(self.sign(&parts.signed_data()))),
            ]
        })
    }

    /// Answer an authentication ceremony for `challenge`
    #[must_use]
    pub fn get_assertion(&self, challenge: &[u8]) -> AssertionRequest {
        let client_data_json = self.client_data_json(Ceremony::Get, challenge);
        let authenticator_data = self.authenticator_data(false);
        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&sha256(&client_data_json));
        let signature = self.sign(&signed);

        AssertionRequest {
            id: Some(BinaryInput::Encoded(encode_base64url(&self.credential_id))),
            raw_id: Some(BinaryInput::Raw(self.credential_id.clone())),
            r#type: Some(PUBLIC_KEY_TYPE.to_string()),
            response: AuthenticatorAssertionResponse {
                client_data_json: BinaryInput::Raw(client_data_json),
                authenticator_data: BinaryInput::Raw(authenticator_data),
                signature: BinaryInput::Raw(signature),
                user_handle: self.user_handle.clone().map(BinaryInput::Raw),
            },
        }
    }
}

impl Default for SoftAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}
