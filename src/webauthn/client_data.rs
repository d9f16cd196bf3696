//! Client data validation
//!
//! `clientDataJSON` is the browser's record of the ceremony. Its type,
//! challenge and origin must all match what the relying party expects.

use serde::{Deserialize, Serialize};
use url::Url;

use super::audit::AuditBuilder;
use super::encoding::decode_base64;
use super::errors::Fido2Error;

/// Which ceremony a client data blob belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ceremony {
    Create,
    Get,
}

impl Ceremony {
    #[must_use]
    pub const fn client_data_type(self) -> &'static str {
        match self {
            Self::Create => "webauthn.create",
            Self::Get => "webauthn.get",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenBindingStatus {
    Present,
    Supported,
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    pub status: TokenBindingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Decoded `clientDataJSON`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientData {
    #[serde(rename = "type")]
    pub r#type: String,
    /// base64url, as the browser encoded it
    pub challenge: String,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_binding: Option<TokenBinding>,
}

/// Reduce an origin to `scheme://host[:port]`
///
/// Default ports and letter case are normalized by the URL parser. Origins
/// that do not parse, that have no tuple form, or that carry anything beyond
/// scheme, host and port (a path, query, fragment or credentials) are kept
/// verbatim, so they only ever equal the identical string.
#[must_use]
pub fn canonical_origin(origin: &str) -> String {
    let Ok(url) = Url::parse(origin) else {
        return origin.to_string();
    };
    let bare = url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none()
        && url.username().is_empty()
        && url.password().is_none();
    let parsed = url.origin();
    if bare && parsed.is_tuple() {
        parsed.ascii_serialization()
    } else {
        origin.to_string()
    }
}

/// The RP ID a ceremony is checked against: the explicit value, else the
/// host of the expected origin
///
/// # Errors
/// Returns `ParseError` if no RP ID is given and the origin has no host
pub fn resolve_rp_id(rp_id: Option<&str>, origin: &str) -> Result<String, Fido2Error> {
    if let Some(rp_id) = rp_id.filter(|id| !id.is_empty()) {
        return Ok(rp_id.to_string());
    }
    Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .ok_or_else(|| Fido2Error::parse(format!("Cannot derive an RP ID from origin {origin}")))
}

impl ClientData {
    /// Decode the raw `clientDataJSON` bytes
    ///
    /// # Errors
    /// Returns `ParseError` if the bytes are not a valid client data object
    pub fn parse(bytes: &[u8]) -> Result<Self, Fido2Error> {
        let client_data: Self = serde_json::from_slice(bytes)
            .map_err(|e| Fido2Error::parse(format!("Invalid clientDataJSON: {e}")))?;

        if let Some(binding) = &client_data.token_binding {
            if binding.status == TokenBindingStatus::Present && binding.id.is_none() {
                return Err(Fido2Error::parse(
                    "tokenBinding status is present but no id was given",
                ));
            }
        }
        Ok(client_data)
    }

    /// Check type, challenge and origin, recording each in the audit
    ///
    /// # Errors
    /// Returns `ExpectationMismatch` on the first field that does not match
    pub(crate) fn validate(
        &self,
        ceremony: Ceremony,
        expected_challenge: &[u8],
        expected_origin: &str,
        audit: &mut AuditBuilder,
    ) -> Result<(), Fido2Error> {
        if self.r#type != ceremony.client_data_type() {
            return Err(Fido2Error::mismatch(format!(
                "clientData type is {}, expected {}",
                self.r#type,
                ceremony.client_data_type()
            )));
        }
        audit.pass("type");

        let challenge = decode_base64(&self.challenge)
            .map_err(|_| Fido2Error::mismatch("clientData challenge is not valid base64url"))?;
        if challenge != expected_challenge {
            return Err(Fido2Error::mismatch("clientData challenge does not match"));
        }
        audit.pass("challenge");

        if canonical_origin(&self.origin) != canonical_origin(expected_origin) {
            log::warn!(
                "🚫 Origin mismatch: got {}, expected {expected_origin}",
                self.origin
            );
            return Err(Fido2Error::mismatch(format!(
                "clientData origin {} does not match {expected_origin}",
                self.origin
            )));
        }
        audit.pass("origin");

        match &self.token_binding {
            Some(binding) => {
                let status = match binding.status {
                    TokenBindingStatus::Present => "present",
                    TokenBindingStatus::Supported => "supported",
                    TokenBindingStatus::NotSupported => "not-supported",
                };
                audit.info("tokenBinding", status);
            }
            None => audit.info("tokenBinding", "absent"),
        }
        audit.pass("tokenBinding");

        if self.cross_origin == Some(true) {
            audit.info("crossOrigin", "credential used from a cross-origin iframe");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::encoding::encode_base64url;

    const ORIGIN: &str = "https://example.org";

    fn client_data_json(kind: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": kind,
            "challenge": encode_base64url(challenge),
            "origin": origin,
        }))
        .unwrap()
    }

    fn check(bytes: &[u8], ceremony: Ceremony) -> Result<(), Fido2Error> {
        let mut audit = AuditBuilder::new();
        ClientData::parse(bytes)?.validate(ceremony, b"challenge-bytes", ORIGIN, &mut audit)
    }

    #[test]
    fn test_matching_client_data_passes() {
        let bytes = client_data_json("webauthn.create", b"challenge-bytes", ORIGIN);
        check(&bytes, Ceremony::Create).unwrap();
    }

    #[test]
    fn test_each_field_mutation_is_a_mismatch() {
        let mutations = [
            client_data_json("webauthn.get", b"challenge-bytes", ORIGIN),
            client_data_json("webauthn.create", b"challenge-bytez", ORIGIN),
            client_data_json("webauthn.create", b"challenge-bytes", "https://evil.example"),
        ];
        for bytes in mutations {
            assert!(matches!(
                check(&bytes, Ceremony::Create),
                Err(Fido2Error::ExpectationMismatch(_))
            ));
        }
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            check(b"{\"type\": ", Ceremony::Get),
            Err(Fido2Error::ParseError(_))
        ));
        let present_without_id = br#"{"type":"webauthn.get","challenge":"","origin":"x","tokenBinding":{"status":"present"}}"#;
        assert!(matches!(
            ClientData::parse(present_without_id),
            Err(Fido2Error::ParseError(_))
        ));
    }

    #[test]
    fn test_rp_id_defaults_to_origin_host() {
        assert_eq!(resolve_rp_id(None, "https://login.example.org:8443").unwrap(), "login.example.org");
        assert_eq!(resolve_rp_id(Some("example.org"), "https://login.example.org").unwrap(), "example.org");
        assert!(resolve_rp_id(None, "not a url").is_err());
    }

    #[test]
    fn test_origin_canonicalization() {
        assert_eq!(canonical_origin("https://Example.org:443"), ORIGIN);
        assert_eq!(canonical_origin("https://example.org/"), ORIGIN);
        for origin in [
            "https://example.org/phishing/page",
            "https://example.org/?next=1",
            "https://example.org/#top",
            "https://user@example.org",
        ] {
            assert_ne!(canonical_origin(origin), ORIGIN, "{origin}");
        }
        assert_ne!(
            canonical_origin("https://example.org:8443"),
            canonical_origin(ORIGIN)
        );
        assert_eq!(
            canonical_origin("android:apk-key-hash:abc"),
            "android:apk-key-hash:abc"
        );
    }
}
