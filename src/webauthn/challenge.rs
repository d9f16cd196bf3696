//! Challenge generation
//!
//! A challenge is fresh CSPRNG output. When the caller binds extra data to a
//! ceremony, the transmitted challenge becomes `sha256(raw || extra)` and the
//! raw value is handed back so the binding can be re-derived later.

use super::crypto::{random_bytes, sha256};
use super::errors::Fido2Error;

/// A challenge ready to be sent to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedChallenge {
    /// Value placed in the options object
    pub challenge: Vec<u8>,
    /// Random input of the hash, present only when extra data was bound
    pub raw_challenge: Option<Vec<u8>>,
}

/// Generate a challenge of `size` random bytes, optionally bound to `extra_data`
///
/// # Errors
/// Returns `InternalError` if the random source fails
pub fn generate_challenge(
    size: usize,
    extra_data: Option<&[u8]>,
) -> Result<GeneratedChallenge, Fido2Error> {
    let raw = random_bytes(size)?;
    Ok(match extra_data {
        Some(extra) => GeneratedChallenge {
            challenge: bound_challenge(&raw, extra).to_vec(),
            raw_challenge: Some(raw),
        },
        None => GeneratedChallenge {
            challenge: raw,
            raw_challenge: None,
        },
    })
}

/// Re-derive the transmitted challenge from its raw value and extra data
#[must_use]
pub fn bound_challenge(raw_challenge: &[u8], extra_data: &[u8]) -> [u8; 32] {
    let mut input = Vec::with_capacity(raw_challenge.len() + extra_data.len());
    input.extend_from_slice(raw_challenge);
    input.extend_from_slice(extra_data);
    sha256(&input)
}
