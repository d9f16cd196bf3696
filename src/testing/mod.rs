//! Unified testing utilities for fido2-rp
//!
//! Compiled for unit tests and, behind the `testing` feature, for the
//! integration tests under `tests/`.
//!
//! ## Organization
//!
//! - [`authenticator`] - Software authenticator producing real ceremony payloads
//! - [`certificates`] - Throwaway CA issuing attestation certificates
//! - [`statements`] - Attestation statements for every supported format
//! - [`fixtures`] - Pre-built settings, service and expectations
//! - [`assertions`] - Custom assertion helpers for ceremony results
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fido2_rp::testing::{SoftAuthenticator, TestFixtures};
//!
//! let service = TestFixtures::service();
//! let options = service
//!     .attestation_options(TestFixtures::attestation_options_input())
//!     .unwrap();
//! let authenticator = SoftAuthenticator::new();
//! let request = authenticator.make_credential(&options.challenge);
//! let result = service
//!     .attestation_result(&request, &TestFixtures::expected_attestation(&options.challenge))
//!     .unwrap();
//! assert!(result.audit.complete);
//! ```

pub mod assertions;
pub mod authenticator;
pub mod certificates;
pub mod fixtures;
pub mod statements;

// Re-export commonly used items for convenience
pub use assertions::*;
pub use authenticator::{RegistrationParts, SoftAuthenticator};
pub use certificates::{CertificateFactory, LeafSpec};
pub use fixtures::TestFixtures;
pub use statements::AttestationFixtures;

/// Common test constants
pub mod constants {
    /// Relying party ID the fixtures register under
    pub const TEST_RP_ID: &str = "example.org";

    /// Origin the software authenticator reports
    pub const TEST_ORIGIN: &str = "https://example.org";

    /// An origin that must never verify
    pub const EVIL_ORIGIN: &str = "https://evil.example";

    pub const TEST_RP_NAME: &str = "Example Relying Party";

    pub const TEST_USER_NAME: &str = "test@example.org";
}
