//! Custom assertion helpers for ceremony results

use crate::webauthn::{Audit, Fido2Error};

/// Assert an audit is complete and every check in `checks` passed
///
/// # Panics
/// If the audit is incomplete or a check is missing from the journal
pub fn assert_audit_complete(audit: &Audit, checks: &[&str]) {
    assert!(audit.complete, "audit is not complete: {audit:?}");
    assert!(audit.valid_expectations, "expectations were not validated");
    assert!(audit.valid_request, "request was not validated");
    for check in checks {
        assert!(audit.passed(check), "check {check} missing from journal");
    }
}

/// Assert a ceremony failed with `ExpectationMismatch`
///
/// # Panics
/// If the result is `Ok` or a different error
pub fn assert_mismatch<T: std::fmt::Debug>(result: Result<T, Fido2Error>) {
    match result {
        Err(Fido2Error::ExpectationMismatch(_)) => {}
        other => panic!("expected ExpectationMismatch, got {other:?}"),
    }
}

/// Assert a ceremony failed with `SignatureVerification`
///
/// # Panics
/// If the result is `Ok` or a different error
pub fn assert_signature_failure<T: std::fmt::Debug>(result: Result<T, Fido2Error>) {
    match result {
        Err(Fido2Error::SignatureVerification(_)) => {}
        other => panic!("expected SignatureVerification, got {other:?}"),
    }
}

/// Assert a ceremony failed with `ParseError`
///
/// # Panics
/// If the result is `Ok` or a different error
pub fn assert_parse_error<T: std::fmt::Debug>(result: Result<T, Fido2Error>) {
    match result {
        Err(Fido2Error::ParseError(_)) => {}
        other => panic!("expected ParseError, got {other:?}"),
    }
}
