//! Audit trail
//!
//! Each verification call owns an [`AuditBuilder`]. Checks append to it as they
//! pass; the finished [`Audit`] is attached to the successful result. On failure
//! the builder is dropped with the rest of the call.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::errors::Fido2Error;

/// Validation facts gathered during one ceremony
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    /// The caller's expectations were resolved and checked
    pub valid_expectations: bool,
    /// The request payload was decoded and checked
    pub valid_request: bool,
    /// Every check the ceremony requires ran and passed
    pub complete: bool,
    /// Names of the checks that passed
    pub journal: BTreeSet<String>,
    /// Non-fatal findings, by check name
    pub warnings: BTreeMap<String, String>,
    /// Advisory notes, by check name
    pub info: BTreeMap<String, String>,
}

impl Audit {
    #[must_use]
    pub fn passed(&self, check: &str) -> bool {
        self.journal.contains(check)
    }
}

/// Append-only accumulator for a single call
#[derive(Debug, Default)]
pub(crate) struct AuditBuilder {
    audit: Audit,
}

impl AuditBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn pass(&mut self, check: &str) {
        self.audit.journal.insert(check.to_string());
    }

    pub(crate) fn warn(&mut self, check: &str, message: impl Into<String>) {
        let message = message.into();
        log::warn!("⚠️ {check}: {message}");
        self.audit.warnings.insert(check.to_string(), message);
    }

    pub(crate) fn info(&mut self, check: &str, message: impl Into<String>) {
        self.audit.info.insert(check.to_string(), message.into());
    }

    pub(crate) fn expectations_validated(&mut self) {
        self.audit.valid_expectations = true;
    }

    pub(crate) fn request_validated(&mut self) {
        self.audit.valid_request = true;
    }

    /// Seal the audit, requiring every check in `required` to have passed
    ///
    /// A missing check means a verification path returned success without
    /// running it, which is a bug rather than bad input.
    pub(crate) fn finish(mut self, required: &[&str]) -> Result<Audit, Fido2Error> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|check| !self.audit.journal.contains(*check))
            .collect();
        if !missing.is_empty() {
            return Err(Fido2Error::internal(format!(
                "Audit incomplete, checks not run: {}",
                missing.join(", ")
            )));
        }
        if !self.audit.valid_expectations || !self.audit.valid_request {
            return Err(Fido2Error::internal(
                "Audit incomplete, request or expectations not validated",
            ));
        }
        self.audit.complete = true;
        Ok(self.audit)
    }
}
