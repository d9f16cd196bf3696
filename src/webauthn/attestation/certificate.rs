//! Attestation certificates
//!
//! Wraps one DER certificate from an `x5c` chain. `openssl` provides the
//! public key, subject and signature checks; `x509-parser` reads the
//! extensions.

use ciborium::value::Value;
use der_parser::der::parse_der_octetstring;
use der_parser::Oid;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Public};
use openssl::x509::X509;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::webauthn::cbor::text_entry;
use crate::webauthn::cose::CoseAlgorithm;
use crate::webauthn::crypto;
use crate::webauthn::errors::Fido2Error;

pub(crate) const OID_FIDO_AAGUID: Oid<'static> = der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

/// A certificate extension as found in the certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Extension {
    pub critical: bool,
    /// Contents of the `extnValue` OCTET STRING
    pub value: Vec<u8>,
}

pub(crate) struct AttestationCertificate {
    der: Vec<u8>,
    x509: X509,
}

impl AttestationCertificate {
    pub(crate) fn from_der(der: &[u8]) -> Result<Self, Fido2Error> {
        let x509 = X509::from_der(der)
            .map_err(|e| Fido2Error::parse(format!("Invalid attestation certificate: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            x509,
        })
    }

    pub(crate) fn der(&self) -> &[u8] {
        &self.der
    }

    pub(crate) fn public_key(&self) -> Result<PKey<Public>, Fido2Error> {
        self.x509
            .public_key()
            .map_err(|e| Fido2Error::parse(format!("Unreadable certificate public key: {e}")))
    }

    /// Verify a signature made with the certificate's private key
    pub(crate) fn verify(
        &self,
        alg: CoseAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Fido2Error> {
        let key = self.public_key()?;
        crypto::verify_with_key(alg, &key, data, signature)
    }

    /// Whether `issuer`'s key signed this certificate
    pub(crate) fn is_signed_by(&self, issuer: &AttestationCertificate) -> Result<bool, Fido2Error> {
        let key = issuer.public_key()?;
        self.x509
            .verify(&key)
            .map_err(|e| Fido2Error::signature(format!("Certificate signature check failed: {e}")))
    }

    /// X.509 version as written in the certificate (3 for v3)
    pub(crate) fn version(&self) -> i32 {
        self.x509.version() + 1
    }

    pub(crate) fn subject_is_empty(&self) -> bool {
        self.x509.subject_name().entries().next().is_none()
    }

    pub(crate) fn subject_entry(&self, nid: Nid) -> Option<String> {
        self.x509
            .subject_name()
            .entries_by_nid(nid)
            .next()
            .and_then(|entry| std::str::from_utf8(entry.data().as_slice()).ok())
            .map(ToString::to_string)
    }

    fn parsed(&self) -> Result<X509Certificate<'_>, Fido2Error> {
        X509Certificate::from_der(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| Fido2Error::parse(format!("Invalid attestation certificate: {e}")))
    }

    pub(crate) fn extension(&self, oid: &Oid<'_>) -> Result<Option<Extension>, Fido2Error> {
        let cert = self.parsed()?;
        let found = cert
            .get_extension_unique(oid)
            .map_err(|e| Fido2Error::parse(format!("Invalid certificate extension {oid}: {e}")))?;
        Ok(found.map(|ext| Extension {
            critical: ext.critical,
            value: ext.value.to_vec(),
        }))
    }

    /// `cA` from basic constraints; absent extension means not a CA
    pub(crate) fn is_ca(&self) -> Result<bool, Fido2Error> {
        let cert = self.parsed()?;
        let constraints = cert
            .basic_constraints()
            .map_err(|e| Fido2Error::parse(format!("Invalid basic constraints: {e}")))?;
        Ok(constraints.is_some_and(|ext| ext.value.ca))
    }

    pub(crate) fn has_extended_key_usage(&self, oid: &Oid<'_>) -> Result<bool, Fido2Error> {
        let cert = self.parsed()?;
        let usage = cert
            .extended_key_usage()
            .map_err(|e| Fido2Error::parse(format!("Invalid extended key usage: {e}")))?;
        Ok(usage.is_some_and(|ext| ext.value.other.iter().any(|other| other == oid)))
    }

    /// Compare the FIDO AAGUID extension, when present, with the authenticator data
    ///
    /// The extension must not be critical.
    pub(crate) fn check_aaguid(&self, aaguid: &[u8; 16]) -> Result<(), Fido2Error> {
        let Some(ext) = self.extension(&OID_FIDO_AAGUID)? else {
            return Ok(());
        };
        if ext.critical {
            return Err(Fido2Error::signature(
                "AAGUID certificate extension must not be critical",
            ));
        }
        let (_, value) = parse_der_octetstring(&ext.value)
            .map_err(|e| Fido2Error::parse(format!("Invalid AAGUID extension: {e}")))?;
        let value = value
            .as_slice()
            .map_err(|e| Fido2Error::parse(format!("Invalid AAGUID extension: {e}")))?;
        if value != aaguid.as_slice() {
            return Err(Fido2Error::signature(
                "AAGUID certificate extension does not match authenticator data",
            ));
        }
        Ok(())
    }
}

/// Check that every certificate is signed by the one after it
///
/// The last certificate is not checked against any root; chains are not
/// anchored to a trust store.
pub(crate) fn verify_chain(chain: &[AttestationCertificate]) -> Result<(), Fido2Error> {
    for (position, link) in chain.windows(2).enumerate() {
        if !link[0].is_signed_by(&link[1])? {
            return Err(Fido2Error::signature(format!(
                "x5c[{position}] is not signed by x5c[{}]",
                position + 1
            )));
        }
    }
    Ok(())
}

/// Decode the `x5c` array of a statement and verify its links; `None` when
/// the key is absent
pub(crate) fn certificate_chain(
    statement: &[(Value, Value)],
) -> Result<Option<Vec<AttestationCertificate>>, Fido2Error> {
    let Some(x5c) = text_entry(statement, "x5c") else {
        return Ok(None);
    };
    let Some(items) = x5c.as_array() else {
        return Err(Fido2Error::parse("x5c is not an array"));
    };
    if items.is_empty() {
        return Err(Fido2Error::parse("x5c is empty"));
    }
    let chain = items
        .iter()
        .map(|item| {
            item.as_bytes()
                .ok_or_else(|| Fido2Error::parse("x5c entry is not a byte string"))
                .and_then(|bytes| AttestationCertificate::from_der(bytes))
        })
        .collect::<Result<Vec<_>, _>>()?;
    verify_chain(&chain)?;
    Ok(Some(chain))
}

/// Raw DER of each certificate, for the trust path in the result
pub(crate) fn chain_der(chain: &[AttestationCertificate]) -> Vec<Vec<u8>> {
    chain.iter().map(|cert| cert.der().to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::certificates::{ec_key, CertificateFactory, LeafSpec};

    fn leaf(factory: &CertificateFactory, aaguid: [u8; 16]) -> AttestationCertificate {
        let der = factory.issue(&LeafSpec::packed(aaguid), &ec_key());
        AttestationCertificate::from_der(&der).unwrap()
    }

    #[test]
    fn test_verify_chain_links() {
        let factory = CertificateFactory::new();
        let issuer = AttestationCertificate::from_der(&factory.ca_der()).unwrap();
        let unrelated = AttestationCertificate::from_der(&CertificateFactory::new().ca_der()).unwrap();

        let signed = leaf(&factory, [7; 16]);
        assert!(verify_chain(&[signed]).is_ok());

        let signed = leaf(&factory, [7; 16]);
        assert!(verify_chain(&[signed, issuer]).is_ok());

        let signed = leaf(&factory, [7; 16]);
        let error = verify_chain(&[signed, unrelated]).unwrap_err();
        assert!(matches!(error, Fido2Error::SignatureVerification(_)));
    }

    #[test]
    fn test_certificate_fields() {
        let factory = CertificateFactory::new();
        let cert = leaf(&factory, [7; 16]);
        assert_eq!(cert.version(), 3);
        assert!(!cert.subject_is_empty());
        assert_eq!(
            cert.subject_entry(Nid::ORGANIZATIONALUNITNAME).as_deref(),
            Some("Authenticator Attestation")
        );
        assert!(!cert.is_ca().unwrap());
        assert!(cert.check_aaguid(&[7; 16]).is_ok());
        assert!(cert.check_aaguid(&[8; 16]).is_err());

        let ca = AttestationCertificate::from_der(&factory.ca_der()).unwrap();
        assert!(ca.is_ca().unwrap());
    }
}
