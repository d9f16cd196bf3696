//! Certificate factory for attestation fixtures
//!
//! Issues X.509 v3 leaf certificates from a throwaway P-256 CA, with the
//! subject fields and extensions each attestation format inspects.

use der_parser::asn1_rs::{Enumerated, OctetString, Sequence, TaggedExplicit, ToDer};
use der_parser::error::BerError;
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage};
use openssl::x509::{X509Builder, X509Extension, X509Name, X509NameBuilder, X509};

pub const OID_FIDO_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";
pub const OID_ANDROID_KEY_DESCRIPTION: &str = "1.3.6.1.4.1.11129.2.1.17";
pub const OID_APPLE_NONCE: &str = "1.2.840.113635.100.8.2";
pub const OID_TCG_KP_AIK_CERTIFICATE: &str = "2.23.133.8.3";

/// A raw extension: OID, criticality and the DER inside `extnValue`
#[derive(Debug, Clone)]
pub struct CustomExtension {
    pub oid: &'static str,
    pub critical: bool,
    pub value: Vec<u8>,
}

/// What goes into a leaf certificate
#[derive(Debug, Clone, Default)]
pub struct LeafSpec {
    pub subject: Vec<(Nid, String)>,
    pub extensions: Vec<CustomExtension>,
    pub extended_key_usage: Option<&'static str>,
    pub ca: bool,
}

impl LeafSpec {
    /// Subject and AAGUID extension required of a `packed` attestation certificate
    #[must_use]
    pub fn packed(aaguid: [u8; 16]) -> Self {
        Self {
            subject: vec![
                (Nid::COUNTRYNAME, "US".to_string()),
                (Nid::ORGANIZATIONNAME, "Soft Authenticators Inc".to_string()),
                (Nid::ORGANIZATIONALUNITNAME, "Authenticator Attestation".to_string()),
                (Nid::COMMONNAME, "Soft Authenticator Attestation".to_string()),
            ],
            extensions: vec![aaguid_extension(aaguid)],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fido_u2f() -> Self {
        Self {
            subject: vec![(Nid::COMMONNAME, "Soft U2F Token".to_string())],
            ..Self::default()
        }
    }

    /// Empty subject and the AIK extended key usage
    #[must_use]
    pub fn tpm_aik(aaguid: [u8; 16]) -> Self {
        Self {
            extensions: vec![aaguid_extension(aaguid)],
            extended_key_usage: Some(OID_TCG_KP_AIK_CERTIFICATE),
            ..Self::default()
        }
    }

    /// Android key attestation extension whose challenge is `client_data_hash`
    #[must_use]
    pub fn android_key(client_data_hash: &[u8]) -> Self {
        Self {
            subject: vec![(Nid::COMMONNAME, "Android Keystore Key".to_string())],
            extensions: vec![CustomExtension {
                oid: OID_ANDROID_KEY_DESCRIPTION,
                critical: false,
                value: key_description(client_data_hash),
            }],
            ..Self::default()
        }
    }

    /// Apple anonymous attestation nonce extension
    #[must_use]
    pub fn apple(nonce: &[u8]) -> Self {
        Self {
            subject: vec![(Nid::COMMONNAME, "Soft Apple Credential".to_string())],
            extensions: vec![CustomExtension {
                oid: OID_APPLE_NONCE,
                critical: false,
                value: apple_nonce_extension(nonce),
            }],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn safetynet(hostname: &str) -> Self {
        Self {
            subject: vec![
                (Nid::ORGANIZATIONNAME, "Google LLC".to_string()),
                (Nid::COMMONNAME, hostname.to_string()),
            ],
            ..Self::default()
        }
    }
}

fn aaguid_extension(aaguid: [u8; 16]) -> CustomExtension {
    CustomExtension {
        oid: OID_FIDO_AAGUID,
        critical: false,
        value: der(&OctetString::new(&aaguid)),
    }
}

fn der<T: ToDer>(value: &T) -> Vec<u8> {
    value.to_der_vec().expect("Failed to encode DER")
}

fn sequence(items: &[Vec<u8>]) -> Vec<u8> {
    der(&Sequence::new(items.concat().into()))
}

/// Minimal `KeyDescription`: versions, security levels, challenge, then
/// empty unique ID and authorization lists
#[must_use]
pub fn key_description(challenge: &[u8]) -> Vec<u8> {
    sequence(&[
        der(&3u32),
        der(&Enumerated(1)),
        der(&4u32),
        der(&Enumerated(1)),
        der(&OctetString::new(challenge)),
        der(&OctetString::new(&[])),
        sequence(&[]),
        sequence(&[]),
    ])
}

/// `SEQUENCE { [1] EXPLICIT OCTET STRING }` holding the Apple nonce
#[must_use]
pub fn apple_nonce_extension(nonce: &[u8]) -> Vec<u8> {
    let tagged: TaggedExplicit<OctetString, BerError, 1> =
        TaggedExplicit::explicit(OctetString::new(nonce));
    sequence(&[der(&tagged)])
}

/// Generate a P-256 private key
#[must_use]
pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("P-256 group");
    let key = EcKey::generate(&group).expect("Failed to generate EC key");
    PKey::from_ec_key(key).expect("Failed to wrap EC key")
}

/// Generate a 2048-bit RSA private key
#[must_use]
pub fn rsa_key() -> PKey<Private> {
    let rsa = Rsa::generate(2048).expect("Failed to generate RSA key");
    PKey::from_rsa(rsa).expect("Failed to wrap RSA key")
}

/// Sign with SHA-256 (PKCS#1 v1.5 for RSA, DER ECDSA for EC)
#[must_use]
pub fn sign_sha256(key: &PKeyRef<Private>, data: &[u8]) -> Vec<u8> {
    let mut signer = Signer::new(MessageDigest::sha256(), key).expect("Failed to create signer");
    signer.update(data).expect("Failed to hash data");
    signer.sign_to_vec().expect("Failed to sign")
}

/// A self-signed CA that issues leaf certificates
pub struct CertificateFactory {
    ca_key: PKey<Private>,
    ca_cert: X509,
}

impl CertificateFactory {
    #[must_use]
    pub fn new() -> Self {
        let ca_key = ec_key();
        let name = Self::name(&[(Nid::COMMONNAME, "Fido2 Test Root CA".to_string())]);

        let mut builder = X509Builder::new().expect("X509 builder");
        builder.set_version(2).expect("version");
        builder
            .set_serial_number(&Self::serial().to_asn1_integer().expect("serial"))
            .expect("serial");
        builder.set_subject_name(&name).expect("subject");
        builder.set_issuer_name(&name).expect("issuer");
        builder.set_pubkey(&ca_key).expect("pubkey");
        Self::set_validity(&mut builder);
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().expect("bc"))
            .expect("extension");
        builder
            .sign(&ca_key, MessageDigest::sha256())
            .expect("Failed to self-sign CA");

        Self {
            ca_key,
            ca_cert: builder.build(),
        }
    }

    fn name(entries: &[(Nid, String)]) -> X509Name {
        let mut builder = X509NameBuilder::new().expect("name builder");
        for (nid, value) in entries {
            builder
                .append_entry_by_nid(*nid, value)
                .expect("Failed to add name entry");
        }
        builder.build()
    }

    fn serial() -> BigNum {
        let mut serial = BigNum::new().expect("bignum");
        serial
            .rand(63, MsbOption::MAYBE_ZERO, false)
            .expect("random serial");
        serial
    }

    fn set_validity(builder: &mut X509Builder) {
        let not_before = Asn1Time::days_from_now(0).expect("time");
        let not_after = Asn1Time::days_from_now(365).expect("time");
        builder.set_not_before(&not_before).expect("not before");
        builder.set_not_after(&not_after).expect("not after");
    }

    /// DER of the CA certificate, for the tail of an `x5c` chain
    #[must_use]
    pub fn ca_der(&self) -> Vec<u8> {
        self.ca_cert.to_der().expect("CA DER")
    }

    /// Issue a leaf certificate for `public_key`, returned as DER
    #[must_use]
    pub fn issue<T: HasPublic>(&self, spec: &LeafSpec, public_key: &PKeyRef<T>) -> Vec<u8> {
        let mut builder = X509Builder::new().expect("X509 builder");
        builder.set_version(2).expect("version");
        builder
            .set_serial_number(&Self::serial().to_asn1_integer().expect("serial"))
            .expect("serial");
        builder
            .set_subject_name(&Self::name(&spec.subject))
            .expect("subject");
        builder
            .set_issuer_name(self.ca_cert.subject_name())
            .expect("issuer");
        builder.set_pubkey(public_key).expect("pubkey");
        Self::set_validity(&mut builder);

        let mut constraints = BasicConstraints::new();
        if spec.ca {
            constraints.ca();
        }
        builder
            .append_extension(constraints.build().expect("bc"))
            .expect("extension");
        if let Some(oid) = spec.extended_key_usage {
            let eku = ExtendedKeyUsage::new().other(oid).build().expect("eku");
            builder.append_extension(eku).expect("extension");
        }
        for extension in &spec.extensions {
            let oid = Asn1Object::from_str(extension.oid).expect("extension OID");
            let value = Asn1OctetString::new_from_bytes(&extension.value).expect("extension value");
            let ext = X509Extension::new_from_der(&oid, extension.critical, &value)
                .expect("Failed to build extension");
            builder.append_extension(ext).expect("extension");
        }

        builder
            .sign(&self.ca_key, MessageDigest::sha256())
            .expect("Failed to sign leaf certificate");
        builder.build().to_der().expect("leaf DER")
    }
}

impl Default for CertificateFactory {
    fn default() -> Self {
        Self::new()
    }
}
