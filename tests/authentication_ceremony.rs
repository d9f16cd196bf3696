// End-to-end authentication ceremonies against the software authenticator
use ciborium::value::Value;
use fido2_rp::testing::authenticator::{text, FLAG_BE, FLAG_BS, FLAG_UP, FLAG_UV};
use fido2_rp::testing::constants::EVIL_ORIGIN;
use fido2_rp::testing::{
    assert_audit_complete, assert_mismatch, assert_signature_failure, SoftAuthenticator,
    TestFixtures,
};
use fido2_rp::webauthn::{
    BinaryInput, Factor, PublicKeyCredentialDescriptor, StoredPublicKey,
};
use fido2_rp::{AssertionOptionsInput, Fido2Error, Fido2Service};

const ASSERTION_CHECKS: [&str; 8] = [
    "rawId",
    "challenge",
    "origin",
    "rpIdHash",
    "flags",
    "signature",
    "userHandle",
    "counter",
];

fn challenge(service: &Fido2Service) -> Vec<u8> {
    service
        .assertion_options(AssertionOptionsInput::default())
        .expect("options are generated")
        .challenge
}

#[test]
fn test_assertion_end_to_end() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new().with_counter(6);
    let request = authenticator.get_assertion(&challenge);

    let result = service
        .assertion_result(&request, &TestFixtures::expected_assertion(&challenge, &authenticator, 5))
        .unwrap();

    assert_audit_complete(&result.audit, &ASSERTION_CHECKS);
    assert_eq!(result.counter(), 6);
    assert_eq!(result.credential_id, authenticator.credential_id());
    assert_eq!(result.expectations.prev_counter, Some(5));
    assert!(result.user_handle.is_none());
}

#[test]
fn test_counter_must_increase() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);

    let authenticator = SoftAuthenticator::new().with_counter(5);
    let request = authenticator.get_assertion(&challenge);
    let equal = service.assertion_result(
        &request,
        &TestFixtures::expected_assertion(&challenge, &authenticator, 5),
    );
    assert_eq!(
        equal.unwrap_err(),
        Fido2Error::CounterRegression {
            previous: 5,
            received: 5
        }
    );

    let lower = service.assertion_result(
        &request,
        &TestFixtures::expected_assertion(&challenge, &authenticator, 9),
    );
    assert!(matches!(lower, Err(Fido2Error::CounterRegression { .. })));
}

#[test]
fn test_counter_not_implemented() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new();
    let request = authenticator.get_assertion(&challenge);

    let result = service
        .assertion_result(&request, &TestFixtures::expected_assertion(&challenge, &authenticator, 0))
        .unwrap();
    assert_eq!(result.counter(), 0);
    assert!(result.audit.info.contains_key("counter"));
}

#[test]
fn test_counter_reset_to_zero_is_rejected() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new();
    let request = authenticator.get_assertion(&challenge);

    let result = service.assertion_result(
        &request,
        &TestFixtures::expected_assertion(&challenge, &authenticator, 3),
    );
    assert!(matches!(result, Err(Fido2Error::CounterRegression { .. })));
}

#[test]
fn test_factor_with_presence_only() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new().with_flags(FLAG_UP).with_counter(1);
    let request = authenticator.get_assertion(&challenge);
    let mut expected = TestFixtures::expected_assertion(&challenge, &authenticator, 0);

    expected.factor = Factor::First;
    assert_mismatch(service.assertion_result(&request, &expected));

    expected.factor = Factor::Second;
    assert!(service.assertion_result(&request, &expected).is_ok());

    expected.factor = Factor::Either;
    assert!(service.assertion_result(&request, &expected).is_ok());
}

#[test]
fn test_second_factor_rejects_missing_presence() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new().with_flags(FLAG_UV).with_counter(1);
    let request = authenticator.get_assertion(&challenge);
    let mut expected = TestFixtures::expected_assertion(&challenge, &authenticator, 0);
    expected.factor = Factor::Second;

    assert_mismatch(service.assertion_result(&request, &expected));
}

#[test]
fn test_user_handle_match() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new()
        .with_user_handle(Some(b"user-handle-0001".to_vec()))
        .with_counter(1);
    let request = authenticator.get_assertion(&challenge);
    let mut expected = TestFixtures::expected_assertion(&challenge, &authenticator, 0);
    expected.user_handle = Some(BinaryInput::Raw(b"user-handle-0001".to_vec()));

    let result = service.assertion_result(&request, &expected).unwrap();
    assert_eq!(result.user_handle, Some(b"user-handle-0001".to_vec()));
    assert!(result.audit.passed("userHandle"));
}

#[test]
fn test_user_handle_mismatch() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new()
        .with_user_handle(Some(b"someone-else".to_vec()))
        .with_counter(1);
    let request = authenticator.get_assertion(&challenge);
    let mut expected = TestFixtures::expected_assertion(&challenge, &authenticator, 0);
    expected.user_handle = Some(BinaryInput::Raw(b"user-handle-0001".to_vec()));

    assert_mismatch(service.assertion_result(&request, &expected));
}

#[test]
fn test_unexpected_user_handle_is_rejected() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new()
        .with_user_handle(Some(b"user-handle-0001".to_vec()))
        .with_counter(1);
    let request = authenticator.get_assertion(&challenge);

    assert_mismatch(service.assertion_result(
        &request,
        &TestFixtures::expected_assertion(&challenge, &authenticator, 0),
    ));
}

#[test]
fn test_empty_user_handle_equals_null() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);

    // Authenticator sends an empty handle, caller expects none
    let authenticator = SoftAuthenticator::new()
        .with_user_handle(Some(Vec::new()))
        .with_counter(1);
    let request = authenticator.get_assertion(&challenge);
    let result = service
        .assertion_result(&request, &TestFixtures::expected_assertion(&challenge, &authenticator, 0))
        .unwrap();
    assert!(result.user_handle.is_none());

    // Caller passes an empty string, authenticator sends nothing
    let authenticator = SoftAuthenticator::new().with_counter(1);
    let request = authenticator.get_assertion(&challenge);
    let mut expected = TestFixtures::expected_assertion(&challenge, &authenticator, 0);
    expected.user_handle = Some(BinaryInput::from(""));
    let result = service.assertion_result(&request, &expected).unwrap();
    assert!(result.expectations.user_handle.is_none());
}

#[test]
fn test_allow_credentials() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new().with_counter(1);
    let request = authenticator.get_assertion(&challenge);
    let mut expected = TestFixtures::expected_assertion(&challenge, &authenticator, 0);

    expected.allow_credentials = Some(vec![PublicKeyCredentialDescriptor::new(vec![1, 2, 3])]);
    assert_mismatch(service.assertion_result(&request, &expected));

    expected.allow_credentials = Some(vec![
        PublicKeyCredentialDescriptor::new(vec![1, 2, 3]),
        PublicKeyCredentialDescriptor::new(authenticator.credential_id().to_vec()),
    ]);
    let result = service.assertion_result(&request, &expected).unwrap();
    assert!(result.audit.passed("allowCredentials"));
}

#[test]
fn test_wrong_origin_is_rejected() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new().with_origin(EVIL_ORIGIN).with_counter(1);
    let request = authenticator.get_assertion(&challenge);

    assert_mismatch(service.assertion_result(
        &request,
        &TestFixtures::expected_assertion(&challenge, &authenticator, 0),
    ));
}

#[test]
fn test_registration_payload_is_not_an_assertion() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new().with_counter(1);
    let registration = authenticator.make_credential(&challenge);
    let mut request = authenticator.get_assertion(&challenge);
    request.response.client_data_json = registration.response.client_data_json;

    assert_mismatch(service.assertion_result(
        &request,
        &TestFixtures::expected_assertion(&challenge, &authenticator, 0),
    ));
}

#[test]
fn test_pem_stored_key() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new().with_counter(1);
    let request = authenticator.get_assertion(&challenge);
    let mut expected = TestFixtures::expected_assertion(&challenge, &authenticator, 0);
    expected.public_key = StoredPublicKey::Pem(authenticator.cose_key().to_pem().unwrap());

    let result = service.assertion_result(&request, &expected).unwrap();
    assert!(result.audit.complete);
}

#[test]
fn test_wrong_stored_key_fails_signature() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new().with_counter(1);
    let other = SoftAuthenticator::new();
    let request = authenticator.get_assertion(&challenge);

    assert_signature_failure(service.assertion_result(
        &request,
        &TestFixtures::expected_assertion(&challenge, &other, 0),
    ));

    let mut expected = TestFixtures::expected_assertion(&challenge, &authenticator, 0);
    expected.public_key = StoredPublicKey::Pem(other.cose_key().to_pem().unwrap());
    assert_signature_failure(service.assertion_result(&request, &expected));
}

#[test]
fn test_tampered_authenticator_data_fails_signature() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new().with_counter(1);
    let mut request = authenticator.get_assertion(&challenge);
    let mut auth_data = request.response.authenticator_data.to_bytes().unwrap();
    auth_data[32] &= !FLAG_UV; // UP alone still satisfies Either
    request.response.authenticator_data = BinaryInput::Raw(auth_data);

    assert_signature_failure(service.assertion_result(
        &request,
        &TestFixtures::expected_assertion(&challenge, &authenticator, 0),
    ));
}

#[test]
fn test_ed25519_assertion() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::ed25519().with_counter(1);
    let request = authenticator.get_assertion(&challenge);

    let result = service
        .assertion_result(&request, &TestFixtures::expected_assertion(&challenge, &authenticator, 0))
        .unwrap();
    assert_audit_complete(&result.audit, &ASSERTION_CHECKS);
}

#[test]
fn test_backup_and_extensions_are_noted() {
    let service = TestFixtures::service();
    let challenge = challenge(&service);
    let authenticator = SoftAuthenticator::new()
        .with_flags(FLAG_UP | FLAG_UV | FLAG_BE | FLAG_BS)
        .with_extensions(Value::Map(vec![(text("appid"), Value::Bool(true))]))
        .with_counter(1);
    let request = authenticator.get_assertion(&challenge);

    let result = service
        .assertion_result(&request, &TestFixtures::expected_assertion(&challenge, &authenticator, 0))
        .unwrap();
    assert!(result.authenticator_data.flags.backed_up());
    assert_eq!(
        result.audit.info.get("backup").map(String::as_str),
        Some("backup eligible, backed up")
    );
    assert_eq!(result.audit.info.get("extensions").map(String::as_str), Some("appid"));
}

#[test]
fn test_register_then_authenticate() {
    let service = TestFixtures::service();
    let registration_challenge = service
        .attestation_options(TestFixtures::attestation_options_input())
        .unwrap()
        .challenge;
    let authenticator = SoftAuthenticator::new()
        .with_user_handle(Some(TestFixtures::user().id));
    let registered = service
        .attestation_result(
            &authenticator.make_credential_packed_self(&registration_challenge),
            &TestFixtures::expected_attestation(&registration_challenge),
        )
        .unwrap();

    // The relying party stores the key, counter and descriptor
    let stored_key = registered.credential.stored_public_key();
    let stored_counter = registered.counter();
    let options = service
        .assertion_options(AssertionOptionsInput {
            allow_credentials: Some(vec![registered.credential.descriptor()]),
            ..AssertionOptionsInput::default()
        })
        .unwrap();
    assert_eq!(
        options.allow_credentials.as_ref().unwrap()[0].id,
        authenticator.credential_id()
    );

    let authenticator = authenticator.with_counter(stored_counter + 1);
    let mut expected = TestFixtures::expected_assertion(&options.challenge, &authenticator, stored_counter);
    expected.public_key = stored_key;
    expected.user_handle = Some(BinaryInput::Raw(TestFixtures::user().id));
    expected.allow_credentials = options.allow_credentials.clone();

    let result = service
        .assertion_result(&authenticator.get_assertion(&options.challenge), &expected)
        .unwrap();
    assert_audit_complete(&result.audit, &ASSERTION_CHECKS);
    assert_eq!(result.counter(), stored_counter + 1);
    assert_eq!(result.user_handle, Some(TestFixtures::user().id));
}
