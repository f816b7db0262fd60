//! Gateway behaviour against the in-memory provider, with leak checks on
//! every failure path.

use std::sync::Arc;

use credgate_core::error::codes;
use credgate_core::provider::ProviderCall;
use credgate_core::{
    BatchVerifier, ContainerCredentials, CredentialGateway, ErrorKind, ErrorSink,
    ExistingContainer, GatewaySettings, KeySpec, ProviderError, ProviderKind, PublicKey,
    SilentSink, SoftProvider,
};
use parking_lot::Mutex;

const BOX: &[u8] = b"testbox";
const PIN: &[u8] = b"1234";

fn gateway() -> CredentialGateway<SoftProvider> {
    CredentialGateway::new(SoftProvider::new()).with_sink(SilentSink)
}

fn gateway_with_box(kind: ProviderKind) -> CredentialGateway<SoftProvider> {
    let gw = gateway();
    gw.create_container(kind, BOX, PIN).unwrap();
    gw
}

fn assert_balanced(gw: &CredentialGateway<SoftProvider>) {
    let provider = gw.provider();
    assert!(provider.stats().is_balanced(), "{:?}", provider.stats());
    assert_eq!(provider.open_contexts(), 0);
    assert_eq!(provider.open_keys(), 0);
    assert_eq!(provider.open_hashes(), 0);
}

#[derive(Clone, Default)]
struct CollectingSink(Arc<Mutex<Vec<(&'static str, ProviderError)>>>);

impl ErrorSink for CollectingSink {
    fn provider_failure(&self, operation: &'static str, error: &ProviderError) {
        self.0.lock().push((operation, error.clone()));
    }
}

#[test]
fn create_then_open_succeeds() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    assert!(gw.provider().has_container(ProviderKind::Gost256, BOX));
    {
        let session = gw
            .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
            .unwrap();
        assert_eq!(session.kind(), ProviderKind::Gost256);
    }
    assert_balanced(&gw);
}

#[test]
fn wrong_password_is_rejected() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    let err = gw
        .open_container(ProviderKind::Gost256, BOX, b"0000", KeySpec::Signature)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::PinRejected);
    assert_eq!(
        err.provider_error().map(|e| e.code),
        Some(codes::SCARD_W_WRONG_CHV)
    );

    let err = gw.check_container(ProviderKind::Gost256, BOX, b"0000").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PinRejected);
    let err = gw
        .sign_message(ProviderKind::Gost256, BOX, b"0000", b"hello", KeySpec::Signature)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PinRejected);
    assert_balanced(&gw);
}

#[test]
fn check_container_reports_missing_container() {
    let gw = gateway();
    let err = gw
        .check_container(ProviderKind::Gost256, b"nowhere", PIN)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AcquireFailed);
    assert_eq!(err.provider_error().map(|e| e.code), Some(codes::NTE_BAD_KEYSET));
    assert_balanced(&gw);
}

#[test]
fn testbox_example_signs_and_verifies() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    gw.check_container(ProviderKind::Gost256, BOX, PIN).unwrap();

    let signature = gw
        .sign_message(ProviderKind::Gost256, BOX, PIN, b"hello", KeySpec::Signature)
        .unwrap();
    assert!(!signature.is_empty());

    let session = gw
        .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
        .unwrap();
    let blob = gw.export_public_key_bytes(session.key()).unwrap();
    assert!(!blob.is_empty());

    assert!(gw
        .verify_sign(ProviderKind::Gost256, session.key(), signature.as_bytes(), b"hello")
        .unwrap());
    assert!(!gw
        .verify_sign(ProviderKind::Gost256, session.key(), signature.as_bytes(), b"hellp")
        .unwrap());
    drop(session);
    assert_balanced(&gw);
}

#[test]
fn tampered_signature_is_a_mismatch_not_an_error() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    let signature = gw
        .sign_message(ProviderKind::Gost256, BOX, PIN, b"payload", KeySpec::Signature)
        .unwrap();
    let mut tampered = signature.into_vec();
    tampered[0] ^= 0x01;

    let session = gw
        .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
        .unwrap();
    let ok = gw
        .verify_sign(ProviderKind::Gost256, session.key(), &tampered, b"payload")
        .unwrap();
    assert!(!ok);

    let ok = gw
        .verify_sign(ProviderKind::Gost256, session.key(), &tampered[..10], b"payload")
        .unwrap();
    assert!(!ok);
    drop(session);
    assert_balanced(&gw);
}

#[test]
fn exported_key_imports_and_verifies_same_signatures() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    let signature = gw
        .sign_message(ProviderKind::Gost256, BOX, PIN, b"abc", KeySpec::Signature)
        .unwrap();

    let blob = {
        let session = gw
            .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
            .unwrap();
        gw.export_public_key_bytes(session.key()).unwrap()
    };

    let imported = gw
        .import_public_key(ProviderKind::Gost256, blob.as_bytes())
        .unwrap();
    assert!(gw
        .verify_sign(ProviderKind::Gost256, imported.key(), signature.as_bytes(), b"abc")
        .unwrap());
    let reexported = gw.export_public_key_bytes(imported.key()).unwrap();
    assert_eq!(reexported, blob);
    drop(imported);
    assert_balanced(&gw);
}

#[test]
fn gost512_uses_its_own_containers() {
    let gw = gateway_with_box(ProviderKind::Gost512);
    let err = gw.check_container(ProviderKind::Gost256, BOX, PIN).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AcquireFailed);

    let creds = ContainerCredentials::new(ProviderKind::Gost512, BOX, PIN);
    let signature = gw.sign_with(&creds, b"data", KeySpec::Signature).unwrap();
    let public = gw.public_key(&creds, KeySpec::Signature).unwrap();
    assert_eq!(public.kind(), ProviderKind::Gost512);
    assert!(gw
        .verify_with_public_key(&public, b"data", signature.as_bytes())
        .unwrap());
    assert_balanced(&gw);
}

#[test]
fn missing_key_role_is_reported() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    let err = gw
        .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::KeyExchange)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::KeyNotFound);

    let err = gw
        .sign_message(ProviderKind::Gost256, BOX, PIN, b"x", KeySpec::KeyExchange)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignFailed);
    assert_balanced(&gw);
}

#[test]
fn existing_container_is_replaced_by_default() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    let old_key = {
        let creds = ContainerCredentials::new(ProviderKind::Gost256, BOX, PIN);
        gw.public_key(&creds, KeySpec::Signature).unwrap()
    };

    gw.create_container(ProviderKind::Gost256, BOX, b"5678").unwrap();
    assert_eq!(gw.provider().container_count(), 1);

    let err = gw.check_container(ProviderKind::Gost256, BOX, PIN).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PinRejected);
    let creds = ContainerCredentials::new(ProviderKind::Gost256, BOX, "5678");
    let new_key = gw.public_key(&creds, KeySpec::Signature).unwrap();
    assert_ne!(new_key, old_key);
    assert_balanced(&gw);
}

#[test]
fn existing_container_can_be_refused() {
    let gw = gateway_with_box(ProviderKind::Gost256).with_existing_container(ExistingContainer::Fail);
    let err = gw
        .create_container(ProviderKind::Gost256, BOX, b"5678")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContainerExists);
    gw.check_container(ProviderKind::Gost256, BOX, PIN).unwrap();
    assert_balanced(&gw);
}

#[test]
fn failed_replacement_surfaces_acquire_failure() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    gw.provider().fail_next(ProviderCall::DeleteContainer);
    let err = gw
        .create_container(ProviderKind::Gost256, BOX, b"5678")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AcquireFailed);
    gw.check_container(ProviderKind::Gost256, BOX, PIN).unwrap();
    assert_balanced(&gw);
}

#[test]
fn create_failures_release_everything() {
    let cases = [
        (ProviderCall::AcquireContext, ErrorKind::AcquireFailed),
        (ProviderCall::SetPin, ErrorKind::PinRejected),
        (ProviderCall::GenerateKey, ErrorKind::KeyGenFailed),
    ];
    for (call, expected) in cases {
        let gw = gateway();
        gw.provider().fail_next(call);
        let err = gw
            .create_container(ProviderKind::Gost256, BOX, PIN)
            .unwrap_err();
        assert_eq!(err.kind(), expected, "{call}");
        assert_eq!(err.provider_error().map(|e| e.call), Some(call));
        assert_eq!(gw.provider().container_count(), 0, "{call}");
        assert_balanced(&gw);
    }
}

#[test]
fn failed_create_leaves_the_name_free() {
    let gw = gateway().with_existing_container(ExistingContainer::Fail);
    gw.provider().fail_next(ProviderCall::GenerateKey);
    let err = gw
        .create_container(ProviderKind::Gost256, BOX, PIN)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyGenFailed);
    assert!(!gw.provider().has_container(ProviderKind::Gost256, BOX));

    gw.create_container(ProviderKind::Gost256, BOX, PIN).unwrap();
    gw.open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
        .map(drop)
        .unwrap();
    assert_balanced(&gw);
}

#[test]
fn failed_cleanup_keeps_the_original_error() {
    let sink = CollectingSink::default();
    let gw = CredentialGateway::new(SoftProvider::new()).with_sink(sink.clone());
    gw.provider().fail_next(ProviderCall::SetPin);
    gw.provider().fail_next(ProviderCall::DeleteContainer);
    let err = gw
        .create_container(ProviderKind::Gost256, BOX, PIN)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PinRejected);

    let reports = sink.0.lock();
    let calls: Vec<_> = reports.iter().map(|(_, e)| e.call).collect();
    assert_eq!(calls, [ProviderCall::SetPin, ProviderCall::DeleteContainer]);
    drop(reports);
    assert_eq!(gw.provider().container_count(), 1);
    assert_balanced(&gw);
}

#[test]
fn open_failures_release_everything() {
    let cases = [
        (ProviderCall::AcquireContext, ErrorKind::AcquireFailed),
        (ProviderCall::SetPin, ErrorKind::PinRejected),
        (ProviderCall::UserKey, ErrorKind::KeyNotFound),
    ];
    for (call, expected) in cases {
        let gw = gateway_with_box(ProviderKind::Gost256);
        gw.provider().fail_next(call);
        let err = gw
            .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
            .err()
            .unwrap();
        assert_eq!(err.kind(), expected, "{call}");
        assert_balanced(&gw);
    }
}

#[test]
fn sign_failures_release_everything() {
    let cases = [
        (ProviderCall::AcquireContext, ErrorKind::AcquireFailed),
        (ProviderCall::SetPin, ErrorKind::PinRejected),
        (ProviderCall::CreateHash, ErrorKind::HashInitFailed),
        (ProviderCall::HashData, ErrorKind::HashFailed),
        (ProviderCall::SignHash, ErrorKind::SignFailed),
    ];
    for (call, expected) in cases {
        let gw = gateway_with_box(ProviderKind::Gost256);
        gw.provider().fail_next(call);
        let err = gw
            .sign_message(ProviderKind::Gost256, BOX, PIN, b"hello", KeySpec::Signature)
            .unwrap_err();
        assert_eq!(err.kind(), expected, "{call}");
        assert_balanced(&gw);
    }
}

#[test]
fn second_phase_failures_release_everything() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    gw.provider().fail_nth(ProviderCall::SignHash, 2);
    let err = gw
        .sign_message(ProviderKind::Gost256, BOX, PIN, b"hello", KeySpec::Signature)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignFailed);
    assert_balanced(&gw);

    {
        let session = gw
            .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
            .unwrap();
        gw.provider().fail_nth(ProviderCall::ExportKey, 2);
        let err = gw.export_public_key_bytes(session.key()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExportFailed);
    }
    assert_balanced(&gw);

    let creds = ContainerCredentials::new(ProviderKind::Gost256, BOX, PIN);
    let public = gw.public_key(&creds, KeySpec::Signature).unwrap();
    gw.provider().fail_nth(ProviderCall::HashValue, 2);
    let err = gw.address(&public).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HashFailed);
    assert_balanced(&gw);
}

#[test]
fn verify_failures_release_everything() {
    let cases = [
        (ProviderCall::AcquireContext, ErrorKind::AcquireFailed),
        (ProviderCall::CreateHash, ErrorKind::HashInitFailed),
        (ProviderCall::HashData, ErrorKind::HashFailed),
    ];
    for (call, expected) in cases {
        let gw = gateway_with_box(ProviderKind::Gost256);
        let signature = gw
            .sign_message(ProviderKind::Gost256, BOX, PIN, b"hello", KeySpec::Signature)
            .unwrap();
        {
            let session = gw
                .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
                .unwrap();
            gw.provider().fail_next(call);
            let err = gw
                .verify_sign(ProviderKind::Gost256, session.key(), signature.as_bytes(), b"hello")
                .unwrap_err();
            assert_eq!(err.kind(), expected, "{call}");
        }
        assert_balanced(&gw);
    }
}

#[test]
fn verify_call_failure_reads_as_mismatch_and_is_reported() {
    let sink = CollectingSink::default();
    let gw = CredentialGateway::new(SoftProvider::new()).with_sink(sink.clone());
    gw.create_container(ProviderKind::Gost256, BOX, PIN).unwrap();
    let signature = gw
        .sign_message(ProviderKind::Gost256, BOX, PIN, b"hello", KeySpec::Signature)
        .unwrap();
    {
        let session = gw
            .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
            .unwrap();
        gw.provider().fail_next(ProviderCall::VerifySignature);
        let ok = gw
            .verify_sign(ProviderKind::Gost256, session.key(), signature.as_bytes(), b"hello")
            .unwrap();
        assert!(!ok);
    }
    let reports = sink.0.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "verify_sign");
    assert_eq!(reports[0].1.call, ProviderCall::VerifySignature);
    drop(reports);
    assert_balanced(&gw);
}

#[test]
fn key_transfer_failures_release_everything() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    let blob = {
        let session = gw
            .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
            .unwrap();
        gw.provider().fail_next(ProviderCall::ExportKey);
        let err = gw.export_public_key_bytes(session.key()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExportFailed);
        gw.export_public_key_bytes(session.key()).unwrap()
    };
    assert_balanced(&gw);

    for (call, expected) in [
        (ProviderCall::AcquireContext, ErrorKind::AcquireFailed),
        (ProviderCall::ImportKey, ErrorKind::ImportFailed),
    ] {
        gw.provider().fail_next(call);
        let err = gw
            .import_public_key(ProviderKind::Gost256, blob.as_bytes())
            .err()
            .unwrap();
        assert_eq!(err.kind(), expected, "{call}");
        assert_balanced(&gw);
    }
}

#[test]
fn provider_failures_reach_the_sink() {
    let sink = CollectingSink::default();
    let gw = CredentialGateway::new(SoftProvider::new()).with_sink(sink.clone());
    gw.provider().fail_next(ProviderCall::GenerateKey);
    gw.create_container(ProviderKind::Gost256, BOX, PIN).unwrap_err();

    let reports = sink.0.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "create_container");
    assert_eq!(
        reports[0].1,
        ProviderError::new(ProviderCall::GenerateKey, codes::NTE_FAIL)
    );
}

#[test]
fn credentials_load_checks_the_container() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    let creds = ContainerCredentials::new(ProviderKind::Gost256, BOX, PIN);
    let bytes = creds.to_bytes().unwrap();
    let loaded = gw.load_credentials(&bytes).unwrap();
    assert_eq!(loaded, creds);
    assert_eq!(loaded.to_string(), "Priv(ГОСТ Р 34.10-2012 256){testbox}");

    let wrong = ContainerCredentials::new(ProviderKind::Gost256, BOX, "9999")
        .to_bytes()
        .unwrap();
    let err = gw.load_credentials(&wrong).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PinRejected);

    let err = gw.load_credentials(&[0x7f, 0x01]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    assert_balanced(&gw);
}

#[test]
fn public_key_load_is_validated_by_the_provider() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    let creds = ContainerCredentials::new(ProviderKind::Gost256, BOX, PIN);
    let public = gw.public_key(&creds, KeySpec::Signature).unwrap();

    let loaded = gw.load_public_key(&public.to_bytes()).unwrap();
    assert_eq!(loaded, public);
    assert!(loaded.to_string().starts_with("Pub(ГОСТ Р 34.10-2012 256){50"));

    let mut garbage = vec![ProviderKind::Gost256.provider_type()];
    garbage.extend_from_slice(&[0xAA; 12]);
    let err = gw.load_public_key(&garbage).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImportFailed);

    let err = gw.load_public_key(&[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPublicKey);
    assert_balanced(&gw);
}

#[test]
fn batch_reports_each_entry() {
    let gw = gateway();
    gw.create_container(ProviderKind::Gost256, b"alice", b"a").unwrap();
    gw.create_container(ProviderKind::Gost512, b"bob", b"b").unwrap();
    let alice = ContainerCredentials::new(ProviderKind::Gost256, "alice", "a");
    let bob = ContainerCredentials::new(ProviderKind::Gost512, "bob", "b");
    let alice_pub = gw.public_key(&alice, KeySpec::Signature).unwrap();
    let bob_pub = gw.public_key(&bob, KeySpec::Signature).unwrap();

    let sig_a = gw.sign_with(&alice, b"one", KeySpec::Signature).unwrap();
    let sig_b = gw.sign_with(&bob, b"two", KeySpec::Signature).unwrap();

    let mut batch = BatchVerifier::new();
    assert_eq!(batch.verify(&gw).unwrap(), (true, vec![]));

    batch.add(alice_pub.clone(), b"one", sig_a.as_bytes());
    batch.add(bob_pub.clone(), b"two", sig_b.as_bytes());
    assert_eq!(batch.verify(&gw).unwrap(), (true, vec![true, true]));

    batch.add(bob_pub, b"one", sig_a.as_bytes());
    assert_eq!(batch.len(), 3);
    assert_eq!(batch.verify(&gw).unwrap(), (false, vec![true, true, false]));

    let mut broken = BatchVerifier::new();
    broken.add(
        PublicKey::new(ProviderKind::Gost256, vec![1, 2, 3].into()),
        b"one",
        sig_a.as_bytes(),
    );
    let err = broken.verify(&gw).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImportFailed);
    assert_balanced(&gw);
}

#[test]
fn gateway_follows_settings() {
    let settings = GatewaySettings {
        existing_container: ExistingContainer::Fail,
        report_provider_errors: false,
        ..GatewaySettings::default()
    };
    let gw = CredentialGateway::from_settings(SoftProvider::new(), &settings);
    gw.create_container(settings.provider_kind, BOX, PIN).unwrap();
    let err = gw
        .create_container(settings.provider_kind, BOX, PIN)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContainerExists);
}

#[test]
fn address_identifies_a_key() {
    let gw = gateway();
    gw.create_container(ProviderKind::Gost256, b"alice", b"a").unwrap();
    gw.create_container(ProviderKind::Gost512, b"bob", b"b").unwrap();
    let alice = ContainerCredentials::new(ProviderKind::Gost256, "alice", "a");
    let bob = ContainerCredentials::new(ProviderKind::Gost512, "bob", "b");
    let alice_pub = gw.public_key(&alice, KeySpec::Signature).unwrap();
    let bob_pub = gw.public_key(&bob, KeySpec::Signature).unwrap();

    let address = gw.address(&alice_pub).unwrap();
    assert_eq!(address.as_bytes().len(), 32);
    assert_eq!(address, gw.address(&alice_pub).unwrap());
    assert_eq!(gw.address(&bob_pub).unwrap().as_bytes().len(), 32);

    let reloaded = gw.load_public_key(&alice_pub.to_bytes()).unwrap();
    assert!(gw.same_key(&alice_pub, &reloaded).unwrap());
    assert!(!gw.same_key(&alice_pub, &bob_pub).unwrap());
    assert_balanced(&gw);
}

#[test]
fn address_failures_release_everything() {
    let gw = gateway_with_box(ProviderKind::Gost256);
    let creds = ContainerCredentials::new(ProviderKind::Gost256, BOX, PIN);
    let public = gw.public_key(&creds, KeySpec::Signature).unwrap();
    let cases = [
        (ProviderCall::AcquireContext, ErrorKind::AcquireFailed),
        (ProviderCall::CreateHash, ErrorKind::HashInitFailed),
        (ProviderCall::HashData, ErrorKind::HashFailed),
        (ProviderCall::HashValue, ErrorKind::HashFailed),
    ];
    for (call, expected) in cases {
        gw.provider().fail_next(call);
        let err = gw.address(&public).unwrap_err();
        assert_eq!(err.kind(), expected, "{call}");
        assert_balanced(&gw);
    }
}

#[test]
fn keys_from_another_gateway_are_refused() {
    let first = gateway_with_box(ProviderKind::Gost256);
    let second = gateway_with_box(ProviderKind::Gost256);
    let signature = first
        .sign_message(ProviderKind::Gost256, BOX, PIN, b"hello", KeySpec::Signature)
        .unwrap();
    {
        let session = first
            .open_container(ProviderKind::Gost256, BOX, PIN, KeySpec::Signature)
            .unwrap();
        let err = second
            .verify_sign(ProviderKind::Gost256, session.key(), signature.as_bytes(), b"hello")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ForeignKey);
        let err = second.export_public_key_bytes(session.key()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ForeignKey);
        assert!(first
            .verify_sign(ProviderKind::Gost256, session.key(), signature.as_bytes(), b"hello")
            .unwrap());
    }
    assert_balanced(&first);
    assert_balanced(&second);
}
