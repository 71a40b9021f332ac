// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::time::Duration;

use common::*;
use ndn_validator::packet::ValidityPeriod;
use ndn_validator::{
    Data, ErrorCode, FetchStrategy, Interest, Outcome, SignatureInfo, SignatureType,
};

const ROOT: &str = "/root/KEY/k1/self/v1";
const ALICE: &str = "/root/alice/KEY/k2/root/v1";
const DEVICE: &str = "/root/alice/device/KEY/k3/alice/v1";

#[tokio::test]
async fn chain_to_anchor() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let network = Network::new();
    network.publish(&alice);

    let store = store(manual_clock());
    let validator = validator(
        &hierarchical_schema(&root),
        store.clone(),
        FetchStrategy::Network(network.clone()),
    );

    let calls = Calls::default();
    let state = validator
        .validate_data(
            alice.sign_data("/root/alice/doc1"),
            calls.on_success::<Data>(),
            calls.on_failure(),
        )
        .await;

    assert_eq!(state.outcome(), &Outcome::Success);
    assert_eq!(calls.get(), (1, 0));
    assert_eq!(network.calls(), 1);
    assert_eq!(state.certificate_chain().len(), 1);
    assert_eq!(state.certificate_chain()[0].name(), alice.name());
    assert!(store.find_trusted(&n("/root/alice/KEY/k2")).is_some());
    assert!(store.find_unverified(&n("/root/alice/KEY/k2")).is_none());
}

#[tokio::test]
async fn longer_chain_is_verified_from_the_anchor_down() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let device = Identity::issued(DEVICE, &alice);
    let network = Network::new();
    network.publish(&alice);
    network.publish(&device);

    let validator = validator(
        &hierarchical_schema(&root),
        store(manual_clock()),
        FetchStrategy::Network(network.clone()),
    );

    let calls = Calls::default();
    let state = validator
        .validate_data(
            device.sign_data("/root/alice/device/temp"),
            calls.on_success::<Data>(),
            calls.on_failure(),
        )
        .await;

    assert_eq!(calls.get(), (1, 0));
    assert_eq!(network.calls(), 2);
    let chain: Vec<_> = state.certificate_chain().iter().map(|c| c.name().clone()).collect();
    assert_eq!(chain, vec![n(ALICE), n(DEVICE)]);
}

#[tokio::test]
async fn name_outside_the_hierarchy_is_rejected_without_fetching() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let network = Network::new();
    network.publish(&alice);

    let validator = validator(
        &hierarchical_schema(&root),
        store(manual_clock()),
        FetchStrategy::Network(network.clone()),
    );

    let calls = Calls::default();
    let state = validator
        .validate_data(
            alice.sign_data("/other/doc1"),
            calls.on_success::<Data>(),
            calls.on_failure(),
        )
        .await;

    assert_eq!(state.error().map(|e| e.code), Some(ErrorCode::PolicyError));
    assert_eq!(calls.get(), (0, 1));
    assert_eq!(network.calls(), 0);
}

#[tokio::test]
async fn interest_without_rule() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let validator = validator(
        &hierarchical_schema(&root),
        store(manual_clock()),
        FetchStrategy::Offline,
    );

    let interest = alice.sign_interest("/root/alice/cmd", Some(NOW));
    let err = validator.check_interest(interest).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NoMatchingRule);
}

#[tokio::test]
async fn bad_certificate_signature_truncates_the_chain() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    // Names alice as issuer but is signed by its own key.
    let device = Identity::claiming(DEVICE, ALICE);
    let network = Network::new();
    network.publish(&alice);
    network.publish(&device);

    let store = store(manual_clock());
    let validator = validator(
        &hierarchical_schema(&root),
        store.clone(),
        FetchStrategy::Network(network),
    );

    let calls = Calls::default();
    let state = validator
        .validate_data(
            device.sign_data("/root/alice/device/temp"),
            calls.on_success::<Data>(),
            calls.on_failure(),
        )
        .await;

    assert_eq!(state.error().map(|e| e.code), Some(ErrorCode::InvalidSignature));
    assert_eq!(calls.get(), (0, 1));
    assert_eq!(state.depth(), 1);
    assert!(store.find_trusted(&n("/root/alice/KEY/k2")).is_none());
    assert!(store.find_unverified(&n("/root/alice/device/KEY/k3")).is_some());
}

#[tokio::test]
async fn bad_packet_signature() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let network = Network::new();
    network.publish(&alice);

    let store = store(manual_clock());
    let validator = validator(
        &hierarchical_schema(&root),
        store.clone(),
        FetchStrategy::Network(network),
    );

    let mut data = alice.sign_data("/root/alice/doc1");
    data.signature_value = root.sign(&data.signed_portion);

    let err = validator.check_data(data).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSignature);
    assert!(store.find_trusted(&n("/root/alice/KEY/k2")).is_none());
}

#[tokio::test]
async fn certificate_cycle_is_detected() {
    let a = Identity::claiming("/a/KEY/1/b/v1", "/b/KEY/1/a/v1");
    let b = Identity::claiming("/b/KEY/1/a/v1", "/a/KEY/1/b/v1");
    let network = Network::new();
    network.publish(&a);
    network.publish(&b);

    let schema = r#"
        [[rule]]
        id = "anyone"
        for = "data"

        [[rule.checker]]
        type = "customized"
        key-locator = { type = "name", regex = "^<>*$" }
    "#;
    let strategy = FetchStrategy::Network(network.clone());
    let validator = validator(schema, store(manual_clock()), strategy);

    let calls = Calls::default();
    let state = validator
        .validate_data(a.sign_data("/x"), calls.on_success::<Data>(), calls.on_failure())
        .await;

    assert_eq!(state.error().map(|e| e.code), Some(ErrorCode::LoopDetected));
    assert_eq!(calls.get(), (0, 1));
    assert_eq!(network.calls(), 2);
}

#[tokio::test]
async fn depth_limit() {
    let root = Identity::root(ROOT);
    let a = Identity::issued("/root/a/KEY/1/root/v1", &root);
    let b = Identity::issued("/root/a/b/KEY/1/a/v1", &a);
    let c = Identity::issued("/root/a/b/c/KEY/1/b/v1", &b);
    let network = Network::new();
    for id in [&a, &b, &c] {
        network.publish(id);
    }

    let mut validator = validator(
        &hierarchical_schema(&root),
        store(manual_clock()),
        FetchStrategy::Network(network),
    );

    validator.set_max_depth(2);
    let err = validator.check_data(c.sign_data("/root/a/b/c/d")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ExceededDepthLimit);

    // Three fetched certificates reach the anchor only with a depth above three.
    validator.set_max_depth(3);
    let err = validator.check_data(c.sign_data("/root/a/b/c/d")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ExceededDepthLimit);

    validator.set_max_depth(4);
    assert!(validator.check_data(c.sign_data("/root/a/b/c/d")).await.is_ok());
}

#[tokio::test]
async fn verified_certificates_are_reused() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let network = Network::new();
    network.publish(&alice);

    let validator = validator(
        &hierarchical_schema(&root),
        store(manual_clock()),
        FetchStrategy::Network(network.clone()),
    );

    let (first, second) = tokio::join!(
        validator.check_data(alice.sign_data("/root/alice/doc1")),
        validator.check_data(alice.sign_data("/root/alice/doc2")),
    );
    assert!(first.is_ok());
    assert!(second.is_ok());

    assert!(validator.check_data(alice.sign_data("/root/alice/doc3")).await.is_ok());
    assert_eq!(network.calls(), 1);
}

#[tokio::test]
async fn offline_uses_known_certificates_only() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);

    let store = store(manual_clock());
    let validator = validator(&hierarchical_schema(&root), store.clone(), FetchStrategy::Offline);

    let err = validator
        .check_data(alice.sign_data("/root/alice/doc1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CannotRetrieveCertificate);

    store.cache_unverified(alice.cert.clone());
    assert!(validator.check_data(alice.sign_data("/root/alice/doc1")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn unanswered_requests_are_retried() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let network = Network::silent();

    let validator = validator(
        &hierarchical_schema(&root),
        store(manual_clock()),
        FetchStrategy::Network(network.clone()),
    );

    let err = validator
        .check_data(alice.sign_data("/root/alice/doc1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CannotRetrieveCertificate);
    assert_eq!(network.calls(), 4);
}

#[tokio::test]
async fn malformed_certificate() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let network = Network::new();
    network.publish_raw(alice.name().clone(), b"{\"not\": \"a packet\"}".to_vec());

    let validator = validator(
        &hierarchical_schema(&root),
        store(manual_clock()),
        FetchStrategy::Network(network.clone()),
    );

    let err = validator
        .check_data(alice.sign_data("/root/alice/doc1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MalformedCertificate);
    assert_eq!(network.calls(), 1);
}

#[tokio::test]
async fn expired_certificate() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued_with(ALICE, &root, ValidityPeriod::new(0, NOW - 1));
    let network = Network::new();
    network.publish(&alice);

    let validator = validator(
        &hierarchical_schema(&root),
        store(manual_clock()),
        FetchStrategy::Network(network),
    );

    let err = validator
        .check_data(alice.sign_data("/root/alice/doc1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ExpiredCertificate);
}

#[tokio::test]
async fn signed_interest_freshness() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let bob = Identity::issued("/root/bob/KEY/k4/root/v1", &root);
    let network = Network::new();
    network.publish(&alice);
    network.publish(&bob);

    let schema = format!(
        r#"
        [[rule]]
        id = "commands"
        for = "interest"

        [[rule.checker]]
        type = "hierarchical"

        [[rule]]
        id = "certificates"
        for = "data"

        [[rule.checker]]
        type = "hierarchical"

        [[trust-anchor]]
        type = "base64"
        base64-string = "{}"
        "#,
        root.base64()
    );
    let clock = manual_clock();
    let validator = validator(&schema, store(clock.clone()), FetchStrategy::Network(network));

    let calls = Calls::default();
    let state = validator
        .validate_interest(
            alice.sign_interest("/root/alice/cmd/1", Some(NOW)),
            calls.on_success::<Interest>(),
            calls.on_failure(),
        )
        .await;
    assert_eq!(state.outcome(), &Outcome::Success);
    assert_eq!(calls.get(), (1, 0));
    assert_eq!(validator.replay_guard().len(), 1);

    // Replay of the same timestamp.
    let calls = Calls::default();
    let state = validator
        .validate_interest(
            alice.sign_interest("/root/alice/cmd/1", Some(NOW)),
            calls.on_success::<Interest>(),
            calls.on_failure(),
        )
        .await;
    assert_eq!(state.error().map(|e| e.code), Some(ErrorCode::StaleTimestamp));
    assert_eq!(calls.get(), (0, 1));

    // Newer timestamps are accepted long after the grace interval.
    clock.advance(Duration::from_secs(60));
    let interest = alice.sign_interest("/root/alice/cmd/2", Some(NOW + 1));
    assert!(validator.check_interest(interest).await.is_ok());

    let interest = alice.sign_interest("/root/alice/cmd/3", None);
    let err = validator.check_interest(interest).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::StaleTimestamp);

    // First use of a key is held to the grace interval.
    let interest = bob.sign_interest("/root/bob/cmd/1", Some(NOW));
    let err = validator.check_interest(interest).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::StaleTimestamp);
    let interest = bob.sign_interest("/root/bob/cmd/1", Some(NOW + 60_000));
    assert!(validator.check_interest(interest).await.is_ok());
}

#[tokio::test]
async fn rejected_interest_does_not_record_its_timestamp() {
    let root = Identity::root(ROOT);
    let mallory = Identity::root("/mallory/KEY/k6/self/v1");
    let schema = format!(
        "[[rule]]\nid = \"c\"\nfor = \"interest\"\n[[rule.checker]]\ntype = \"hierarchical\"\n\
         [[trust-anchor]]\ntype = \"base64\"\nbase64-string = \"{}\"\n",
        root.base64()
    );
    let validator = validator(&schema, store(manual_clock()), FetchStrategy::Offline);

    let interest = mallory.sign_interest("/root/alice/cmd", Some(NOW));
    let err = validator.check_interest(interest).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PolicyError);
    assert!(validator.replay_guard().is_empty());
}

#[tokio::test]
async fn fixed_signer_pins_the_certificate() {
    let admin = Identity::root("/admin/KEY/k9/self/v1");
    let other = Identity::root("/other/KEY/k1/self/v1");
    let network = Network::new();

    let schema = format!(
        r#"
        [[rule]]
        id = "admin commands"
        for = "interest"

        [[rule.filter]]
        type = "name"
        regex = "^<ops><>*$"

        [[rule.checker]]
        type = "fixed-signer"
        sig-type = "ecdsa-sha256"
        signer = [{{ type = "base64", base64-string = "{}" }}]
        "#,
        admin.base64()
    );
    let strategy = FetchStrategy::Network(network.clone());
    let validator = validator(&schema, store(manual_clock()), strategy);

    let interest = admin.sign_interest("/ops/restart", Some(NOW));
    assert!(validator.check_interest(interest).await.is_ok());

    let interest = other.sign_interest("/ops/restart", Some(NOW));
    let err = validator.check_interest(interest).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PolicyError);
    assert_eq!(network.calls(), 0);
}

#[tokio::test]
async fn key_locator_relation_compares_identities() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let network = Network::new();
    network.publish(&alice);

    let schema = format!(
        r#"
        [[rule]]
        id = "root-only"
        for = "data"

        [[rule.checker]]
        type = "customized"
        key-locator = {{ type = "name", name = "/root", relation = "equal" }}

        [[trust-anchor]]
        type = "base64"
        base64-string = "{}"
        "#,
        root.base64()
    );
    let strategy = FetchStrategy::Network(network.clone());
    let validator = validator(&schema, store(manual_clock()), strategy);

    assert!(validator.check_data(root.sign_data("/root/doc")).await.is_ok());

    let err = validator.check_data(alice.sign_data("/root/doc")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PolicyError);
    assert_eq!(network.calls(), 0);
}

#[tokio::test]
async fn anchor_directory_is_refreshed() {
    let root = Identity::root(ROOT);
    let alice = Identity::issued(ALICE, &root);
    let network = Network::new();
    network.publish(&alice);

    let dir = tempfile::tempdir().unwrap();
    let schema = format!(
        r#"
        [[rule]]
        id = "hierarchy"
        for = "data"

        [[rule.checker]]
        type = "hierarchical"

        [[trust-anchor]]
        type = "dir"
        dir = "{}"
        refresh = "10s"
        "#,
        dir.path().display()
    );
    let clock = manual_clock();
    let validator = validator(&schema, store(clock.clone()), FetchStrategy::Network(network));

    let err = validator
        .check_data(alice.sign_data("/root/alice/doc1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CannotRetrieveCertificate);

    std::fs::write(dir.path().join("root.cert"), root.base64()).unwrap();
    std::fs::write(dir.path().join("junk.cert"), "not base64!").unwrap();

    // Not due for a reload yet.
    let err = validator
        .check_data(alice.sign_data("/root/alice/doc1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CannotRetrieveCertificate);

    clock.advance(Duration::from_secs(10));
    assert!(validator.check_data(alice.sign_data("/root/alice/doc1")).await.is_ok());
}

#[tokio::test]
async fn any_anchor_accepts_unsigned_data() {
    let validator = validator(
        "[[trust-anchor]]\ntype = \"any\"",
        store(manual_clock()),
        FetchStrategy::Offline,
    );
    let data = Data::new(n("/anything"), SignatureInfo::new(SignatureType::DigestSha256));
    assert!(validator.check_data(data).await.is_ok());
}
