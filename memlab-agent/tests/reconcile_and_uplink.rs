// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end coverage of policy reconciliation and control-plane uplink
//! behavior that doesn't require a live kernel module: fresh policy
//! dispatch, partial-change redispatch, and pid-reuse expiry with its
//! mark-irrelevant acknowledgment. Signal delivery and the detector
//! capacity bound need a live kernel communicator and are covered at the
//! unit level inside `memlab-detect` instead.

use httpmock::MockServer;
use memlab_inspect::ProcessInspector;
use memlab_reconcile::{ReconcileError, Reconciler};
use memlab_types::{Policy, UplinkConfig};
use memlab_uplink::UplinkClient;

fn live_process_policy() -> Policy {
    let inspector = ProcessInspector::new();
    let create_time = inspector
        .exists_with_create_time(std::process::id())
        .expect("test process must be observable via /proc");
    let mut policy = Policy::test_fixture(std::process::id());
    policy.process_create_time = create_time;
    policy.modified_at = create_time;
    policy
}

#[test]
fn fresh_signals_only_policy_dispatches_one_request_per_flag() {
    let (mut reconciler, mut rx) = Reconciler::new();
    let policy = live_process_policy();

    reconciler
        .put_detection_config(policy, &ProcessInspector::new())
        .expect("live process with matching create time must be accepted");

    let mut tags: Vec<String> = Vec::new();
    while let Ok(req) = rx.try_recv() {
        tags.push(req.tag().to_owned());
    }
    assert_eq!(tags.len(), 3, "a brand new policy dispatches all three requests");
}

#[test]
fn disabling_signals_on_a_known_policy_only_redispatches_signals() {
    let (mut reconciler, mut rx) = Reconciler::new();
    let inspector = ProcessInspector::new();
    let initial = live_process_policy();

    reconciler.put_detection_config(initial.clone(), &inspector).unwrap();
    while rx.try_recv().is_ok() {}

    let mut disabled = initial.clone();
    disabled.detect_signals = false;
    disabled.modified_at = initial.modified_at + chrono::Duration::seconds(1);

    reconciler.put_detection_config(disabled, &inspector).unwrap();

    let request = rx.try_recv().expect("exactly one request expected");
    assert_eq!(request.tag(), "detect_signals");
    assert!(!request.turned_on());
    assert!(rx.try_recv().is_err());
}

#[test]
fn policy_with_mismatched_create_time_is_expired() {
    let (mut reconciler, _rx) = Reconciler::new();
    let mut policy = live_process_policy();
    policy.process_create_time = policy.process_create_time + chrono::Duration::seconds(60);

    let err = reconciler
        .put_detection_config(policy, &ProcessInspector::new())
        .unwrap_err();

    assert!(matches!(err, ReconcileError::ExpiredDetectionConfig(_)));
}

#[tokio::test]
async fn expired_policy_is_acknowledged_via_mark_irrelevant() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST)
            .path(format!("/detection_configs/mark_irrelevant/{}", std::process::id()));
        then.status(200);
    });

    let (mut reconciler, _rx) = Reconciler::new();
    let mut policy = live_process_policy();
    policy.process_create_time = policy.process_create_time + chrono::Duration::seconds(60);

    let err = reconciler
        .put_detection_config(policy.clone(), &ProcessInspector::new())
        .unwrap_err();
    let ReconcileError::ExpiredDetectionConfig(pid) = err else {
        panic!("expected ExpiredDetectionConfig");
    };
    assert_eq!(pid, policy.pid.as_u32());

    let uplink_config = UplinkConfig::new(server.base_url(), "tok");
    let uplink = UplinkClient::new(&uplink_config).unwrap();
    uplink.mark_irrelevant(&pid.to_string()).await.unwrap();

    mock.assert();
}

#[tokio::test]
async fn config_fetcher_pulls_policies_and_feeds_the_reconciler() {
    let server = MockServer::start();
    let policy = live_process_policy();
    let policy_json = serde_json::to_value(&policy).unwrap();

    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/detection_configs/by_machine/host-1/");
        then.status(200).json_body(serde_json::json!([policy_json]));
    });

    let uplink_config = UplinkConfig::new(server.base_url(), "tok");
    let uplink = UplinkClient::new(&uplink_config).unwrap();
    let policies = uplink.list_detection_configs("host-1").await.unwrap();

    mock.assert();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0].pid, policy.pid);

    let (mut reconciler, mut rx) = Reconciler::new();
    let inspector = ProcessInspector::new();
    for policy in policies {
        reconciler.put_detection_config(policy, &inspector).unwrap();
    }
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    assert_eq!(count, 3);
}
