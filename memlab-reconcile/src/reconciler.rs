// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use memlab_inspect::ProcessInspector;
use memlab_types::{DetectionRequest, Pid, Policy, PolicyCache, ProcessIdentity};
use tokio::sync::mpsc;
use tracing::debug;

use crate::ReconcileError;

/// Owns the policy cache and the sending half of the detection-request
/// channel. The only component allowed to mutate the cache — nothing
/// downstream of it needs its own synchronization.
pub struct Reconciler {
    cache: PolicyCache,
    requests_tx: mpsc::UnboundedSender<DetectionRequest>,
}

impl Reconciler {
    /// Builds a reconciler along with the receiving half of its
    /// detection-request stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DetectionRequest>) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        (
            Reconciler {
                cache: HashMap::new(),
                requests_tx,
            },
            requests_rx,
        )
    }

    /// Number of pids currently tracked. Exposed for tests and
    /// diagnostics only.
    pub fn cached_pid_count(&self) -> usize {
        self.cache.len()
    }

    /// Applies one policy received from the control plane, dispatching
    /// the detection requests its acceptance implies.
    ///
    /// 1. An irrelevant policy is a silent no-op.
    /// 2. The policy's `(pid, process_create_time)` must match a live
    ///    process, or this fails with `ExpiredDetectionConfig`.
    /// 3. A brand-new pid dispatches all three detection requests; an
    ///    unchanged (or stale) `modified_at` is a no-op; otherwise one
    ///    request is dispatched per flag that changed, and only then is
    ///    the cache entry replaced.
    pub fn put_detection_config(
        &mut self,
        policy: Policy,
        inspector: &ProcessInspector,
    ) -> Result<(), ReconcileError> {
        if !policy.is_relevant {
            return Ok(());
        }

        let live_identity = inspector
            .exists_with_create_time(policy.pid.as_u32())
            .map(|create_time| ProcessIdentity::new(policy.pid, create_time));
        let expected_identity = ProcessIdentity::new(policy.pid, policy.process_create_time);
        if live_identity != Some(expected_identity) {
            return Err(ReconcileError::ExpiredDetectionConfig(policy.pid.as_u32()));
        }

        match self.cache.get(&policy.pid) {
            None => {
                self.dispatch_all(&policy)?;
                self.cache.insert(policy.pid, policy);
            }
            Some(cached) if policy.modified_at <= cached.modified_at => {
                debug!(pid = %policy.pid, "detection config unchanged, skipping");
            }
            Some(cached) => {
                self.dispatch_changed(cached, &policy)?;
                self.cache.insert(policy.pid, policy);
            }
        }

        Ok(())
    }

    fn dispatch_all(&self, policy: &Policy) -> Result<(), ReconcileError> {
        self.send(signals_request(policy))?;
        self.send(thresholds_request(policy))?;
        self.send(hangs_request(policy))?;
        Ok(())
    }

    fn dispatch_changed(&self, cached: &Policy, policy: &Policy) -> Result<(), ReconcileError> {
        if policy.detect_signals != cached.detect_signals {
            self.send(signals_request(policy))?;
        }
        if policy.detect_thresholds != cached.detect_thresholds
            || policy.cpu_threshold != cached.cpu_threshold
            || policy.memory_threshold != cached.memory_threshold
        {
            self.send(thresholds_request(policy))?;
        }
        if policy.detect_suspected_hangs != cached.detect_suspected_hangs
            || policy.suspected_hang_duration_secs != cached.suspected_hang_duration_secs
        {
            self.send(hangs_request(policy))?;
        }
        Ok(())
    }

    fn send(&self, request: DetectionRequest) -> Result<(), ReconcileError> {
        self.requests_tx
            .send(request)
            .map_err(|_| ReconcileError::ChannelClosed)
    }

    /// Drops the cached policy for `pid`, if any. Used when the control
    /// plane reports a pid as expired so a later re-proposal under the
    /// same pid is treated as brand new rather than a stale update.
    pub fn forget(&mut self, pid: Pid) {
        self.cache.remove(&pid);
    }
}

fn signals_request(policy: &Policy) -> DetectionRequest {
    DetectionRequest::DetectSignals {
        pid: policy.pid,
        turned_on: policy.detect_signals,
        restart_on_signal: policy.restart_on_signal,
    }
}

fn thresholds_request(policy: &Policy) -> DetectionRequest {
    DetectionRequest::DetectThresholds {
        pid: policy.pid,
        turned_on: policy.detect_thresholds,
        cpu_threshold: policy.cpu_threshold,
        memory_threshold: policy.memory_threshold,
        restart_on_cpu_threshold: policy.restart_on_cpu_threshold,
        restart_on_memory_threshold: policy.restart_on_memory_threshold,
    }
}

fn hangs_request(policy: &Policy) -> DetectionRequest {
    DetectionRequest::DetectSuspectedHangs {
        pid: policy.pid,
        turned_on: policy.detect_suspected_hangs,
        duration_secs: policy.suspected_hang_duration_secs,
        restart_on_suspected_hang: policy.restart_on_suspected_hang,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_pid() -> u32 {
        std::process::id()
    }

    fn fixture_for_live_process() -> Policy {
        let inspector = ProcessInspector::new();
        let create_time = inspector
            .exists_with_create_time(live_pid())
            .expect("test process must be observable");
        let mut policy = Policy::test_fixture(live_pid());
        policy.process_create_time = create_time;
        policy.modified_at = create_time;
        policy
    }

    #[test]
    fn irrelevant_policy_is_silent_no_op() {
        let (mut reconciler, mut rx) = Reconciler::new();
        let mut policy = fixture_for_live_process();
        policy.is_relevant = false;

        reconciler
            .put_detection_config(policy, &ProcessInspector::new())
            .unwrap();

        assert_eq!(reconciler.cached_pid_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn expired_policy_is_rejected() {
        let (mut reconciler, _rx) = Reconciler::new();
        let mut policy = fixture_for_live_process();
        policy.process_create_time = policy.process_create_time + chrono::Duration::seconds(1);

        let err = reconciler
            .put_detection_config(policy, &ProcessInspector::new())
            .unwrap_err();

        assert!(matches!(err, ReconcileError::ExpiredDetectionConfig(_)));
    }

    #[test]
    fn fresh_policy_dispatches_all_three_requests() {
        let (mut reconciler, mut rx) = Reconciler::new();
        let policy = fixture_for_live_process();

        reconciler
            .put_detection_config(policy, &ProcessInspector::new())
            .unwrap();

        let mut tags = Vec::new();
        while let Ok(req) = rx.try_recv() {
            tags.push(req.tag().to_owned());
        }
        assert_eq!(tags.len(), 3);
        assert!(tags.contains(&"detect_signals".to_owned()));
        assert!(tags.contains(&"detect_thresholds".to_owned()));
        assert!(tags.contains(&"detect_suspected_hangs".to_owned()));
    }

    #[test]
    fn unchanged_modified_at_is_a_no_op() {
        let (mut reconciler, mut rx) = Reconciler::new();
        let policy = fixture_for_live_process();
        let inspector = ProcessInspector::new();

        reconciler.put_detection_config(policy.clone(), &inspector).unwrap();
        while rx.try_recv().is_ok() {}

        reconciler.put_detection_config(policy, &inspector).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn only_changed_flags_are_redispatched() {
        let (mut reconciler, mut rx) = Reconciler::new();
        let inspector = ProcessInspector::new();
        let initial = fixture_for_live_process();

        reconciler.put_detection_config(initial.clone(), &inspector).unwrap();
        while rx.try_recv().is_ok() {}

        let mut updated = initial.clone();
        updated.detect_signals = !initial.detect_signals;
        updated.modified_at = initial.modified_at + chrono::Duration::seconds(1);

        reconciler.put_detection_config(updated, &inspector).unwrap();

        let req = rx.try_recv().expect("one request expected");
        assert_eq!(req.tag(), "detect_signals");
        assert!(rx.try_recv().is_err());
    }
}
