// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use memlab_detect::DetectorRegistry;
use memlab_inspect::{HostFacts, ProcessInspector, ProcessList};
use memlab_pipeline::{CollectMetadata, Operator};
use memlab_reconcile::{ReconcileError, Reconciler};
use memlab_types::DetectionRequest;
use memlab_uplink::UplinkClient;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::cli::ResolvedIntervals;

/// Wires the kernel communicator, detector registry, reconciler and
/// uplink client together: six cooperating tasks, started in an order
/// chosen to avoid races (the event uplink and
/// registry runner must be up before detectors can be started; the
/// process-list reporter must not fire before the first host-status
/// report has gone out).
pub struct ControlPlane {
    registry: Arc<DetectorRegistry>,
    uplink: Arc<UplinkClient>,
    machine_id: String,
    own_pid: u32,
    intervals: ResolvedIntervals,
    cancel: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ControlPlane {
    pub fn new(
        registry: Arc<DetectorRegistry>,
        uplink: Arc<UplinkClient>,
        machine_id: String,
        own_pid: u32,
        intervals: ResolvedIntervals,
    ) -> Self {
        ControlPlane {
            registry,
            uplink,
            machine_id,
            own_pid,
            intervals,
            cancel: CancellationToken::new(),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn start(&self) {
        let mut tasks = Vec::with_capacity(6);

        tasks.push(self.spawn_event_uplink().await);
        tasks.push(self.spawn_registry_runner());

        let (reconciler, requests_rx) = Reconciler::new();
        tasks.push(self.spawn_request_handler(requests_rx));
        tasks.push(self.spawn_config_fetcher(reconciler));

        let host_status_done = Arc::new(Notify::new());
        tasks.push(self.spawn_host_status_reporter(Arc::clone(&host_status_done)));
        tasks.push(self.spawn_process_list_reporter(host_status_done));

        *self.tasks.lock().unwrap_or_else(|e| e.into_inner()) = tasks;
    }

    pub async fn stop(&self) {
        self.registry.stop().await;
        self.cancel.cancel();

        let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Task 1: drains the registry's aggregate report stream and POSTs
    /// each merged event to `process_events/`. Unexpected closure of this
    /// channel trips the root scope: it signals a programming error, not
    /// a recoverable condition.
    async fn spawn_event_uplink(&self) -> JoinHandle<()> {
        let mut reports_rx = self
            .registry
            .take_reports_receiver()
            .await
            .expect("detection_reports receiver taken exactly once, at startup");
        let uplink = Arc::clone(&self.uplink);
        let machine_id = self.machine_id.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let report = tokio::select! {
                    _ = cancel.cancelled() => return,
                    report = reports_rx.recv() => report,
                };
                let Some(report) = report else {
                    error!("detection reports channel closed unexpectedly, shutting down");
                    cancel.cancel();
                    return;
                };

                let mut event = report.payload;
                event.insert("pid".to_owned(), Value::from(report.pid.as_u32()));
                event.insert("machine_id".to_owned(), Value::from(machine_id.clone()));

                if let Err(err) = uplink.push_event(&event).await {
                    error!(%err, pid = %report.pid, "failed to push detection event");
                }
            }
        })
    }

    /// Task 2: the registry has no independent background loop of its
    /// own (detectors are spawned on demand by `add_detector`); this
    /// task's sole job is to hold the registry's place in the six-task
    /// startup topology and exit on root cancellation.
    fn spawn_registry_runner(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
        })
    }

    /// Task 3: drains detection requests emitted by the reconciler and
    /// turns each into an `add_detector`/`remove_detector` call on the
    /// registry. Unexpected closure trips the root scope, same as task 1.
    fn spawn_request_handler(
        &self,
        mut requests_rx: tokio::sync::mpsc::UnboundedReceiver<DetectionRequest>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    _ = cancel.cancelled() => return,
                    request = requests_rx.recv() => request,
                };
                let Some(request) = request else {
                    error!("detection requests channel closed unexpectedly, shutting down");
                    cancel.cancel();
                    return;
                };

                let operators = operators_for(&request);
                let turned_on = request.turned_on();
                let name = request.name();

                let result = if turned_on {
                    registry.add_detector(request, operators, true).await
                } else {
                    registry.remove_detector(request, operators).await
                };

                if let Err(err) = result {
                    error!(name = %name, %err, "failed to apply detection request");
                }
            }
        })
    }

    /// Task 4: pulls policies from the control plane on
    /// `detection_configs_polling_interval` and feeds each through the
    /// reconciler; an `ExpiredDetectionConfig` result is acknowledged by
    /// marking the policy irrelevant upstream.
    fn spawn_config_fetcher(&self, mut reconciler: Reconciler) -> JoinHandle<()> {
        let uplink = Arc::clone(&self.uplink);
        let machine_id = self.machine_id.clone();
        let inspector = ProcessInspector::new();
        let interval = self.intervals.detection_configs;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let policies = match uplink.list_detection_configs(&machine_id).await {
                    Ok(policies) => policies,
                    Err(err) => {
                        error!(%err, "failed to pull detection configs");
                        continue;
                    }
                };

                for policy in policies {
                    let pid = policy.pid;
                    match reconciler.put_detection_config(policy, &inspector) {
                        Ok(()) => {}
                        Err(ReconcileError::ExpiredDetectionConfig(pid)) => {
                            reconciler.forget(memlab_types::Pid(pid));
                            expire(&uplink, pid).await;
                        }
                        Err(ReconcileError::ChannelClosed) => {
                            error!(pid = %pid, "detection request channel closed unexpectedly, shutting down");
                            cancel.cancel();
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Task 5: immediate host-status report, then one every
    /// `host_status_report_interval`. Signals `host_status_done` after
    /// the first successful push so the process-list reporter can start.
    fn spawn_host_status_reporter(&self, host_status_done: Arc<Notify>) -> JoinHandle<()> {
        let uplink = Arc::clone(&self.uplink);
        let machine_id = self.machine_id.clone();
        let interval = self.intervals.host_status;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut signaled = false;

            loop {
                let report = HostFacts::collect(machine_id.clone());
                match uplink.push_host_status(&report).await {
                    Ok(()) => {
                        if !signaled {
                            host_status_done.notify_one();
                            signaled = true;
                        }
                    }
                    Err(err) => warn!(%err, "failed to push host status report"),
                }

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
            }
        })
    }

    /// Task 6: waits for the first host-status report to succeed, then
    /// an immediate process-list report, then one every
    /// `process_list_report_interval`.
    fn spawn_process_list_reporter(&self, host_status_done: Arc<Notify>) -> JoinHandle<()> {
        let uplink = Arc::clone(&self.uplink);
        let machine_id = self.machine_id.clone();
        let own_pid = self.own_pid;
        let interval = self.intervals.process_list;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = host_status_done.notified() => {}
            }

            let mut ticker = tokio::time::interval(interval);
            loop {
                let report = ProcessList::report(machine_id.clone(), own_pid);
                if let Err(err) = uplink.push_process_list(&report).await {
                    warn!(%err, "failed to push process list report");
                }

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
            }
        })
    }
}

/// Notifies the control plane that a detection config no longer matches
/// a live process, so the backend stops re-offering it. The reconciler
/// only detects the expiry; acknowledging it upstream is the caller's
/// job.
async fn expire(uplink: &UplinkClient, pid: u32) {
    if let Err(err) = uplink.mark_irrelevant(&pid.to_string()).await {
        error!(%err, pid, "failed to mark expired detection config irrelevant");
    }
}

fn operators_for(request: &DetectionRequest) -> Vec<Box<dyn Operator>> {
    match request {
        DetectionRequest::DetectSignals { .. } => vec![Box::new(CollectMetadata::new())],
        DetectionRequest::DetectThresholds { .. } | DetectionRequest::DetectSuspectedHangs { .. } => {
            Vec::new()
        }
    }
}
