// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memlab_kernel::KernelClient;
use memlab_pipeline::Operator;
use memlab_types::DetectionRequest;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tracing::{error, info_span, Instrument};

use crate::report::DetectionReport;
use crate::signal::SignalDetector;
use crate::DetectorError;

/// The three detector families the control plane can request. Only
/// `Signals` is implemented; `Thresholds` and `Hangs` are declared so the
/// registry's bookkeeping (name resolution, existence checks) works for
/// them, but starting their detection loop is a deliberate stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    Signals,
    Thresholds,
    Hangs,
}

impl DetectorKind {
    fn from_request(request: &DetectionRequest) -> Self {
        match request {
            DetectionRequest::DetectSignals { .. } => DetectorKind::Signals,
            DetectionRequest::DetectThresholds { .. } => DetectorKind::Thresholds,
            DetectionRequest::DetectSuspectedHangs { .. } => DetectorKind::Hangs,
        }
    }
}

enum DetectorHandle {
    Signals(Arc<SignalDetector>),
    Unimplemented,
}

struct Entry {
    kind: DetectorKind,
    handle: DetectorHandle,
}

/// Bounded-concurrency registry of running detectors, keyed by
/// `<tag>.<pid>`. Enforces at most `max_concurrent_detectors` detection
/// loops running at once via a counting semaphore.
pub struct DetectorRegistry {
    communicator: Arc<dyn KernelClient>,
    entries: RwLock<HashMap<String, Entry>>,
    semaphore: Arc<Semaphore>,
    reports_tx: mpsc::Sender<DetectionReport>,
    reports_rx: Mutex<Option<mpsc::Receiver<DetectionReport>>>,
    running: Arc<AtomicUsize>,
}

impl DetectorRegistry {
    pub fn new(communicator: Arc<dyn KernelClient>, max_concurrent_detectors: usize) -> Self {
        // Capacity 1: the closest tokio primitive to the rendezvous
        // channel the detector-to-registry handoff calls for.
        let (reports_tx, reports_rx) = mpsc::channel(1);
        DetectorRegistry {
            communicator,
            entries: RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent_detectors)),
            reports_tx,
            reports_rx: Mutex::new(Some(reports_rx)),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Takes ownership of the aggregate report stream. Must be called at
    /// most once; intended for the control plane's event-uplink task.
    pub async fn take_reports_receiver(&self) -> Option<mpsc::Receiver<DetectionReport>> {
        self.reports_rx.lock().await.take()
    }

    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn add_detector(
        &self,
        request: DetectionRequest,
        operators: Vec<Box<dyn Operator>>,
        start: bool,
    ) -> Result<(), DetectorError> {
        let name = request.name();
        let kind = DetectorKind::from_request(&request);
        let pid = request.pid();

        {
            let entries = self.entries.read().await;
            if entries.contains_key(&name) {
                return Err(DetectorError::AlreadyExists(name));
            }
        }

        let handle = match kind {
            DetectorKind::Signals => DetectorHandle::Signals(Arc::new(SignalDetector::new(
                pid,
                Arc::clone(&self.communicator),
                operators,
                self.reports_tx.clone(),
            ))),
            DetectorKind::Thresholds | DetectorKind::Hangs => DetectorHandle::Unimplemented,
        };

        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&name) {
                return Err(DetectorError::AlreadyExists(name));
            }
            entries.insert(name.clone(), Entry { kind, handle });
        }

        if !start {
            return Ok(());
        }

        self.start_detector(&name).await
    }

    async fn start_detector(&self, name: &str) -> Result<(), DetectorError> {
        let detector = {
            let entries = self.entries.read().await;
            match entries.get(name) {
                Some(Entry { handle: DetectorHandle::Signals(detector), .. }) => {
                    Arc::clone(detector)
                }
                Some(Entry { handle: DetectorHandle::Unimplemented, .. }) => {
                    return Err(DetectorError::NotImplemented);
                }
                None => return Err(DetectorError::DoesNotExist(name.to_owned())),
            }
        };

        // Acquired here, not inside the spawned task: capacity is
        // reserved before this call returns, so a caller at capacity
        // blocks on `add_detector` itself rather than racing a
        // background task for a permit that may never free up.
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| DetectorError::ConstructionFailed("registry semaphore is closed".to_owned()))?;

        let running = Arc::clone(&self.running);
        running.fetch_add(1, Ordering::SeqCst);

        let span = info_span!("detector", name = %name);
        let name_owned = name.to_owned();

        tokio::spawn(
            async move {
                if let Err(err) = detector.start_detection_loop().await {
                    error!(name = %name_owned, %err, "detector failed to start");
                }
                detector.wait_until_completion().await;

                running.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }
            .instrument(span),
        );

        Ok(())
    }

    /// Stops the named detector. If no detector is registered under that
    /// name, constructs one anyway and stops it, so a stop request
    /// arriving after a process restart still clears any lingering
    /// kernel-side watch state.
    pub async fn remove_detector(
        &self,
        request: DetectionRequest,
        operators: Vec<Box<dyn Operator>>,
    ) -> Result<(), DetectorError> {
        let name = request.name();
        let kind = DetectorKind::from_request(&request);
        let pid = request.pid();

        let existing = {
            let mut entries = self.entries.write().await;
            entries.remove(&name)
        };

        let handle = match existing {
            Some(entry) => entry.handle,
            None => match kind {
                DetectorKind::Signals => DetectorHandle::Signals(Arc::new(SignalDetector::new(
                    pid,
                    Arc::clone(&self.communicator),
                    operators,
                    self.reports_tx.clone(),
                ))),
                DetectorKind::Thresholds | DetectorKind::Hangs => DetectorHandle::Unimplemented,
            },
        };

        match handle {
            DetectorHandle::Signals(detector) => detector.stop_detection().await,
            DetectorHandle::Unimplemented => Ok(()),
        }
    }

    /// Stops every currently registered detector and empties the
    /// registry. Used on agent shutdown; unlike `remove_detector`, this
    /// never constructs new detectors for names that aren't present,
    /// since there's nothing left to idempotently clear.
    pub async fn stop(&self) {
        let entries = {
            let mut entries = self.entries.write().await;
            std::mem::take(&mut *entries)
        };

        for (name, entry) in entries {
            if let DetectorHandle::Signals(detector) = entry.handle {
                if let Err(err) = detector.stop_detection().await {
                    error!(name = %name, %err, "failed to stop detector during registry shutdown");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{AlwaysSucceeds, FakeKernelClient};
    use memlab_types::Pid;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn signals_request(pid: u32) -> DetectionRequest {
        DetectionRequest::DetectSignals {
            pid: Pid(pid),
            turned_on: true,
            restart_on_signal: false,
        }
    }

    fn operators() -> Vec<Box<dyn Operator>> {
        vec![Box::new(AlwaysSucceeds)]
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let registry = DetectorRegistry::new(Arc::new(FakeKernelClient::new()), 5);

        registry.add_detector(signals_request(1), operators(), false).await.unwrap();
        let err = registry
            .add_detector(signals_request(1), operators(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, DetectorError::AlreadyExists(name) if name == "detect_signals.1"));
    }

    #[tokio::test]
    async fn remove_detector_on_absent_name_is_idempotent() {
        let fake = Arc::new(FakeKernelClient::new());
        let registry = DetectorRegistry::new(Arc::clone(&fake), 5);

        registry.remove_detector(signals_request(42), operators()).await.unwrap();
        registry.remove_detector(signals_request(42), operators()).await.unwrap();

        // Constructs-and-stops both times: the kernel side still observes
        // a balanced unwatch, never a crash from a missing entry.
        assert_eq!(fake.unwatched(), vec![42, 42]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn add_detector_blocks_at_capacity() {
        let fake = Arc::new(FakeKernelClient::new());
        let registry = Arc::new(DetectorRegistry::new(Arc::clone(&fake), 2));

        registry.add_detector(signals_request(1), operators(), true).await.unwrap();
        registry.add_detector(signals_request(2), operators(), true).await.unwrap();
        assert_eq!(registry.running_count(), 2);

        let registry_for_third = Arc::clone(&registry);
        let third = tokio::spawn(async move {
            registry_for_third.add_detector(signals_request(3), operators(), true).await
        });

        // The registry is at capacity, so the third call should still be
        // blocked on the semaphore, not merely racing a background task
        // for a permit.
        sleep(Duration::from_millis(50)).await;
        assert!(!third.is_finished(), "add_detector should block while at capacity");
        assert_eq!(registry.running_count(), 2, "capacity bound violated");

        // Freeing one permit lets the third detector's add_detector call
        // complete.
        registry.remove_detector(signals_request(1), operators()).await.unwrap();
        timeout(Duration::from_secs(1), third)
            .await
            .expect("add_detector completes once capacity frees up")
            .unwrap()
            .unwrap();

        assert!(fake.watched().contains(&3));
        assert_eq!(registry.running_count(), 2);

        registry.remove_detector(signals_request(2), operators()).await.unwrap();
        registry.remove_detector(signals_request(3), operators()).await.unwrap();
    }
}
