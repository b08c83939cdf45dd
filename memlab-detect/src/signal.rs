// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use memlab_kernel::KernelClient;
use memlab_pipeline::{Operator, Pipeline};
use memlab_types::Pid;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::report::DetectionReport;
use crate::DetectorError;

/// Detects signals the kernel module observed being delivered to one
/// watched pid. Multiple signal detectors share one
/// [`KernelCommunicator`]; each subscribes independently and filters the
/// shared notification stream to its own pid.
pub struct SignalDetector {
    pid: Pid,
    communicator: Arc<dyn KernelClient>,
    operators: Mutex<Option<Vec<Box<dyn Operator>>>>,
    cancel: CancellationToken,
    reports_tx: mpsc::Sender<DetectionReport>,
    handler: Mutex<Option<JoinHandle<()>>>,
    stopping: AtomicBool,
}

impl SignalDetector {
    pub fn new(
        pid: Pid,
        communicator: Arc<dyn KernelClient>,
        operators: Vec<Box<dyn Operator>>,
        reports_tx: mpsc::Sender<DetectionReport>,
    ) -> Self {
        SignalDetector {
            pid,
            communicator,
            operators: Mutex::new(Some(operators)),
            cancel: CancellationToken::new(),
            reports_tx,
            handler: Mutex::new(None),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub async fn start_detection_loop(&self) -> Result<(), DetectorError> {
        let operators = self
            .operators
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_default();

        let pid = self.pid;
        let communicator = Arc::clone(&self.communicator);
        let cancel = self.cancel.clone();
        let reports_tx = self.reports_tx.clone();
        let mut signals = communicator.subscribe();

        let handle = tokio::spawn(async move {
            let pipeline = Pipeline::new(operators, cancel.clone());
            loop {
                let signal = tokio::select! {
                    _ = cancel.cancelled() => break,
                    signal = signals.recv() => signal,
                };
                let Some(signal) = signal else { break };

                if signal.pid != pid.as_u32() {
                    continue;
                }

                // Processed strictly one at a time: the next recv only
                // happens after this one's pipeline has finished and its
                // report (if any) has been handed off.
                let outcome = pipeline.run(pid).await;

                if let Err(err) = communicator.notify_handled_signal(signal.pid) {
                    error!(%err, pid = signal.pid, "failed to notify kernel of handled signal");
                }

                match outcome {
                    Ok(payload) => {
                        let _ = reports_tx.send(DetectionReport { pid, payload }).await;
                    }
                    Err(err) => {
                        error!(%err, pid = signal.pid, "signal detection pipeline failed");
                    }
                }
            }
        });

        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        self.communicator
            .watch_process(self.pid.as_u32())
            .map_err(|err| DetectorError::Kernel(err.to_string()))
    }

    /// Idempotent: a second call is a no-op. Unwatches the pid with the
    /// kernel first; the cancellation and the wait for the detection
    /// loop to finish happen regardless of whether that call succeeds,
    /// so a kernel-side failure never leaves the detection loop running.
    pub async fn stop_detection(&self) -> Result<(), DetectorError> {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let unwatch_result = self
            .communicator
            .unwatch_process(self.pid.as_u32())
            .map_err(|err| DetectorError::StopFailed(err.to_string()));
        if let Err(ref err) = unwatch_result {
            error!(%err, pid = %self.pid, "failed to unwatch process");
        }
        self.cancel.cancel();
        self.wait_until_completion().await;
        unwatch_result
    }

    pub async fn wait_until_completion(&self) {
        let handle = self.handler.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{AlwaysSucceeds, FakeKernelClient};
    use memlab_types::CaughtSignal;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::time::timeout;

    fn detector(
        pid: u32,
        fake: Arc<FakeKernelClient>,
    ) -> (SignalDetector, mpsc::Receiver<DetectionReport>) {
        let (tx, rx) = mpsc::channel(8);
        let operators: Vec<Box<dyn Operator>> = vec![Box::new(AlwaysSucceeds)];
        (SignalDetector::new(Pid(pid), fake, operators, tx), rx)
    }

    #[tokio::test]
    async fn start_detection_loop_watches_the_pid() {
        let fake = Arc::new(FakeKernelClient::new());
        let (detector, _rx) = detector(1234, Arc::clone(&fake));

        detector.start_detection_loop().await.unwrap();

        assert_eq!(fake.watched(), vec![1234]);
        detector.stop_detection().await.unwrap();
    }

    #[tokio::test]
    async fn matching_event_is_enriched_and_acked() {
        let fake = Arc::new(FakeKernelClient::new());
        let (detector, mut rx) = detector(1234, Arc::clone(&fake));
        detector.start_detection_loop().await.unwrap();

        fake.emit(CaughtSignal { pid: 1234, signal: 11 });

        let report = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("report published within deadline")
            .expect("channel open");
        assert_eq!(report.pid, Pid(1234));
        assert_eq!(report.payload.get("fixture"), Some(&Value::from(true)));
        assert_eq!(fake.acked(), vec![1234]);

        detector.stop_detection().await.unwrap();
    }

    #[tokio::test]
    async fn events_for_other_pids_are_ignored() {
        let fake = Arc::new(FakeKernelClient::new());
        let (detector, mut rx) = detector(1234, Arc::clone(&fake));
        detector.start_detection_loop().await.unwrap();

        fake.emit(CaughtSignal { pid: 9999, signal: 11 });
        fake.emit(CaughtSignal { pid: 1234, signal: 11 });

        let report = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("report published within deadline")
            .expect("channel open");
        assert_eq!(report.pid, Pid(1234));
        assert_eq!(fake.acked(), vec![1234]);
        assert!(!fake.acked().contains(&9999));

        detector.stop_detection().await.unwrap();
    }

    #[tokio::test]
    async fn stop_detection_unwatches_and_is_idempotent() {
        let fake = Arc::new(FakeKernelClient::new());
        let (detector, _rx) = detector(1234, Arc::clone(&fake));
        detector.start_detection_loop().await.unwrap();

        detector.stop_detection().await.unwrap();
        detector.stop_detection().await.unwrap();

        assert_eq!(fake.unwatched(), vec![1234]);
    }
}
