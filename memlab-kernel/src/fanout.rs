// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use memlab_types::CaughtSignal;
use tokio::sync::mpsc;

/// Fans a single stream of caught-signal notifications out to every
/// subscriber, each over its own unbounded queue. Unlike
/// `tokio::sync::broadcast`, a slow subscriber never causes another
/// subscriber's notifications to be dropped: it only grows its own
/// backlog.
#[derive(Default)]
pub struct SignalFanout {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CaughtSignal>>>,
}

impl SignalFanout {
    pub fn new() -> Self {
        SignalFanout::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CaughtSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Publishes to every live subscriber, dropping any whose receiver
    /// has gone away.
    pub fn publish(&self, signal: CaughtSignal) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(signal).is_ok());
    }
}
