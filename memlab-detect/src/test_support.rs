// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Test doubles shared by `registry` and `signal`'s own test modules. A
//! real [`memlab_kernel::KernelCommunicator`] only works against an
//! actual kernel module, so detector-level tests exercise
//! [`memlab_kernel::KernelClient`] through this fake instead.

use std::sync::Mutex;

use async_trait::async_trait;
use memlab_kernel::{KernelClient, KernelError, SignalFanout};
use memlab_pipeline::{Operator, OperatorError};
use memlab_types::{CaughtSignal, Pid, Report};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Records every watch/unwatch/ack call it receives and lets tests
/// inject [`CaughtSignal`] notifications on demand.
pub struct FakeKernelClient {
    fanout: SignalFanout,
    watched: Mutex<Vec<u32>>,
    unwatched: Mutex<Vec<u32>>,
    acked: Mutex<Vec<u32>>,
}

impl FakeKernelClient {
    pub fn new() -> Self {
        FakeKernelClient {
            fanout: SignalFanout::new(),
            watched: Mutex::new(Vec::new()),
            unwatched: Mutex::new(Vec::new()),
            acked: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, signal: CaughtSignal) {
        self.fanout.publish(signal);
    }

    pub fn watched(&self) -> Vec<u32> {
        self.watched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn unwatched(&self) -> Vec<u32> {
        self.unwatched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn acked(&self) -> Vec<u32> {
        self.acked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for FakeKernelClient {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelClient for FakeKernelClient {
    fn watch_process(&self, pid: u32) -> Result<(), KernelError> {
        self.watched.lock().unwrap_or_else(|e| e.into_inner()).push(pid);
        Ok(())
    }

    fn unwatch_process(&self, pid: u32) -> Result<(), KernelError> {
        self.unwatched.lock().unwrap_or_else(|e| e.into_inner()).push(pid);
        Ok(())
    }

    fn notify_handled_signal(&self, pid: u32) -> Result<(), KernelError> {
        self.acked.lock().unwrap_or_else(|e| e.into_inner()).push(pid);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<CaughtSignal> {
        self.fanout.subscribe()
    }
}

/// A trivial operator that always succeeds with a fixed report. Stands
/// in for `CollectMetadata` in tests that don't want a dependency on a
/// real, live process.
pub struct AlwaysSucceeds;

struct FixtureReport;

impl Report for FixtureReport {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn to_object(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("fixture".to_owned(), Value::from(true));
        map
    }
}

#[async_trait]
impl Operator for AlwaysSucceeds {
    fn name(&self) -> &'static str {
        "always_succeeds"
    }

    async fn operate(&self, _pid: Pid) -> Result<Box<dyn Report>, OperatorError> {
        Ok(Box::new(FixtureReport))
    }

    fn fail_pipeline_on_error(&self) -> bool {
        false
    }
}
