// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Pid;

/// A detection configuration for one process, as served by the control
/// plane. Mirrors the `detection_configs` resource shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub pid: Pid,
    /// Creation time of the process this policy targets, used to detect
    /// pid reuse (see [`crate::ProcessIdentity`]).
    pub process_create_time: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Whether the backend still considers this policy applicable. A
    /// policy the backend has marked irrelevant is skipped entirely
    /// rather than dispatched.
    pub is_relevant: bool,

    pub detect_signals: bool,
    pub detect_thresholds: bool,
    pub detect_suspected_hangs: bool,

    pub cpu_threshold: i64,
    pub memory_threshold: i64,
    pub suspected_hang_duration_secs: u64,

    pub restart_on_signal: bool,
    pub restart_on_cpu_threshold: bool,
    pub restart_on_memory_threshold: bool,
    pub restart_on_suspected_hang: bool,
}

#[cfg(any(test, feature = "test-util"))]
impl Policy {
    /// Builds a minimal valid policy fixture for tests.
    pub fn test_fixture(pid: u32) -> Self {
        let now = DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default();
        Policy {
            pid: Pid(pid),
            process_create_time: now,
            modified_at: now,
            is_relevant: true,
            detect_signals: true,
            detect_thresholds: false,
            detect_suspected_hangs: false,
            cpu_threshold: 0,
            memory_threshold: 0,
            suspected_hang_duration_secs: 0,
            restart_on_signal: false,
            restart_on_cpu_threshold: false,
            restart_on_memory_threshold: false,
            restart_on_suspected_hang: false,
        }
    }
}

/// Cache of the most recently applied policy per pid. Owned exclusively
/// by the reconciler: nothing else is allowed to mutate it, which is what
/// lets diffing be done without extra synchronization.
pub type PolicyCache = HashMap<Pid, Policy>;
