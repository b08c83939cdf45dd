// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::Pid;

/// A request to start, update, or stop detection of one kind for one pid.
/// Dispatched by the reconciler, consumed by the request handler that
/// drives the detector registry.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionRequest {
    DetectSignals {
        pid: Pid,
        turned_on: bool,
        restart_on_signal: bool,
    },
    DetectThresholds {
        pid: Pid,
        turned_on: bool,
        cpu_threshold: i64,
        memory_threshold: i64,
        restart_on_cpu_threshold: bool,
        restart_on_memory_threshold: bool,
    },
    DetectSuspectedHangs {
        pid: Pid,
        turned_on: bool,
        duration_secs: u64,
        restart_on_suspected_hang: bool,
    },
}

impl DetectionRequest {
    pub fn pid(&self) -> Pid {
        match self {
            DetectionRequest::DetectSignals { pid, .. }
            | DetectionRequest::DetectThresholds { pid, .. }
            | DetectionRequest::DetectSuspectedHangs { pid, .. } => *pid,
        }
    }

    pub fn turned_on(&self) -> bool {
        match self {
            DetectionRequest::DetectSignals { turned_on, .. }
            | DetectionRequest::DetectThresholds { turned_on, .. }
            | DetectionRequest::DetectSuspectedHangs { turned_on, .. } => *turned_on,
        }
    }

    /// The tag used as part of the detector registry key, e.g.
    /// `detect_signals`.
    pub fn tag(&self) -> &'static str {
        match self {
            DetectionRequest::DetectSignals { .. } => "detect_signals",
            DetectionRequest::DetectThresholds { .. } => "detect_thresholds",
            DetectionRequest::DetectSuspectedHangs { .. } => "detect_suspected_hangs",
        }
    }

    /// Stable registry key for this request: `<tag>.<pid>`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.tag(), self.pid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_combines_tag_and_pid() {
        let req = DetectionRequest::DetectSignals {
            pid: Pid(1234),
            turned_on: true,
            restart_on_signal: false,
        };
        assert_eq!(req.name(), "detect_signals.1234");
    }
}
