// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The policy's `(pid, process_create_time)` tuple no longer matches
    /// a live process: the pid is gone, or has been recycled by a
    /// different process. The caller is expected to mark the policy
    /// irrelevant on the control plane.
    #[error("detection config for pid {0} is expired")]
    ExpiredDetectionConfig(u32),
    /// The outgoing detection-request channel was dropped. Treated as a
    /// programming error, not a recoverable condition.
    #[error("detection request channel closed unexpectedly")]
    ChannelClosed,
}
