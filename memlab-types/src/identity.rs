// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};

use crate::Pid;

/// Identifies a specific process instance: a pid alone is not unique over
/// the lifetime of a host, since pids are reused. Pairing it with the
/// process's creation time is what the reconciler and the process
/// inspector use to detect that a pid has been recycled by a different
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: Pid,
    pub create_time: DateTime<Utc>,
}

impl ProcessIdentity {
    pub fn new(pid: Pid, create_time: DateTime<Utc>) -> Self {
        ProcessIdentity { pid, create_time }
    }
}
