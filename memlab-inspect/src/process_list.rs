// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::System;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessListEntry {
    pub pid: u32,
    pub executable: String,
    pub command_line: String,
    pub create_time: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: String,
}

/// The periodic process-list inventory pushed to `processes/`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessListReport {
    pub machine_id: String,
    pub processes: Vec<ProcessListEntry>,
}

pub struct ProcessList;

impl ProcessList {
    /// Snapshots every live process on the host, excluding `own_pid` (the
    /// agent itself has no business reporting on itself), and wraps the
    /// result into the report shape the control plane expects.
    pub fn report(machine_id: String, own_pid: u32) -> ProcessListReport {
        ProcessListReport {
            machine_id,
            processes: Self::snapshot(own_pid),
        }
    }

    /// Snapshots every live process on the host, excluding `own_pid` (the
    /// agent itself has no business reporting on itself).
    pub fn snapshot(own_pid: u32) -> Vec<ProcessListEntry> {
        let mut system = System::new_all();
        system.refresh_all();
        let now = Utc::now();

        system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            .map(|(pid, process)| ProcessListEntry {
                pid: pid.as_u32(),
                executable: process
                    .exe()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                command_line: process
                    .cmd()
                    .iter()
                    .map(|s| s.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(" "),
                create_time: DateTime::<Utc>::from_timestamp(process.start_time() as i64, 0)
                    .unwrap_or_default(),
                last_seen_at: now,
                status: format!("{:?}", process.status()),
            })
            .collect()
    }
}
