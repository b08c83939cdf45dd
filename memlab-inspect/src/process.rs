// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{Pid as SysPid, System};

use crate::connections::{self, NetworkConnection};
use crate::InspectError;

/// A point-in-time snapshot of one process, used by the `CollectMetadata`
/// operator.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub executable_path: String,
    pub command_line: String,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub create_time: DateTime<Utc>,
    pub cwd: String,
    pub connections: Vec<NetworkConnection>,
}

/// Wraps `sysinfo` to answer the process-shaped questions the rest of the
/// agent needs. A fresh `System` is refreshed on every call: this agent
/// polls infrequently enough (event-driven plus minute-scale reporting
/// intervals) that the cost of a full refresh per call is not worth
/// caching against staleness bugs.
pub struct ProcessInspector;

impl ProcessInspector {
    pub fn new() -> Self {
        ProcessInspector
    }

    pub fn snapshot(&self, pid: u32) -> Result<ProcessSnapshot, InspectError> {
        let mut system = System::new();
        let sys_pid = SysPid::from_u32(pid);
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[sys_pid]), true);
        system.refresh_memory();

        let process = system
            .process(sys_pid)
            .ok_or(InspectError::ProcessNotRunning(pid))?;

        let executable_path = process
            .exe()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let command_line = process
            .cmd()
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        let cwd = process
            .cwd()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let total_memory = system.total_memory().max(1);
        let memory_percent = (process.memory() as f64 / total_memory as f64 * 100.0) as f32;

        let create_time = DateTime::<Utc>::from_timestamp(process.start_time() as i64, 0)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or(Utc::now()));

        Ok(ProcessSnapshot {
            executable_path,
            command_line,
            cpu_percent: process.cpu_usage(),
            memory_percent,
            create_time,
            cwd,
            connections: connections::connections_for_pid(pid),
        })
    }

    /// Returns the creation time of the live process at `pid`, or `None`
    /// if no such process exists. Used by the reconciler to detect pid
    /// reuse before applying a policy.
    pub fn exists_with_create_time(&self, pid: u32) -> Option<DateTime<Utc>> {
        let mut system = System::new();
        let sys_pid = SysPid::from_u32(pid);
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[sys_pid]), true);
        system
            .process(sys_pid)
            .map(|p| DateTime::<Utc>::from_timestamp(p.start_time() as i64, 0).unwrap_or_default())
    }
}

impl Default for ProcessInspector {
    fn default() -> Self {
        Self::new()
    }
}
