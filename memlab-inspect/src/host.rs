// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::System;

use crate::InspectError;

/// Host-wide facts reported on the `host_status_report_interval`.
///
/// `public_ip_address` is always `None`: the system this agent's design
/// descends from resolved it via an external consensus service
/// (`go-external-ip`), a second outbound network dependency this rewrite
/// does not reproduce. The field is kept so the wire shape is unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct HostStatusReport {
    pub machine_id: String,
    pub public_ip_address: Option<String>,
    pub hostname: String,
    pub last_boot_time: DateTime<Utc>,
    pub os: String,
    pub platform: String,
    pub platform_family: String,
    pub platform_version: String,
    pub kernel_version: String,
    pub kernel_arch: String,
    pub virtualization_system: Option<String>,
    pub virtualization_role: Option<String>,
}

pub struct HostFacts;

impl HostFacts {
    pub fn collect(machine_id: String) -> HostStatusReport {
        let last_boot_time =
            DateTime::<Utc>::from_timestamp(System::boot_time() as i64, 0).unwrap_or_default();
        let (virtualization_system, virtualization_role) = detect_virtualization();

        HostStatusReport {
            machine_id,
            public_ip_address: None,
            hostname: System::host_name().unwrap_or_default(),
            last_boot_time,
            os: System::name().unwrap_or_default(),
            platform: System::distribution_id(),
            platform_family: System::distribution_id(),
            platform_version: System::os_version().unwrap_or_default(),
            kernel_version: System::kernel_version().unwrap_or_default(),
            kernel_arch: std::env::consts::ARCH.to_owned(),
            virtualization_system,
            virtualization_role,
        }
    }
}

/// Best-effort virtualization detection from the handful of signals a
/// Linux host exposes without a helper binary or root: the `/.dockerenv`
/// marker, the `/sys/hypervisor/type` file Xen and some paravirtualized
/// guests expose, and the `hypervisor` CPU flag most VM guests report.
/// `role` is `"guest"` once any of those fire, `"host"` otherwise;
/// `system` is only ever populated by the first two, since the CPU flag
/// alone doesn't say which hypervisor.
fn detect_virtualization() -> (Option<String>, Option<String>) {
    if std::path::Path::new("/.dockerenv").exists() {
        return (Some("docker".to_owned()), Some("guest".to_owned()));
    }

    if let Ok(hypervisor) = std::fs::read_to_string("/sys/hypervisor/type") {
        let hypervisor = hypervisor.trim();
        if !hypervisor.is_empty() {
            return (Some(hypervisor.to_owned()), Some("guest".to_owned()));
        }
    }

    if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
        let has_hypervisor_flag = cpuinfo.lines().any(|line| {
            line.starts_with("flags") && line.split_whitespace().any(|flag| flag == "hypervisor")
        });
        if has_hypervisor_flag {
            return (None, Some("guest".to_owned()));
        }
    }

    (None, Some("host".to_owned()))
}

/// Reads the Linux machine id, preferring the systemd location and
/// falling back to the D-Bus one, matching the two locations the machine
/// id is conventionally written to on a Linux host.
pub fn machine_id() -> Result<String, InspectError> {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(contents) = std::fs::read_to_string(path) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_owned());
            }
        }
    }
    Err(InspectError::MachineId(
        "no machine-id file found".to_owned(),
    ))
}
