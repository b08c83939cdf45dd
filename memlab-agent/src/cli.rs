// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use clap::Parser;
use tracing::warn;

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|e| e.to_string())
}

/// CLI surface for the memlab host agent.
#[derive(Debug, Parser)]
#[command(name = "memlab-agent", about = "Host-resident process detection agent")]
pub struct Cli {
    /// Maximum number of detectors running concurrently.
    #[arg(long, default_value_t = 5)]
    pub max_detectors: usize,

    /// Enables verbose logging.
    #[arg(long)]
    pub debug: bool,

    /// How often host-status reports are pushed. Floor of 60s is
    /// enforced regardless of what's passed.
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub host_status_interval: Duration,

    /// How often the process-list inventory is pushed. Floor of 30s is
    /// enforced regardless of what's passed.
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub process_list_interval: Duration,

    /// How often detection configs are pulled from the control plane.
    /// Floor of 5s is enforced regardless of what's passed.
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub detection_configs_interval: Duration,

    /// Base URL of the control plane.
    #[arg(long)]
    pub api_url: String,

    /// Bearer token for the control plane.
    #[arg(long)]
    pub api_token: String,
}

const HOST_STATUS_FLOOR: Duration = Duration::from_secs(60);
const PROCESS_LIST_FLOOR: Duration = Duration::from_secs(30);
const DETECTION_CONFIGS_FLOOR: Duration = Duration::from_secs(5);

impl Cli {
    /// Resolved, floor-clamped intervals. Clamping (not rejecting) a
    /// too-low interval is the agent's own choice: every interval named
    /// here also has a hardcoded floor that a caller
    /// cannot override downward.
    pub fn resolved_intervals(&self) -> ResolvedIntervals {
        ResolvedIntervals {
            host_status: clamp_floor("host-status-interval", self.host_status_interval, HOST_STATUS_FLOOR),
            process_list: clamp_floor("process-list-interval", self.process_list_interval, PROCESS_LIST_FLOOR),
            detection_configs: clamp_floor(
                "detection-configs-interval",
                self.detection_configs_interval,
                DETECTION_CONFIGS_FLOOR,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedIntervals {
    pub host_status: Duration,
    pub process_list: Duration,
    pub detection_configs: Duration,
}

fn clamp_floor(name: &str, value: Duration, floor: Duration) -> Duration {
    if value < floor {
        warn!(flag = name, requested = ?value, floor = ?floor, "interval below floor, clamping up");
        floor
    } else {
        value
    }
}
