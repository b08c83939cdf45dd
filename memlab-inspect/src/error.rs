// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("process {0} is not running")]
    ProcessNotRunning(u32),
    #[error("failed to read machine id: {0}")]
    MachineId(String),
}
