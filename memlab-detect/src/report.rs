// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use memlab_types::Pid;
use serde_json::{Map, Value};

/// One merged detection report, ready to be forwarded to the control
/// plane's event uplink.
#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub pid: Pid,
    pub payload: Map<String, Value>,
}
