// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use memlab_inspect::{ProcessInspector, ProcessSnapshot};
use memlab_types::{Pid, Report};
use serde_json::{Map, Value};

use crate::operator::{Operator, OperatorError};

/// The default operator for signal detection: collects a process
/// snapshot (executable, cmdline, cpu/memory usage, cwd, up to 50 network
/// connections).
pub struct CollectMetadata {
    inspector: ProcessInspector,
}

impl CollectMetadata {
    pub fn new() -> Self {
        CollectMetadata {
            inspector: ProcessInspector::new(),
        }
    }
}

impl Default for CollectMetadata {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MetadataReport(pub ProcessSnapshot);

impl Report for MetadataReport {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn to_object(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("executable_path".to_owned(), Value::from(self.0.executable_path.clone()));
        map.insert("command_line".to_owned(), Value::from(self.0.command_line.clone()));
        map.insert("cpu_percent".to_owned(), Value::from(self.0.cpu_percent));
        map.insert("memory_percent".to_owned(), Value::from(self.0.memory_percent));
        map.insert(
            "create_time".to_owned(),
            Value::from(self.0.create_time.to_rfc3339()),
        );
        map.insert("cwd".to_owned(), Value::from(self.0.cwd.clone()));
        map.insert(
            "connections".to_owned(),
            serde_json::to_value(&self.0.connections).unwrap_or(Value::Array(Vec::new())),
        );
        map
    }
}

#[async_trait]
impl Operator for CollectMetadata {
    fn name(&self) -> &'static str {
        "collect_metadata"
    }

    async fn operate(&self, pid: Pid) -> Result<Box<dyn Report>, OperatorError> {
        let snapshot = self
            .inspector
            .snapshot(pid.as_u32())
            .map_err(|_| OperatorError::ProcessNotRunning(pid.as_u32()))?;
        Ok(Box::new(MetadataReport(snapshot)))
    }

    fn fail_pipeline_on_error(&self) -> bool {
        false
    }
}
