// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use memlab_types::{Pid, Report};
use serde_json::{Map, Value};

use crate::operator::{Operator, OperatorError};

/// Stub operator kept for parity with the system this pipeline's design
/// descends from, which never implemented real process-dump collection
/// either. Not part of the default operator list for any detector; exists
/// so the pipeline has more than one real `Operator` implementor to
/// exercise the merge-by-union behavior against.
pub struct ProcDump;

struct ProcDumpReport;

impl Report for ProcDumpReport {
    fn name(&self) -> &'static str {
        "proc_dump"
    }

    fn to_object(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("proc_dump_size".to_owned(), Value::from(0));
        map
    }
}

#[async_trait]
impl Operator for ProcDump {
    fn name(&self) -> &'static str {
        "proc_dump"
    }

    async fn operate(&self, _pid: Pid) -> Result<Box<dyn Report>, OperatorError> {
        Ok(Box::new(ProcDumpReport))
    }

    fn fail_pipeline_on_error(&self) -> bool {
        false
    }
}
