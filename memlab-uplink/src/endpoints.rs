// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use memlab_inspect::{HostStatusReport, ProcessListReport};
use memlab_types::Policy;
use serde_json::{Map, Value};

use crate::client::UplinkClient;
use crate::UplinkError;

/// Typed wrappers over [`UplinkClient`]'s generic verbs for the five
/// endpoints the agent depends on.
impl UplinkClient {
    /// `GET detection_configs/by_machine/{machine_id}/`
    pub async fn list_detection_configs(&self, machine_id: &str) -> Result<Vec<Policy>, UplinkError> {
        self.get(&format!("detection_configs/by_machine/{machine_id}/"))
            .await
    }

    /// `POST detection_configs/mark_irrelevant/{id}`
    pub async fn mark_irrelevant(&self, id: &str) -> Result<(), UplinkError> {
        self.post(&format!("detection_configs/mark_irrelevant/{id}"), &Value::Null)
            .await
    }

    /// `POST hosts/`
    pub async fn push_host_status(&self, report: &HostStatusReport) -> Result<(), UplinkError> {
        self.post("hosts/", report).await
    }

    /// `POST processes/`
    pub async fn push_process_list(&self, report: &ProcessListReport) -> Result<(), UplinkError> {
        self.post("processes/", report).await
    }

    /// `POST process_events/`
    pub async fn push_event(&self, event: &Map<String, Value>) -> Result<(), UplinkError> {
        self.post_value("process_events/", &Value::Object(event.clone()))
            .await
    }
}
