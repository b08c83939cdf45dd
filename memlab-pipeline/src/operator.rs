// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use memlab_types::{Pid, Report};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("process {0} is not running")]
    ProcessNotRunning(u32),
    #[error("operator '{operator}' failed: {message}")]
    Failed { operator: &'static str, message: String },
}

/// One step of a detection pipeline: given a pid, produce a report or
/// fail. `fail_pipeline_on_error` decides whether a failure here aborts
/// the rest of the pipeline or is merely logged.
#[async_trait]
pub trait Operator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn operate(&self, pid: Pid) -> Result<Box<dyn Report>, OperatorError>;

    fn fail_pipeline_on_error(&self) -> bool;
}
