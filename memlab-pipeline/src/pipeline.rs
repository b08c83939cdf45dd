// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use memlab_types::{merge_reports, Pid};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::operator::{Operator, OperatorError};

/// Per-operator deadline: each pipeline step gets 60s before it's
/// treated as a failure.
pub const OPERATOR_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("operator '{0}' failed and is configured to fail the pipeline")]
    OperatorFailure(&'static str),
    #[error("pipeline was cancelled")]
    Cancelled,
}

/// Runs a fixed, ordered list of operators against one pid and merges
/// their reports into a single JSON object.
pub struct Pipeline {
    operators: Vec<Box<dyn Operator>>,
    parent: CancellationToken,
}

impl Pipeline {
    pub fn new(operators: Vec<Box<dyn Operator>>, parent: CancellationToken) -> Self {
        Pipeline { operators, parent }
    }

    pub async fn run(&self, pid: Pid) -> Result<Map<String, Value>, PipelineError> {
        let mut reports = Vec::with_capacity(self.operators.len());

        for operator in &self.operators {
            if self.parent.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let result = tokio::time::timeout(OPERATOR_DEADLINE, operator.operate(pid)).await;

            match result {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => {
                    if operator.fail_pipeline_on_error() {
                        return Err(PipelineError::OperatorFailure(operator.name()));
                    }
                    error!(operator = operator.name(), %err, "operator failed, continuing pipeline");
                }
                Err(_elapsed) => {
                    if operator.fail_pipeline_on_error() {
                        return Err(PipelineError::OperatorFailure(operator.name()));
                    }
                    error!(operator = operator.name(), "operator timed out, continuing pipeline");
                }
            }
        }

        Ok(merge_reports(&reports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memlab_types::{Pid, Report};

    struct AlwaysOk(&'static str, &'static str);

    #[async_trait]
    impl Operator for AlwaysOk {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn operate(&self, _pid: Pid) -> Result<Box<dyn Report>, OperatorError> {
            Ok(Box::new(Fixture(self.1)))
        }

        fn fail_pipeline_on_error(&self) -> bool {
            false
        }
    }

    struct AlwaysFails(&'static str, bool);

    #[async_trait]
    impl Operator for AlwaysFails {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn operate(&self, _pid: Pid) -> Result<Box<dyn Report>, OperatorError> {
            Err(OperatorError::Failed {
                operator: self.0,
                message: "boom".to_owned(),
            })
        }

        fn fail_pipeline_on_error(&self) -> bool {
            self.1
        }
    }

    struct Fixture(&'static str);

    impl Report for Fixture {
        fn name(&self) -> &'static str {
            "fixture"
        }

        fn to_object(&self) -> Map<String, Value> {
            let mut map = Map::new();
            map.insert("value".to_owned(), Value::from(self.0));
            map
        }
    }

    #[tokio::test]
    async fn merges_reports_from_all_operators() {
        let pipeline = Pipeline::new(
            vec![Box::new(AlwaysOk("a", "first")), Box::new(AlwaysOk("b", "second"))],
            CancellationToken::new(),
        );
        let merged = pipeline.run(Pid(1)).await.unwrap();
        assert_eq!(merged.get("value"), Some(&Value::from("second")));
    }

    #[tokio::test]
    async fn merges_a_real_second_operator_alongside_a_fixture() {
        let pipeline = Pipeline::new(
            vec![Box::new(AlwaysOk("a", "first")), Box::new(crate::ProcDump)],
            CancellationToken::new(),
        );
        let merged = pipeline.run(Pid(1)).await.unwrap();
        assert_eq!(merged.get("value"), Some(&Value::from("first")));
        assert_eq!(merged.get("proc_dump_size"), Some(&Value::from(0)));
    }

    #[tokio::test]
    async fn non_fatal_operator_failure_does_not_abort_pipeline() {
        let pipeline = Pipeline::new(
            vec![
                Box::new(AlwaysFails("bad", false)),
                Box::new(AlwaysOk("good", "ok")),
            ],
            CancellationToken::new(),
        );
        let merged = pipeline.run(Pid(1)).await.unwrap();
        assert_eq!(merged.get("value"), Some(&Value::from("ok")));
    }

    #[tokio::test]
    async fn fatal_operator_failure_aborts_pipeline() {
        let pipeline = Pipeline::new(
            vec![Box::new(AlwaysFails("bad", true)), Box::new(AlwaysOk("good", "ok"))],
            CancellationToken::new(),
        );
        let err = pipeline.run(Pid(1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::OperatorFailure("bad")));
    }
}
