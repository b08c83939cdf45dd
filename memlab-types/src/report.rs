// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde_json::{Map, Value};

/// Something an operator can produce and the pipeline can merge into the
/// final event payload.
///
/// `to_object` is used instead of a serialize-then-deserialize round trip
/// through a shared map: each report contributes its fields directly,
/// which avoids re-parsing JSON for every operator in the pipeline.
pub trait Report: Send {
    fn name(&self) -> &'static str;

    fn to_object(&self) -> Map<String, Value>;
}

/// Merges reports left to right into one object. Later reports win on key
/// collision.
pub fn merge_reports(reports: &[Box<dyn Report>]) -> Map<String, Value> {
    let mut merged = Map::new();
    for report in reports {
        merged.extend(report.to_object());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture(&'static str, Value);

    impl Report for Fixture {
        fn name(&self) -> &'static str {
            self.0
        }

        fn to_object(&self) -> Map<String, Value> {
            let mut map = Map::new();
            map.insert("k".to_owned(), self.1.clone());
            map
        }
    }

    #[test]
    fn later_report_wins_on_key_collision() {
        let reports: Vec<Box<dyn Report>> = vec![
            Box::new(Fixture("a", Value::from(1))),
            Box::new(Fixture("b", Value::from(2))),
        ];
        let merged = merge_reports(&reports);
        assert_eq!(merged.get("k"), Some(&Value::from(2)));
    }
}
