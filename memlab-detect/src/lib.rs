// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Bounded-concurrency detector registry and the signal detector that
//! bridges kernel notifications into the operator pipeline.

mod error;
mod registry;
mod report;
mod signal;
#[cfg(test)]
mod test_support;

pub use error::DetectorError;
pub use registry::{DetectorKind, DetectorRegistry};
pub use report::DetectionReport;
pub use signal::SignalDetector;
