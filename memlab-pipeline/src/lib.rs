// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Turns one detection event into a merged JSON report by running a
//! fixed, ordered list of operators against the target pid.

mod operator;
mod operators;
mod pipeline;

pub use operator::{Operator, OperatorError};
pub use operators::{CollectMetadata, MetadataReport, ProcDump};
pub use pipeline::{Pipeline, PipelineError, OPERATOR_DEADLINE};
