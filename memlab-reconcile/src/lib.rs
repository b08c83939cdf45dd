// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Diffs per-process policies served by the control plane against a
//! local cache and emits the detection requests that reflect what
//! changed.

mod error;
mod reconciler;

pub use error::ReconcileError;
pub use reconciler::Reconciler;
