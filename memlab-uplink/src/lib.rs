// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Resilient HTTPS client for the control plane: config pull, event push,
//! host/process inventory push, all over a retrying POST path and a
//! single-attempt GET/PUT/DELETE path.

mod client;
mod endpoints;
mod error;
mod retry;

pub use client::UplinkClient;
pub use error::UplinkError;
pub use retry::RetryConfig;
