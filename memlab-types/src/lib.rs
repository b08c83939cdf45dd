// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Shared value types passed between the detection, reconciliation and
//! control-plane components of the memlab host agent.

mod identity;
mod pid;
mod policy;
mod report;
mod request;
mod signal;
mod uplink;

pub use identity::ProcessIdentity;
pub use pid::Pid;
pub use policy::{Policy, PolicyCache};
pub use report::{merge_reports, Report};
pub use request::DetectionRequest;
pub use signal::CaughtSignal;
pub use uplink::UplinkConfig;
