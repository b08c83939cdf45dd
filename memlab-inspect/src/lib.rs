// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Process and host inspection: the black-box platform-metric surface the
//! detection pipeline and the control-plane reporters sit on top of.

mod connections;
mod error;
mod host;
mod process;
mod process_list;

pub use connections::NetworkConnection;
pub use error::InspectError;
pub use host::{machine_id, HostFacts, HostStatusReport};
pub use process::{ProcessInspector, ProcessSnapshot};
pub use process_list::{ProcessList, ProcessListEntry, ProcessListReport};
