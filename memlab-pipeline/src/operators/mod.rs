// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod metadata;
mod proc_dump;

pub use metadata::{CollectMetadata, MetadataReport};
pub use proc_dump::ProcDump;
