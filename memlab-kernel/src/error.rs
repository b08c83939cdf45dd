// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::wire::WireError;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("generic-netlink family '{0}' does not exist")]
    FamilyNotFound(String),
    #[error("failed to dial netlink socket: {0}")]
    Dial(String),
    #[error("failed to send on netlink socket: {0}")]
    Send(String),
    #[error("failed to receive on netlink socket: {0}")]
    Recv(String),
    #[error("failed to decode netlink payload: {0}")]
    Decode(#[from] WireError),
    #[error("netlink socket was closed")]
    Closed,
}
