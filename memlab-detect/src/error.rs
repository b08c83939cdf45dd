// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("a detector already exists for '{0}'")]
    AlreadyExists(String),
    #[error("no detector is registered for '{0}'")]
    DoesNotExist(String),
    #[error("request does not match a supported detector type")]
    InvalidDetectorType,
    #[error("detector kind is declared but not implemented")]
    NotImplemented,
    #[error("failed to construct detector: {0}")]
    ConstructionFailed(String),
    #[error("failed to stop detector: {0}")]
    StopFailed(String),
    #[error("kernel communicator error: {0}")]
    Kernel(String),
}
