// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("failed to build HTTP client: {0}")]
    InvalidConfig(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned unexpected status {status}")]
    UnexpectedStatus { url: String, status: u16 },
    #[error("POST to {url} failed after exhausting the retry budget: {source}")]
    PostFailed {
        url: String,
        #[source]
        source: Box<UplinkError>,
    },
}
