// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Immutable configuration for talking to the control plane.
#[derive(Debug, Clone)]
pub struct UplinkConfig {
    url: String,
    token: String,
    /// Skips TLS certificate verification. Defaults to `false`. Kept as
    /// an explicit, named opt-out rather than the unconditional behavior
    /// of the system this agent design descends from.
    insecure_skip_verify: bool,
}

impl UplinkConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        UplinkConfig {
            url: url.into(),
            token: token.into(),
            insecure_skip_verify: false,
        }
    }

    pub fn with_insecure_skip_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_verify = insecure;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_verifying_tls() {
        let cfg = UplinkConfig::new("https://example.test", "tok");
        assert!(!cfg.insecure_skip_verify());
    }
}
