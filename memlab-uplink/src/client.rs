// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use memlab_types::UplinkConfig;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::retry::RetryConfig;
use crate::UplinkError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin HTTPS client for the control plane. `get`/`put`/`delete` are sent
/// once; `post` is wrapped in [`RetryConfig`]'s exponential backoff, since
/// only event and inventory pushes need to survive transient control-plane
/// unavailability.
pub struct UplinkClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryConfig,
}

impl UplinkClient {
    pub fn new(config: &UplinkConfig) -> Result<Self, UplinkError> {
        Self::with_retry(config, RetryConfig::new())
    }

    pub fn with_retry(config: &UplinkConfig, retry: RetryConfig) -> Result<Self, UplinkError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure_skip_verify())
            .build()
            .map_err(|e| UplinkError::InvalidConfig(e.to_string()))?;

        Ok(UplinkClient {
            http,
            base_url: config.url().to_owned(),
            token: config.token().to_owned(),
            retry,
        })
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept-Encoding", "gzip")
    }

    async fn send_once(&self, builder: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response, UplinkError> {
        let response = builder.send().await.map_err(|source| UplinkError::Transport {
            url: url.to_owned(),
            source,
        })?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(url, status = status.as_u16(), "uplink request returned non-2xx status");
            return Err(UplinkError::UnexpectedStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// GET a relative endpoint, decoding the JSON body as `T`. Single
    /// attempt — not retried.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, UplinkError> {
        let url = self.url_for(endpoint);
        let response = self.send_once(self.request(Method::GET, &url), &url).await?;
        response
            .json::<T>()
            .await
            .map_err(|source| UplinkError::Transport { url, source })
    }

    /// PUT a JSON body to a relative endpoint. Single attempt.
    pub async fn put<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<(), UplinkError> {
        let url = self.url_for(endpoint);
        self.send_once(self.request(Method::PUT, &url).json(body), &url).await?;
        Ok(())
    }

    /// DELETE a relative endpoint. Single attempt.
    pub async fn delete(&self, endpoint: &str) -> Result<(), UplinkError> {
        let url = self.url_for(endpoint);
        self.send_once(self.request(Method::DELETE, &url), &url).await?;
        Ok(())
    }

    /// POST a JSON body to a relative endpoint, retried with exponential
    /// backoff up to `retry.max_retries` additional attempts. The last
    /// failure is surfaced wrapped in [`UplinkError::PostFailed`].
    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<(), UplinkError> {
        let url = self.url_for(endpoint);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = self
                .send_once(self.request(Method::POST, &url).json(body), &url)
                .await;

            match result {
                Ok(_) => return Ok(()),
                Err(err) => {
                    if attempt > self.retry.max_retries {
                        return Err(UplinkError::PostFailed {
                            url,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(url = %url, attempt, ?delay, %err, "retrying POST to uplink");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// POST a JSON body that is already a loosely typed [`Value`] (used
    /// for merged event reports, which don't have a single static type).
    pub async fn post_value(&self, endpoint: &str, body: &Value) -> Result<(), UplinkError> {
        self.post(endpoint, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Echo {
        value: i32,
    }

    #[tokio::test]
    async fn get_decodes_json_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/things/1");
            then.status(200).json_body(serde_json::json!({"value": 7}));
        });

        let config = UplinkConfig::new(server.base_url(), "tok");
        let client = UplinkClient::new(&config).unwrap();
        let echo: Echo = client.get("things/1").await.unwrap();

        mock.assert();
        assert_eq!(echo, Echo { value: 7 });
    }

    #[tokio::test]
    async fn url_joining_normalizes_slashes() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/a/b/");
            then.status(200).json_body(serde_json::json!({"value": 1}));
        });

        let config = UplinkConfig::new(format!("{}/", server.base_url()), "tok");
        let client = UplinkClient::new(&config).unwrap();
        let _: Echo = client.get("/a/b/").await.unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn post_retries_until_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/events");
            then.status(503);
        });

        let config = UplinkConfig::new(server.base_url(), "tok");
        let retry = RetryConfig::new()
            .max_retries(1)
            .initial_delay(Duration::from_millis(1));
        let client = UplinkClient::with_retry(&config, retry).unwrap();

        let err = client.post("events", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, UplinkError::PostFailed { .. }));
        assert_eq!(mock.hits(), 2);
    }

    #[tokio::test]
    async fn non_retried_verbs_fail_on_first_bad_status() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::PUT).path("/things/1");
            then.status(500);
        });

        let config = UplinkConfig::new(server.base_url(), "tok");
        let client = UplinkClient::new(&config).unwrap();

        let err = client.put("things/1", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, UplinkError::UnexpectedStatus { .. }));
        assert_eq!(mock.hits(), 1);
    }
}
