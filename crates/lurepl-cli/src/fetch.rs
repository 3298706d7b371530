// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Tool artifact fetching over HTTP.

use async_trait::async_trait;
use futures_util::StreamExt;
use lurepl::{DependencyLoader, EmbeddedFetcher, FetchResponse, Fetcher, ReplError, ToolUrls};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Maximum number of attempts per artifact
const MAX_RETRIES: u32 = 3;

/// Base delay in milliseconds for exponential backoff
const BASE_DELAY_MS: u64 = 500;

/// Fetches artifacts with `reqwest`.
///
/// Transport failures are retried with exponential backoff. HTTP error
/// statuses are returned as responses; the loader decides what they mean.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_delay: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    /// Creates a fetcher with the default backoff.
    pub fn new() -> Self {
        Self::with_base_delay(Duration::from_millis(BASE_DELAY_MS))
    }

    /// Creates a fetcher whose first retry waits `base_delay`.
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            client: Client::new(),
            base_delay,
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchResponse, reqwest::Error> {
        let resp = self.client.get(url).header("User-Agent", "lurepl-cli").send().await?;
        let status = resp.status().as_u16();

        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        Ok(FetchResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> lurepl::Result<FetchResponse> {
        let mut retries = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(response) => {
                    tracing::debug!("fetched {} (HTTP {})", url, response.status);
                    return Ok(response);
                }
                Err(err) => {
                    retries += 1;
                    if retries >= MAX_RETRIES {
                        return Err(ReplError::Transport {
                            url: url.to_string(),
                            message: err.to_string(),
                        });
                    }

                    let delay = self.base_delay * 2_u32.pow(retries - 1);
                    tracing::warn!(
                        "fetching {} failed, retrying in {}ms ({}/{}): {}",
                        url,
                        delay.as_millis(),
                        retries,
                        MAX_RETRIES,
                        err
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Builds the dependency loader for `urls`, offline or over HTTP.
pub fn loader(urls: ToolUrls, offline: bool) -> DependencyLoader {
    let fetcher: Arc<dyn Fetcher> = if offline {
        Arc::new(EmbeddedFetcher::new(urls.clone()))
    } else {
        Arc::new(HttpFetcher::new())
    };
    DependencyLoader::new(fetcher, urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_origin_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::with_base_delay(Duration::from_millis(1));
        let url = format!("http://{}/repl/core.lua", addr);
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, ReplError::Transport { url: ref failed, .. } if *failed == url));
        assert!(err.to_string().starts_with("Unable to fetch http://127.0.0.1:"));
    }

    #[tokio::test]
    async fn offline_loader_never_touches_the_network() {
        let loader = loader(ToolUrls::local("http://127.0.0.1:9"), true);
        let mut ctx = lurepl::BuildContext::default();
        loader
            .ensure_tools(&mut ctx, lurepl::FRAMEWORK_VERSION, &lurepl::BuildOptions::default())
            .await
            .unwrap();
        assert!(ctx.tools.is_some());
    }
}
