// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Artifact fetching.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{
    ToolDescriptor, ToolKind, ToolUrls, BUNDLER_VERSION, CORE_SOURCE, FRAMEWORK_VERSION, MINIFIER_VERSION,
    PRINTER_VERSION, SERVER_SOURCE,
};
use crate::error::Result;

/// Response to an artifact request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl FetchResponse {
    /// True for 2xx statuses.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetches tool artifacts by URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Requests `url`. Non-2xx statuses are responses, not errors; errors
    /// mean the request could not be completed.
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// Built-in artifact of `kind`, as served by a lurepl dev server.
pub fn embedded_artifact(kind: ToolKind) -> String {
    artifact(kind, FRAMEWORK_VERSION)
}

fn descriptor(name: &str, version: &str) -> String {
    serde_json::to_string_pretty(&ToolDescriptor::new(name, version)).unwrap_or_default()
}

fn artifact(kind: ToolKind, framework_version: &str) -> String {
    match kind {
        ToolKind::Core if framework_version == FRAMEWORK_VERSION => CORE_SOURCE.to_string(),
        ToolKind::Core => CORE_SOURCE.replacen(
            &format!("version = \"{}\"", FRAMEWORK_VERSION),
            &format!("version = \"{}\"", framework_version),
            1,
        ),
        ToolKind::Server => SERVER_SOURCE.to_string(),
        ToolKind::Compiler => descriptor("lurepl-compiler", framework_version),
        ToolKind::Bundler => descriptor("lurepl-bundler", BUNDLER_VERSION),
        ToolKind::Printer => descriptor("lurepl-printer", PRINTER_VERSION),
        ToolKind::PrinterHtml => descriptor("lurepl-printer-html", PRINTER_VERSION),
        ToolKind::Minifier => descriptor("lurepl-minify", MINIFIER_VERSION),
    }
}

const ALL_KINDS: [ToolKind; 7] = [
    ToolKind::Core,
    ToolKind::Compiler,
    ToolKind::Bundler,
    ToolKind::Server,
    ToolKind::Printer,
    ToolKind::PrinterHtml,
    ToolKind::Minifier,
];

/// Serves the built-in artifacts without touching the network.
///
/// Requests are counted so callers can observe version gating.
#[derive(Debug)]
pub struct EmbeddedFetcher {
    urls: ToolUrls,
    framework_version: String,
    count: AtomicUsize,
}

impl EmbeddedFetcher {
    /// Serves artifacts at the locations described by `urls`.
    pub fn new(urls: ToolUrls) -> Self {
        Self::with_framework_version(urls, FRAMEWORK_VERSION)
    }

    /// Like [`EmbeddedFetcher::new`], but the core runtime and compiler
    /// report `version`.
    pub fn with_framework_version(urls: ToolUrls, version: impl Into<String>) -> Self {
        Self {
            urls,
            framework_version: version.into(),
            count: AtomicUsize::new(0),
        }
    }

    /// Number of requests served so far, including misses.
    pub fn fetch_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for EmbeddedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let found = ALL_KINDS.into_iter().find(|kind| self.urls.url(*kind) == url);
        Ok(match found {
            Some(kind) => FetchResponse {
                status: 200,
                body: artifact(kind, &self.framework_version),
            },
            None => FetchResponse {
                status: 404,
                body: String::new(),
            },
        })
    }
}
