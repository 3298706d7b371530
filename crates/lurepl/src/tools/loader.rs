// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Version-gated tool loading.

use futures_util::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;

use super::{Fetcher, RuntimeBundle, ToolDescriptor, ToolFactories, ToolKind, ToolSet, ToolUrls, BUNDLER_VERSION};
use crate::bundler::BundlerCache;
use crate::cycle::BuildContext;
use crate::error::{ReplError, Result};
use crate::types::{BuildOptions, MinifyMode};

/// Fetches and activates the tool set a build needs.
pub struct DependencyLoader {
    fetcher: Arc<dyn Fetcher>,
    urls: ToolUrls,
    factories: ToolFactories,
}

impl DependencyLoader {
    /// Creates a loader with the default tool factories.
    pub fn new(fetcher: Arc<dyn Fetcher>, urls: ToolUrls) -> Self {
        Self::with_factories(fetcher, urls, ToolFactories::default())
    }

    /// Creates a loader with custom tool factories.
    pub fn with_factories(fetcher: Arc<dyn Fetcher>, urls: ToolUrls, factories: ToolFactories) -> Self {
        Self {
            fetcher,
            urls,
            factories,
        }
    }

    /// Artifact locations.
    pub fn urls(&self) -> &ToolUrls {
        &self.urls
    }

    /// Makes sure `ctx` holds a tool set for `version`, plus a minifier when
    /// `options` ask for minification.
    pub async fn ensure_tools(&self, ctx: &mut BuildContext, version: &str, options: &BuildOptions) -> Result<()> {
        let current = ctx.tools.as_ref().map(|tools| tools.matches(version)).unwrap_or(false);
        if !current {
            self.reload(ctx, version).await?;
        }
        if options.minify == MinifyMode::Minify && ctx.minifier.is_none() {
            self.ensure_minifier(ctx).await?;
        }
        Ok(())
    }

    async fn reload(&self, ctx: &mut BuildContext, version: &str) -> Result<()> {
        let start = Instant::now();
        tracing::debug!("loading tools for framework {}", version);
        ctx.tools = None;
        ctx.bundler_cache = None;

        let bodies = try_join_all(ToolKind::REQUIRED.iter().map(|kind| self.fetch_artifact(*kind))).await?;
        let [core, compiler, bundler, server, printer, printer_html]: [String; 6] = bodies
            .try_into()
            .map_err(|_| ReplError::Bundle("tool fetch returned an unexpected number of artifacts".to_string()))?;

        let core = RuntimeBundle::core(&core)?;
        let compiler = (self.factories.compiler)(&ToolDescriptor::parse(ToolKind::Compiler, &compiler)?)?;
        let bundler = (self.factories.bundler)(&ToolDescriptor::parse(ToolKind::Bundler, &bundler)?)?;
        let server = RuntimeBundle::server(&server, &core)?;
        let mut printer = (self.factories.printer)(&ToolDescriptor::parse(ToolKind::Printer, &printer)?)?;
        let plugin = (self.factories.printer_plugin)(&ToolDescriptor::parse(ToolKind::PrinterHtml, &printer_html)?)?;
        printer.add_plugin(plugin);

        if core.version != version {
            tracing::warn!("requested framework {} but core runtime reports {}", version, core.version);
        }
        if compiler.version() != version {
            tracing::warn!("requested framework {} but compiler reports {}", version, compiler.version());
        }
        if bundler.version() != BUNDLER_VERSION {
            tracing::warn!("expected bundler {} but got {}", BUNDLER_VERSION, bundler.version());
        }

        ctx.bundler_cache = Some(BundlerCache::new(bundler.version(), ctx.cache_capacity));
        ctx.tools = Some(ToolSet {
            core: Arc::new(core),
            server: Arc::new(server),
            compiler,
            bundler,
            printer,
        });

        tracing::debug!("tools loaded in {}ms", start.elapsed().as_millis());
        Ok(())
    }

    /// Loads the minifier if none is active.
    pub async fn ensure_minifier(&self, ctx: &mut BuildContext) -> Result<()> {
        if ctx.minifier.is_some() {
            return Ok(());
        }
        let body = self.fetch_artifact(ToolKind::Minifier).await?;
        let minifier = (self.factories.minifier)(&ToolDescriptor::parse(ToolKind::Minifier, &body)?)?;
        tracing::debug!("minifier {} loaded", minifier.version());
        ctx.minifier = Some(minifier);
        Ok(())
    }

    async fn fetch_artifact(&self, kind: ToolKind) -> Result<String> {
        let url = self.urls.url(kind);
        let response = self.fetcher.fetch(&url).await?;
        if !response.is_ok() {
            return Err(ReplError::DependencyFetch {
                url,
                status: response.status,
            });
        }
        tracing::trace!("fetched {} ({} bytes)", kind.as_str(), response.body.len());
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EmbeddedFetcher, FetchResponse, FRAMEWORK_VERSION};
    use async_trait::async_trait;

    fn loader() -> (Arc<EmbeddedFetcher>, DependencyLoader) {
        let urls = ToolUrls::default();
        let fetcher = Arc::new(EmbeddedFetcher::new(urls.clone()));
        (fetcher.clone(), DependencyLoader::new(fetcher, urls))
    }

    #[tokio::test]
    async fn same_version_does_not_refetch() {
        let (fetcher, loader) = loader();
        let mut ctx = BuildContext::default();
        let options = BuildOptions::default();

        loader.ensure_tools(&mut ctx, FRAMEWORK_VERSION, &options).await.unwrap();
        assert_eq!(fetcher.fetch_count(), 6);
        assert!(ctx.bundler_cache.is_some());
        assert!(ctx.minifier.is_none());

        loader.ensure_tools(&mut ctx, FRAMEWORK_VERSION, &options).await.unwrap();
        assert_eq!(fetcher.fetch_count(), 6);
    }

    #[tokio::test]
    async fn version_change_reloads_everything() {
        let (fetcher, loader) = loader();
        let mut ctx = BuildContext::default();
        let options = BuildOptions::default();
        loader.ensure_tools(&mut ctx, FRAMEWORK_VERSION, &options).await.unwrap();

        loader.ensure_tools(&mut ctx, "0.5.0", &options).await.unwrap();
        assert_eq!(fetcher.fetch_count(), 12);
        // The embedded artifacts still report 0.4.0.
        assert_eq!(ctx.tools.as_ref().map(|t| t.core.version.clone()), Some(FRAMEWORK_VERSION.to_string()));
    }

    #[tokio::test]
    async fn minifier_is_loaded_once_and_survives_reloads() {
        let (fetcher, loader) = loader();
        let mut ctx = BuildContext::default();
        let options = BuildOptions {
            minify: MinifyMode::Minify,
            ..BuildOptions::default()
        };

        loader.ensure_tools(&mut ctx, FRAMEWORK_VERSION, &options).await.unwrap();
        assert_eq!(fetcher.fetch_count(), 7);
        loader.ensure_tools(&mut ctx, "0.9.0", &options).await.unwrap();
        assert_eq!(fetcher.fetch_count(), 13);
        assert!(ctx.minifier.is_some());
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            let status = if url.ends_with("server.lua") { 503 } else { 200 };
            let kind = ToolKind::REQUIRED
                .into_iter()
                .find(|kind| ToolUrls::default().url(*kind) == url)
                .unwrap_or(ToolKind::Minifier);
            Ok(FetchResponse {
                status,
                body: crate::tools::embedded_artifact(kind),
            })
        }
    }

    #[tokio::test]
    async fn non_ok_response_fails_and_leaves_no_tools() {
        let loader = DependencyLoader::new(Arc::new(FailingFetcher), ToolUrls::default());
        let mut ctx = BuildContext::default();
        let err = loader
            .ensure_tools(&mut ctx, FRAMEWORK_VERSION, &BuildOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to load dependency http://localhost:3000/repl/server.lua: HTTP 503"
        );
        assert!(ctx.tools.is_none());
        assert!(ctx.bundler_cache.is_none());
    }
}
