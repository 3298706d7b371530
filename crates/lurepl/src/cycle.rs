// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The build cycle.
//!
//! A cycle moves through its phases in order and ends in `Completed` or
//! `Failed`:
//!
//! ```text
//! Idle -> LoadingDeps -> BundlingClient -> BundlingServer -> Rendering -> Formatting -> Completed
//!   \__________\______________\________________\______________\____________\-> Failed
//! ```
//!
//! Failure never escapes as an error: it is turned into a single `Error`
//! diagnostic and the partially filled result is returned so the host always
//! hears back.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::bundler::{BundlerCache, DEFAULT_CACHE_CAPACITY};
use crate::compiler::Target;
use crate::error::{ReplError, Result};
use crate::minify::Minifier;
use crate::orchestrator::Orchestrator;
use crate::printer::PrintOptions;
use crate::render::{render_server, RenderOptions};
use crate::sandbox::{IsolatedExecutor, LuaSandbox};
use crate::tools::{DependencyLoader, ToolSet};
use crate::types::{BuildOptions, BuildResult, Diagnostic};

/// Phase of a build cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Not started.
    Idle,
    /// Fetching and activating tools.
    LoadingDeps,
    /// Running the client bundle pass.
    BundlingClient,
    /// Running the server bundle pass.
    BundlingServer,
    /// Executing the server chunk.
    Rendering,
    /// Pretty-printing the rendered document.
    Formatting,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl CycleState {
    /// Returns the lowercase phase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::LoadingDeps => "loading-deps",
            CycleState::BundlingClient => "bundling-client",
            CycleState::BundlingServer => "bundling-server",
            CycleState::Rendering => "rendering",
            CycleState::Formatting => "formatting",
            CycleState::Completed => "completed",
            CycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State that survives between cycles.
pub struct BuildContext {
    /// Active version-gated tools.
    pub tools: Option<ToolSet>,
    /// Minifier, loaded on first use.
    pub minifier: Option<Arc<dyn Minifier>>,
    /// Transform cache, reset whenever the tools reload.
    pub bundler_cache: Option<BundlerCache>,
    /// Capacity of a newly created bundler cache.
    pub cache_capacity: usize,
}

impl BuildContext {
    /// Creates an empty context whose caches hold up to `capacity` modules.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            tools: None,
            minifier: None,
            bundler_cache: None,
            cache_capacity: capacity,
        }
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("tools", &self.tools)
            .field("minifier", &self.minifier.as_ref().map(|m| m.version().to_string()))
            .field("cached_modules", &self.bundler_cache.as_ref().map(BundlerCache::len))
            .finish()
    }
}

/// Cycle settings that do not come from the host.
#[derive(Clone)]
pub struct CycleConfig {
    /// Executor for the server chunk.
    pub executor: Arc<dyn IsolatedExecutor>,
    /// Options passed to `render`.
    pub render: RenderOptions,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            executor: Arc::new(LuaSandbox::default()),
            render: RenderOptions::default(),
        }
    }
}

/// Result of [`run_cycle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    /// The result to publish.
    pub result: BuildResult,
    /// Final state, `Completed` or `Failed`.
    pub state: CycleState,
}

impl CycleOutcome {
    /// True when the cycle completed.
    pub fn is_completed(&self) -> bool {
        self.state == CycleState::Completed
    }
}

struct PhaseClock {
    state: CycleState,
    cycle_start: Instant,
    phase_start: Instant,
}

impl PhaseClock {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            state: CycleState::Idle,
            cycle_start: now,
            phase_start: now,
        }
    }

    fn enter(&mut self, next: CycleState) {
        tracing::debug!(
            "{} -> {} ({}ms)",
            self.state,
            next,
            self.phase_start.elapsed().as_millis()
        );
        self.state = next;
        self.phase_start = Instant::now();
    }
}

/// Runs one build cycle against `ctx`.
pub async fn run_cycle(
    ctx: &mut BuildContext,
    loader: &DependencyLoader,
    version: &str,
    options: &BuildOptions,
    config: &CycleConfig,
) -> CycleOutcome {
    let mut result = BuildResult::default();
    let mut clock = PhaseClock::new();

    match drive(ctx, loader, version, options, config, &mut result, &mut clock).await {
        Ok(()) => clock.enter(CycleState::Completed),
        Err(err) => {
            tracing::warn!("build failed while {}: {}", clock.state, err);
            result.diagnostics.push(Diagnostic::error(err.to_string()));
            clock.enter(CycleState::Failed);
        }
    }

    tracing::info!(
        "cycle {} in {}ms: {} client module(s), {} diagnostic(s)",
        clock.state,
        clock.cycle_start.elapsed().as_millis(),
        result.client_modules.len(),
        result.diagnostics.len()
    );

    CycleOutcome {
        result,
        state: clock.state,
    }
}

async fn drive(
    ctx: &mut BuildContext,
    loader: &DependencyLoader,
    version: &str,
    options: &BuildOptions,
    config: &CycleConfig,
    result: &mut BuildResult,
    clock: &mut PhaseClock,
) -> Result<()> {
    clock.enter(CycleState::LoadingDeps);
    loader.ensure_tools(ctx, version, options).await?;

    let BuildContext {
        tools,
        minifier,
        bundler_cache,
        cache_capacity,
    } = ctx;
    let tools = tools
        .as_ref()
        .ok_or_else(|| ReplError::Bundle("no tools are loaded".to_string()))?;
    let stale = bundler_cache
        .as_ref()
        .map_or(true, |cache| cache.bundler_version() != tools.bundler.version());
    if stale {
        *bundler_cache = None;
    }
    let cache = bundler_cache.get_or_insert_with(|| BundlerCache::new(tools.bundler.version(), *cache_capacity));
    let mut orchestrator = Orchestrator::new(tools, cache, minifier.clone());

    clock.enter(CycleState::BundlingClient);
    let client = orchestrator.bundle(options, &mut result.diagnostics, Target::Client)?;
    result.client_modules = client.modules;
    result.symbols_entry_map = client.symbols;
    result.transformed_module_output = client.transformed;

    if !options.ssr_build {
        return Ok(());
    }

    clock.enter(CycleState::BundlingServer);
    let server = orchestrator.bundle(options, &mut result.diagnostics, Target::Server)?;
    result.server_modules = server.modules;

    clock.enter(CycleState::Rendering);
    let rendered = render_server(
        config.executor.clone(),
        &result.server_modules,
        (tools.core.clone(), tools.server.clone()),
        result.symbols_entry_map.as_ref(),
        &config.render,
    )
    .await?;
    result.app_html = rendered.app_html;
    result.loader_script = rendered.loader_script;
    result.doc_element_attributes = rendered.doc_element_attributes;
    result.head_attributes = rendered.head_attributes;
    result.body_attributes = rendered.body_attributes;
    result.body_inner_html = rendered.body_inner_html;

    clock.enter(CycleState::Formatting);
    result.output_html = tools.printer.format(&rendered.html, &PrintOptions::parser("html"))?;

    Ok(())
}
