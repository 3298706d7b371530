// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Client and server bundle passes.
//!
//! Both passes run the same plugin chain, compiler first and virtual
//! resolver second, and share the build context's bundler cache. They
//! differ in entry module, compile target and chunking:
//!
//! | pass   | input               | strategy     | dynamic imports |
//! |--------|---------------------|--------------|-----------------|
//! | client | `/app.lua`          | as requested | own chunks      |
//! | server | `/entry.server.lua` | inline       | inlined         |

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bundler::{BundlerCache, BundlerPlugin, BundlerWarning, InputOptions, OutputItem, OutputOptions};
use crate::compiler::{CompilerPlugin, Target, TransformOptions, MANIFEST_FILE};
use crate::error::Result;
use crate::minify::{Minifier, MinifyPlugin};
use crate::resolver::{ReplResolverPlugin, VirtualResolver};
use crate::tools::ToolSet;
use crate::types::{
    BuildOptions, Diagnostic, EntryStrategy, MinifyMode, ModuleOutput, SymbolManifest, CLIENT_ENTRY, SERVER_ENTRY,
};

/// Normalized output of one bundle pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetOutput {
    /// Visible chunks and assets.
    pub modules: Vec<ModuleOutput>,
    /// Symbol manifest collected by the compiler plugin.
    pub symbols: Option<SymbolManifest>,
    /// Transformed source per module id.
    pub transformed: BTreeMap<String, String>,
}

/// Drives bundle passes with one tool set and cache.
pub struct Orchestrator<'a> {
    tools: &'a ToolSet,
    cache: &'a mut BundlerCache,
    minifier: Option<Arc<dyn Minifier>>,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator over an active tool set.
    pub fn new(tools: &'a ToolSet, cache: &'a mut BundlerCache, minifier: Option<Arc<dyn Minifier>>) -> Self {
        Self { tools, cache, minifier }
    }

    /// Runs one bundle pass for `target`. Bundler warnings are appended to
    /// `diagnostics` as they are reported.
    pub fn bundle(
        &mut self,
        options: &BuildOptions,
        diagnostics: &mut Vec<Diagnostic>,
        target: Target,
    ) -> Result<TargetOutput> {
        let (input, strategy) = match target {
            Target::Client => (CLIENT_ENTRY, options.entry_strategy),
            Target::Server => (SERVER_ENTRY, EntryStrategy::Inline),
        };
        let transform = TransformOptions {
            target,
            entry_strategy: strategy,
            debug: options.debug,
        };

        let compiler = Arc::new(CompilerPlugin::new(
            self.tools.compiler.clone(),
            transform,
            &options.src_inputs,
        ));
        let outputs = compiler.outputs();
        let resolver = Arc::new(ReplResolverPlugin::new(VirtualResolver::new(
            target,
            &options.src_inputs,
            self.tools.core.clone(),
            self.tools.server.clone(),
        )));
        let plugins: Vec<Arc<dyn BundlerPlugin>> = vec![compiler, resolver];

        let mut on_warn = |warning: BundlerWarning| {
            tracing::debug!("{} bundle warning: {}", target.as_str(), warning);
            diagnostics.push(Diagnostic::warning(warning.message));
        };
        let graph = self.tools.bundler.rollup(InputOptions {
            input: input.to_string(),
            plugins,
            cache: Some(&mut *self.cache),
            on_warn: Some(&mut on_warn),
        })?;

        let mut output_plugins: Vec<Arc<dyn BundlerPlugin>> = Vec::new();
        if target == Target::Client && options.minify == MinifyMode::Minify {
            match &self.minifier {
                Some(minifier) => output_plugins.push(Arc::new(MinifyPlugin::new(minifier.clone()))),
                None => tracing::warn!("minification requested but no minifier is loaded"),
            }
        }

        let items = graph.generate(&OutputOptions {
            inline_dynamic_imports: target == Target::Server,
            plugins: output_plugins,
        })?;

        Ok(TargetOutput {
            modules: normalize(items),
            symbols: outputs.symbols(),
            transformed: outputs.transformed(),
        })
    }
}

/// Turns bundle items into Module Outputs.
///
/// The manifest asset is internal. The entry chunk is hidden whenever
/// segments were split into dynamic chunks: the host only loads those.
fn normalize(items: Vec<OutputItem>) -> Vec<ModuleOutput> {
    let split = items
        .iter()
        .filter_map(OutputItem::as_chunk)
        .any(|chunk| chunk.is_dynamic_entry);

    items
        .into_iter()
        .filter_map(|item| match item {
            OutputItem::Asset(asset) if asset.file_name == MANIFEST_FILE => None,
            OutputItem::Asset(asset) => Some(ModuleOutput::new(asset.file_name, asset.source, false)),
            OutputItem::Chunk(chunk) if split && chunk.is_entry && !chunk.is_dynamic_entry => None,
            OutputItem::Chunk(chunk) => Some(ModuleOutput::new(chunk.file_name, chunk.code, chunk.is_dynamic_entry)),
        })
        .collect()
}
