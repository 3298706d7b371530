// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Module bundler for Lua component sources.
//!
//! Bundling happens in two phases, mirroring the usual bundler API:
//!
//! 1. [`Bundler::rollup`] walks the module graph from the input, running
//!    every module through the plugin chain (`resolve_id` → `load` →
//!    `transform`) and scanning it for `require`/`import` calls.
//! 2. [`ModuleGraph::generate`] groups modules into chunks, renders each
//!    chunk as a self-registering Lua chunk and hands the result to the
//!    output hooks (`render_chunk`, `generate_bundle`).
//!
//! Transform results are cached across builds in a [`BundlerCache`].

mod cache;
mod chunk;
mod output;
mod plugin;

pub use cache::{content_hash, BundlerCache, CachedModule, DEFAULT_CACHE_CAPACITY};
pub use output::{OutputAsset, OutputChunk, OutputItem, RenderedModule};
pub use plugin::{BundlerPlugin, ChunkInfo, EmittedModule, ResolvedId, SegmentMeta, TransformResult};

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::dependencies::{self, ImportSite};
use crate::error::{ReplError, Result};
use crate::paths;

/// Category of a bundler warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCode {
    /// Modules import each other statically.
    CircularDependency,
    /// A plugin reported a notice while transforming.
    Plugin,
}

/// A non-fatal bundler notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlerWarning {
    /// Warning category.
    pub code: WarningCode,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for BundlerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Options for [`Bundler::rollup`].
pub struct InputOptions<'a> {
    /// Entry module specifier.
    pub input: String,
    /// Plugins, in hook order.
    pub plugins: Vec<Arc<dyn BundlerPlugin>>,
    /// Transform cache, updated in place.
    pub cache: Option<&'a mut BundlerCache>,
    /// Receives warnings once the graph is complete.
    pub on_warn: Option<&'a mut dyn FnMut(BundlerWarning)>,
}

impl<'a> InputOptions<'a> {
    /// Options with an input and plugins, without cache or warning hook.
    pub fn new(input: impl Into<String>, plugins: Vec<Arc<dyn BundlerPlugin>>) -> Self {
        Self {
            input: input.into(),
            plugins,
            cache: None,
            on_warn: None,
        }
    }
}

/// Options for [`ModuleGraph::generate`].
#[derive(Default, Clone)]
pub struct OutputOptions {
    /// Put dynamically imported modules into the entry chunk.
    pub inline_dynamic_imports: bool,
    /// Output-only plugins, run after the input plugins.
    pub plugins: Vec<Arc<dyn BundlerPlugin>>,
}

/// A bundler implementation.
pub trait Bundler: Send + Sync {
    /// Version tag used for dependency gating.
    fn version(&self) -> &str;

    /// Builds the module graph for `options.input`.
    fn rollup(&self, options: InputOptions<'_>) -> Result<ModuleGraph>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ImportTarget {
    Internal(String),
    External(String),
}

#[derive(Debug, Clone)]
struct ImportRecord {
    site: ImportSite,
    target: ImportTarget,
}

#[derive(Debug, Clone)]
struct GraphModule {
    id: String,
    code: String,
    imports: Vec<ImportRecord>,
    segment: Option<SegmentMeta>,
}

impl GraphModule {
    fn internal_imports(&self, dynamic: bool) -> impl Iterator<Item = &str> {
        self.imports.iter().filter_map(move |record| match &record.target {
            ImportTarget::Internal(id) if record.site.dynamic == dynamic => Some(id.as_str()),
            _ => None,
        })
    }
}

/// A fully resolved and transformed module graph.
pub struct ModuleGraph {
    entry: String,
    modules: Vec<GraphModule>,
    index: HashMap<String, usize>,
    rank: Vec<usize>,
    plugins: Vec<Arc<dyn BundlerPlugin>>,
}

impl fmt::Debug for ModuleGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleGraph")
            .field("entry", &self.entry)
            .field("modules", &self.modules.iter().map(|m| &m.id).collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleGraph {
    /// Id of the entry module.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Module ids in discovery order.
    pub fn module_ids(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.id.as_str())
    }

    /// External specifiers referenced anywhere in the graph.
    pub fn externals(&self) -> Vec<&str> {
        let mut externals: Vec<&str> = self
            .modules
            .iter()
            .flat_map(|m| m.imports.iter())
            .filter_map(|r| match &r.target {
                ImportTarget::External(spec) => Some(spec.as_str()),
                ImportTarget::Internal(_) => None,
            })
            .collect();
        externals.sort_unstable();
        externals.dedup();
        externals
    }
}

/// The built-in bundler.
#[derive(Debug, Clone)]
pub struct LuaBundler {
    version: String,
}

impl LuaBundler {
    /// Creates a bundler reporting the given version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

struct GraphBuilder<'p> {
    plugins: &'p [Arc<dyn BundlerPlugin>],
    pipeline: String,
    emitted: HashMap<String, EmittedModule>,
    modules: Vec<GraphModule>,
    index: HashMap<String, usize>,
    warnings: Vec<BundlerWarning>,
}

impl<'p> GraphBuilder<'p> {
    fn resolve(&self, specifier: &str, importer: Option<&str>) -> Result<ResolvedId> {
        if let Some(importer) = importer {
            if paths::is_path_like(specifier) {
                let candidate = paths::resolve_relative(importer, specifier);
                if self.emitted.contains_key(&candidate) {
                    return Ok(ResolvedId::internal(candidate));
                }
                let with_ext = format!("{}.lua", candidate);
                if self.emitted.contains_key(&with_ext) {
                    return Ok(ResolvedId::internal(with_ext));
                }
            }
        }

        for plugin in self.plugins {
            if let Some(resolved) = plugin.resolve_id(specifier, importer)? {
                return Ok(resolved);
            }
        }

        Err(ReplError::Unresolved {
            specifier: specifier.to_string(),
            importer: importer.unwrap_or("<input>").to_string(),
        })
    }

    fn load(&self, id: &str, importer: Option<&str>) -> Result<String> {
        for plugin in self.plugins {
            if let Some(source) = plugin.load(id)? {
                return Ok(source);
            }
        }
        Err(ReplError::LoadFailed {
            id: id.to_string(),
            importer: importer.map(str::to_string),
        })
    }

    fn transform(&self, id: &str, source: String) -> Result<TransformResult> {
        let mut result = TransformResult::code(source);
        for plugin in self.plugins {
            if let Some(next) = plugin.transform(&result.code, id)? {
                result.code = next.code;
                result.emitted.extend(next.emitted);
                result.warnings.extend(next.warnings);
            }
        }
        Ok(result)
    }

    /// Produces the final code of `id`, consulting the cache.
    fn module_code(
        &mut self,
        id: &str,
        importer: Option<&str>,
        cache: Option<&mut BundlerCache>,
    ) -> Result<(String, Option<SegmentMeta>)> {
        if let Some(emitted) = self.emitted.get(id) {
            return Ok((emitted.code.clone(), emitted.segment.clone()));
        }

        let source = self.load(id, importer)?;
        let source_hash = content_hash(&source);

        let cached = match cache {
            Some(cache) => match cache.get(&self.pipeline, id, &source_hash) {
                Some(hit) => {
                    tracing::trace!("bundler cache hit for {}", id);
                    (*hit).clone()
                }
                None => {
                    let result = self.transform(id, source)?;
                    let entry = CachedModule {
                        source_hash,
                        code: result.code,
                        emitted: result.emitted,
                        warnings: result.warnings,
                    };
                    cache.insert(&self.pipeline, id, entry.clone());
                    entry
                }
            },
            None => {
                let result = self.transform(id, source)?;
                CachedModule {
                    source_hash,
                    code: result.code,
                    emitted: result.emitted,
                    warnings: result.warnings,
                }
            }
        };

        for emitted in cached.emitted {
            self.emitted.insert(emitted.id.clone(), emitted);
        }
        for message in cached.warnings {
            self.warnings.push(BundlerWarning {
                code: WarningCode::Plugin,
                message,
            });
        }

        Ok((cached.code, None))
    }
}

impl Bundler for LuaBundler {
    fn version(&self) -> &str {
        &self.version
    }

    #[tracing::instrument(level = "debug", skip_all, fields(input = %options.input))]
    fn rollup(&self, options: InputOptions<'_>) -> Result<ModuleGraph> {
        let InputOptions {
            input,
            plugins,
            mut cache,
            on_warn,
        } = options;

        let pipeline = plugins
            .iter()
            .map(|p| p.cache_key())
            .collect::<Vec<_>>()
            .join("|");

        let mut builder = GraphBuilder {
            plugins: &plugins,
            pipeline,
            emitted: HashMap::new(),
            modules: Vec::new(),
            index: HashMap::new(),
            warnings: Vec::new(),
        };

        let entry = builder.resolve(&input, None)?;
        if entry.external {
            return Err(ReplError::Bundle(format!("Entry module \"{}\" cannot be external", input)));
        }

        let mut queue: VecDeque<(String, Option<String>)> = VecDeque::new();
        queue.push_back((entry.id.clone(), None));

        while let Some((id, importer)) = queue.pop_front() {
            if builder.index.contains_key(&id) {
                continue;
            }

            let (code, segment) = builder.module_code(&id, importer.as_deref(), cache.as_deref_mut())?;
            let segment = segment.or_else(|| builder.emitted.get(&id).and_then(|e| e.segment.clone()));

            let mut imports = Vec::new();
            for site in dependencies::scan_imports(&id, &code)? {
                let resolved = builder.resolve(&site.specifier, Some(&id))?;
                let target = if resolved.external {
                    ImportTarget::External(resolved.id)
                } else {
                    queue.push_back((resolved.id.clone(), Some(id.clone())));
                    ImportTarget::Internal(resolved.id)
                };
                imports.push(ImportRecord { site, target });
            }

            builder.index.insert(id.clone(), builder.modules.len());
            builder.modules.push(GraphModule {
                id,
                code,
                imports,
                segment,
            });
        }

        let deps: Vec<(String, Vec<String>)> = builder
            .modules
            .iter()
            .map(|m| (m.id.clone(), m.internal_imports(false).map(str::to_string).collect()))
            .collect();
        let ordering = dependencies::order_modules(&deps);

        let mut rank = vec![0; builder.modules.len()];
        for (position, id) in ordering.order.iter().enumerate() {
            if let Some(&index) = builder.index.get(id) {
                rank[index] = position;
            }
        }

        for cycle in ordering.cycles {
            builder.warnings.push(BundlerWarning {
                code: WarningCode::CircularDependency,
                message: format!("Circular dependency: {}", cycle.join(" -> ")),
            });
        }

        let GraphBuilder {
            modules,
            index,
            warnings,
            ..
        } = builder;

        match on_warn {
            Some(on_warn) => {
                for warning in warnings {
                    on_warn(warning);
                }
            }
            None => {
                for warning in &warnings {
                    tracing::warn!("{}", warning);
                }
            }
        }

        tracing::debug!("module graph for {} has {} module(s)", input, modules.len());

        Ok(ModuleGraph {
            entry: entry.id,
            modules,
            index,
            rank,
            plugins,
        })
    }
}
