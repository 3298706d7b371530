// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Bundler plugin adapter for any [`Compiler`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{Compiler, Target, TransformOptions};
use crate::bundler::{BundlerPlugin, EmittedModule, OutputAsset, OutputItem, ResolvedId, TransformResult};
use crate::error::Result;
use crate::paths;
use crate::types::{SourceInput, SymbolEntry, SymbolManifest};

/// File name of the symbol manifest asset.
pub const MANIFEST_FILE: &str = "q-manifest.json";

/// Data collected by a [`CompilerPlugin`] while generating a bundle.
#[derive(Debug, Default)]
pub struct CompilerOutputs {
    symbols: Mutex<Option<SymbolManifest>>,
    transformed: Mutex<BTreeMap<String, String>>,
}

impl CompilerOutputs {
    /// Symbol manifest of the last generated client bundle.
    pub fn symbols(&self) -> Option<SymbolManifest> {
        self.symbols.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Transformed source per module id.
    pub fn transformed(&self) -> BTreeMap<String, String> {
        self.transformed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Runs a [`Compiler`] over the source inputs of a bundle.
pub struct CompilerPlugin {
    compiler: Arc<dyn Compiler>,
    options: TransformOptions,
    inputs: BTreeMap<String, String>,
    outputs: Arc<CompilerOutputs>,
}

impl CompilerPlugin {
    /// Creates the plugin for one bundle pass.
    pub fn new(compiler: Arc<dyn Compiler>, options: TransformOptions, inputs: &[SourceInput]) -> Self {
        Self {
            compiler,
            options,
            inputs: inputs.iter().map(|i| (i.path.clone(), i.code.clone())).collect(),
            outputs: Arc::new(CompilerOutputs::default()),
        }
    }

    /// Side channel filled in `generate_bundle`.
    pub fn outputs(&self) -> Arc<CompilerOutputs> {
        self.outputs.clone()
    }
}

impl BundlerPlugin for CompilerPlugin {
    fn name(&self) -> &str {
        "lurepl-compiler"
    }

    fn cache_key(&self) -> String {
        format!(
            "lurepl-compiler@{}:{}:{}:{}",
            self.compiler.version(),
            self.options.target.as_str(),
            self.options.entry_strategy,
            self.options.debug
        )
    }

    fn resolve_id(&self, specifier: &str, importer: Option<&str>) -> Result<Option<ResolvedId>> {
        let Some(importer) = importer else {
            return Ok(None);
        };
        if !paths::is_path_like(specifier) {
            return Ok(None);
        }
        let candidate = paths::resolve_relative(importer, specifier);
        if self.inputs.contains_key(&candidate) {
            return Ok(Some(ResolvedId::internal(candidate)));
        }
        let with_ext = format!("{}.lua", candidate);
        if self.inputs.contains_key(&with_ext) {
            return Ok(Some(ResolvedId::internal(with_ext)));
        }
        Ok(None)
    }

    fn load(&self, id: &str) -> Result<Option<String>> {
        Ok(self.inputs.get(id).cloned())
    }

    fn transform(&self, code: &str, id: &str) -> Result<Option<TransformResult>> {
        if !id.ends_with(".lua") || !self.inputs.contains_key(id) {
            return Ok(None);
        }
        let output = self.compiler.transform_module(id, code, &self.options)?;
        Ok(Some(TransformResult {
            code: output.code,
            emitted: output
                .segments
                .into_iter()
                .map(|segment| EmittedModule {
                    id: segment.id,
                    code: segment.code,
                    segment: Some(segment.meta),
                })
                .collect(),
            warnings: output.warnings,
        }))
    }

    fn generate_bundle(&self, bundle: &mut Vec<OutputItem>) -> Result<()> {
        let mut manifest = SymbolManifest::default();
        let mut transformed = BTreeMap::new();

        for chunk in bundle.iter().filter_map(OutputItem::as_chunk) {
            for module in &chunk.modules {
                if let Some(segment) = &module.segment {
                    let file = chunk.is_dynamic_entry.then(|| chunk.file_name.clone());
                    if let Some(file) = &file {
                        manifest.mapping.insert(segment.symbol.clone(), file.clone());
                    }
                    manifest.symbols.insert(
                        segment.symbol.clone(),
                        SymbolEntry {
                            name: segment.name.clone(),
                            kind: segment.kind,
                            parent: segment.parent.clone(),
                            chunk: file,
                        },
                    );
                }
                if module.segment.is_some() || self.inputs.contains_key(&module.id) {
                    transformed.insert(module.id.clone(), module.code.clone());
                }
            }
        }

        if self.options.target == Target::Client {
            bundle.push(OutputItem::Asset(OutputAsset {
                file_name: MANIFEST_FILE.to_string(),
                source: serde_json::to_string_pretty(&manifest)?,
            }));
        }

        tracing::debug!(
            "{} symbol(s) in {} manifest",
            manifest.symbols.len(),
            self.options.target.as_str()
        );
        *self.outputs.symbols.lock().unwrap_or_else(|e| e.into_inner()) = Some(manifest);
        *self.outputs.transformed.lock().unwrap_or_else(|e| e.into_inner()) = transformed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{OutputChunk, RenderedModule, SegmentMeta};
    use crate::compiler::SegmentCompiler;
    use crate::types::{EntryStrategy, SegmentKind};

    fn plugin(target: Target) -> CompilerPlugin {
        let inputs = vec![
            SourceInput::new("/app.lua", "return component(function() return 1 end)"),
            SourceInput::new("/lib/util.lua", "return {}"),
        ];
        let options = TransformOptions {
            target,
            entry_strategy: EntryStrategy::Segment,
            debug: false,
        };
        CompilerPlugin::new(Arc::new(SegmentCompiler::new("0.4.0")), options, &inputs)
    }

    #[test]
    fn resolves_relative_inputs_probing_extension() {
        let plugin = plugin(Target::Client);
        let resolved = plugin.resolve_id("./lib/util", Some("/app.lua")).unwrap();
        assert_eq!(resolved, Some(ResolvedId::internal("/lib/util.lua")));
        assert_eq!(plugin.resolve_id("../app.lua", Some("/lib/util.lua")).unwrap(), Some(ResolvedId::internal("/app.lua")));
        assert_eq!(plugin.resolve_id("./missing", Some("/app.lua")).unwrap(), None);
        assert_eq!(plugin.resolve_id("@lurepl/core", Some("/app.lua")).unwrap(), None);
        assert_eq!(plugin.resolve_id("/app.lua", None).unwrap(), None);
    }

    #[test]
    fn cache_key_reflects_configuration() {
        assert_eq!(plugin(Target::Client).cache_key(), "lurepl-compiler@0.4.0:client:segment:false");
        assert_eq!(plugin(Target::Server).cache_key(), "lurepl-compiler@0.4.0:server:segment:false");
    }

    #[test]
    fn transform_emits_segments_for_inputs_only() {
        let plugin = plugin(Target::Client);
        let result = plugin
            .transform("return component(function() return 1 end)", "/app.lua")
            .unwrap()
            .unwrap();
        assert_eq!(result.emitted.len(), 1);
        assert!(result.emitted[0].segment.is_some());

        assert!(plugin.transform("return 1", "\0lurepl-core").unwrap().is_none());
    }

    #[test]
    fn generate_bundle_builds_manifest() {
        let plugin = plugin(Target::Client);
        let meta = SegmentMeta {
            symbol: "s_abc".to_string(),
            name: "app_component".to_string(),
            kind: SegmentKind::Component,
            parent: "/app.lua".to_string(),
            group: None,
        };
        let mut bundle = vec![
            OutputItem::Chunk(OutputChunk {
                file_name: "app.lua".to_string(),
                code: String::new(),
                is_entry: true,
                is_dynamic_entry: false,
                modules: vec![RenderedModule {
                    id: "/app.lua".to_string(),
                    code: "transformed".to_string(),
                    segment: None,
                }],
            }),
            OutputItem::Chunk(OutputChunk {
                file_name: "q-1234abcd.lua".to_string(),
                code: String::new(),
                is_entry: false,
                is_dynamic_entry: true,
                modules: vec![RenderedModule {
                    id: "/app_component_abc.lua".to_string(),
                    code: "return function() end".to_string(),
                    segment: Some(meta),
                }],
            }),
        ];

        plugin.generate_bundle(&mut bundle).unwrap();

        assert_eq!(bundle.last().map(OutputItem::file_name), Some(MANIFEST_FILE));
        let outputs = plugin.outputs();
        let manifest = outputs.symbols().unwrap();
        assert_eq!(manifest.mapping.get("s_abc").map(String::as_str), Some("q-1234abcd.lua"));
        assert_eq!(manifest.symbols["s_abc"].name, "app_component");

        let transformed = outputs.transformed();
        assert_eq!(transformed.get("/app.lua").map(String::as_str), Some("transformed"));
        assert!(transformed.contains_key("/app_component_abc.lua"));
    }

    #[test]
    fn server_bundle_has_no_manifest_asset() {
        let plugin = plugin(Target::Server);
        let mut bundle = Vec::new();
        plugin.generate_bundle(&mut bundle).unwrap();
        assert!(bundle.is_empty());
    }
}
