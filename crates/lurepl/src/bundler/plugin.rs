// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Bundler plugin interface.
//!
//! Hooks run in plugin order. For `resolve_id` and `load` the first plugin
//! returning `Some` wins; `transform` and `render_chunk` are chained.

use crate::error::Result;
use crate::types::SegmentKind;

use super::output::OutputItem;

/// A resolved import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    /// Module id.
    pub id: String,
    /// External ids are left to the runtime.
    pub external: bool,
}

impl ResolvedId {
    /// An id that is bundled.
    pub fn internal(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }

    /// An id that is left untouched in the output.
    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
        }
    }
}

/// Metadata attached to a module extracted as a lazy segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Symbol id, e.g. `s_0f3a9c81d2`.
    pub symbol: String,
    /// Display name, e.g. `app_component`.
    pub name: String,
    /// Segment kind.
    pub kind: SegmentKind,
    /// Module the segment was extracted from.
    pub parent: String,
    /// Segments sharing a group share a chunk; `None` means a chunk of its own.
    pub group: Option<String>,
}

/// A module produced by a transform, registered as a virtual module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedModule {
    /// Module id.
    pub id: String,
    /// Final module code; emitted modules are not transformed again.
    pub code: String,
    /// Segment metadata.
    pub segment: Option<SegmentMeta>,
}

/// Output of a `transform` hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformResult {
    /// Transformed code.
    pub code: String,
    /// Additional modules to register.
    pub emitted: Vec<EmittedModule>,
    /// Non-fatal notices.
    pub warnings: Vec<String>,
}

impl TransformResult {
    /// A transform that only rewrites code.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }
}

/// Chunk information passed to `render_chunk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Output file name.
    pub file_name: String,
    /// The chunk holds the bundle input.
    pub is_entry: bool,
    /// The chunk is loaded through `import(...)`.
    pub is_dynamic_entry: bool,
}

/// A bundler plugin.
pub trait BundlerPlugin: Send + Sync {
    /// Plugin name, used in error messages.
    fn name(&self) -> &str;

    /// Key identifying the plugin configuration; transform results are
    /// cached per combination of keys.
    fn cache_key(&self) -> String {
        self.name().to_string()
    }

    /// Resolves an import specifier.
    fn resolve_id(&self, _specifier: &str, _importer: Option<&str>) -> Result<Option<ResolvedId>> {
        Ok(None)
    }

    /// Loads the source of a resolved id.
    fn load(&self, _id: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Transforms a loaded module.
    fn transform(&self, _code: &str, _id: &str) -> Result<Option<TransformResult>> {
        Ok(None)
    }

    /// Rewrites the rendered code of a chunk.
    fn render_chunk(&self, _code: &str, _chunk: &ChunkInfo) -> Result<Option<String>> {
        Ok(None)
    }

    /// Inspects or extends the final output.
    fn generate_bundle(&self, _bundle: &mut Vec<OutputItem>) -> Result<()> {
        Ok(())
    }
}
