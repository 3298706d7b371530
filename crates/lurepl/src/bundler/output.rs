// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Generated bundle items.

use super::plugin::SegmentMeta;

/// A module as it was placed into a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedModule {
    /// Module id.
    pub id: String,
    /// Transformed code, before import rewriting.
    pub code: String,
    /// Segment metadata, when the module is an extracted segment.
    pub segment: Option<SegmentMeta>,
}

/// An emitted Lua chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// File name, unique within the bundle.
    pub file_name: String,
    /// Rendered chunk code.
    pub code: String,
    /// The chunk holds the bundle input.
    pub is_entry: bool,
    /// The chunk is loaded through `import(...)`.
    pub is_dynamic_entry: bool,
    /// Modules defined by this chunk.
    pub modules: Vec<RenderedModule>,
}

/// A non-code file added by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAsset {
    /// File name, unique within the bundle.
    pub file_name: String,
    /// Asset text.
    pub source: String,
}

/// One item of a generated bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItem {
    /// A code chunk.
    Chunk(OutputChunk),
    /// An asset.
    Asset(OutputAsset),
}

impl OutputItem {
    /// File name of the item.
    pub fn file_name(&self) -> &str {
        match self {
            OutputItem::Chunk(chunk) => &chunk.file_name,
            OutputItem::Asset(asset) => &asset.file_name,
        }
    }

    /// Returns the chunk, if this item is one.
    pub fn as_chunk(&self) -> Option<&OutputChunk> {
        match self {
            OutputItem::Chunk(chunk) => Some(chunk),
            OutputItem::Asset(_) => None,
        }
    }
}
