// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Component-aware module transform.
//!
//! The compiler finds `component(function ... end)` and
//! `lazy(function ... end)` markers in user modules and turns each function
//! literal into a *segment* with a stable symbol id. For the client, segments
//! are extracted into their own modules and loaded on demand; for the server
//! (and with the `inline` strategy) they stay in place and are only tagged.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lurepl::compiler::{Compiler, SegmentCompiler, TransformOptions};
//!
//! let compiler = SegmentCompiler::new("0.4.0");
//! let output = compiler.transform_module("/app.lua", source, &TransformOptions::default())?;
//! for segment in &output.segments {
//!     println!("{} -> {}", segment.meta.symbol, segment.id);
//! }
//! ```

mod plugin;
mod segments;

pub use plugin::{CompilerOutputs, CompilerPlugin, MANIFEST_FILE};
pub use segments::SegmentCompiler;

use crate::bundler::SegmentMeta;
use crate::error::Result;
use crate::types::EntryStrategy;

/// Bundle a transform is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Browser bundle; segments may be split into chunks.
    #[default]
    Client,
    /// Server-render bundle; segments always stay inline.
    Server,
}

impl Target {
    /// Lowercase name, used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Client => "client",
            Target::Server => "server",
        }
    }
}

/// Options for one module transform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Bundle target.
    pub target: Target,
    /// Segment grouping on the client.
    pub entry_strategy: EntryStrategy,
    /// Annotate extracted segments with their origin.
    pub debug: bool,
}

impl TransformOptions {
    /// True when segments are moved into modules of their own.
    pub fn extracts_segments(&self) -> bool {
        self.target == Target::Client && self.entry_strategy != EntryStrategy::Inline
    }
}

/// A segment extracted into a module of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentModule {
    /// Module id, next to the parent module.
    pub id: String,
    /// Module source.
    pub code: String,
    /// Symbol metadata.
    pub meta: SegmentMeta,
}

/// Result of transforming one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    /// Rewritten module source.
    pub code: String,
    /// Extracted segments; nested segments come before their parent.
    pub segments: Vec<SegmentModule>,
    /// Non-fatal notices.
    pub warnings: Vec<String>,
}

/// A module transform engine.
pub trait Compiler: Send + Sync {
    /// Version tag used for dependency gating.
    fn version(&self) -> &str;

    /// Transforms the module at `path`.
    fn transform_module(&self, path: &str, code: &str, options: &TransformOptions) -> Result<TransformOutput>;
}
