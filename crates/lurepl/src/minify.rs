// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Lua chunk minification.

use std::sync::Arc;

use crate::bundler::{BundlerPlugin, ChunkInfo};
use crate::error::Result;
use crate::lexer::{self, TokenKind};

/// A code minifier.
pub trait Minifier: Send + Sync {
    /// Version tag of the minifier artifact.
    fn version(&self) -> &str;

    /// Minifies a Lua chunk.
    fn minify(&self, code: &str) -> Result<String>;
}

/// Symbols that never need a separating space.
const TIGHT: &[&str] = &["(", ")", "{", "}", ",", ";"];

/// Drops comments and collapses whitespace between tokens.
#[derive(Debug, Clone)]
pub struct LuaMinifier {
    version: String,
}

impl LuaMinifier {
    /// Creates a minifier reporting the given version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Minifier for LuaMinifier {
    fn version(&self) -> &str {
        &self.version
    }

    fn minify(&self, code: &str) -> Result<String> {
        let tokens = lexer::tokenize("<chunk>", code)?;
        let mut out = String::with_capacity(code.len() / 2);
        let mut prev_tight = true;

        for token in tokens.iter().filter(|t| !t.is_trivia()) {
            let text = token.text(code);
            let tight = token.kind == TokenKind::Symbol && TIGHT.contains(&text);
            if !out.is_empty() && !prev_tight && !tight {
                out.push(' ');
            }
            out.push_str(text);
            prev_tight = tight;
        }

        Ok(out)
    }
}

/// Runs a [`Minifier`] over every rendered chunk.
pub struct MinifyPlugin {
    minifier: Arc<dyn Minifier>,
}

impl MinifyPlugin {
    /// Wraps a minifier.
    pub fn new(minifier: Arc<dyn Minifier>) -> Self {
        Self { minifier }
    }
}

impl BundlerPlugin for MinifyPlugin {
    fn name(&self) -> &str {
        "lurepl-minify"
    }

    fn render_chunk(&self, code: &str, chunk: &ChunkInfo) -> Result<Option<String>> {
        let minified = self.minifier.minify(code)?;
        tracing::trace!("minified {}: {} -> {} bytes", chunk.file_name, code.len(), minified.len());
        Ok(Some(minified))
    }
}
