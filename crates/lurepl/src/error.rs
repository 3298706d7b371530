// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the REPL build worker.
//!
//! This module defines [`ReplError`], the error enum shared by every stage of
//! a build cycle, and [`SourceContext`] for rich parse error messages.
//!
//! # Error Categories
//!
//! - **Dependency errors**: a tool artifact could not be fetched or activated
//! - **Compile errors**: lexing or segment transformation failed
//! - **Bundle errors**: an import could not be resolved or loaded
//! - **Execution errors**: the server bundle failed or ran out of budget
//! - **Format errors**: the output printer rejected the markup
//!
//! Every fatal error ends the cycle and is reported to the host as a single
//! `Error` diagnostic. The cycle never panics on user input.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Source context for enhanced error messages.
///
/// Captures a snippet of source code around an error location,
/// enabling rich error messages with line numbers and a caret.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// All lines from the source file.
    pub lines: Vec<String>,
    /// The line number where the error occurred (1-indexed).
    pub error_line: usize,
    /// The column number where the error occurred (1-indexed).
    pub error_column: usize,
    /// First line number of the snippet (1-indexed).
    pub snippet_start: usize,
    /// Last line number of the snippet (1-indexed).
    pub snippet_end: usize,
}

impl SourceContext {
    /// Creates a source context from source code and error location.
    ///
    /// Captures 2 lines before and after the error line.
    pub fn from_source(source: &str, line: usize, column: usize) -> Self {
        let lines: Vec<String> = source.lines().map(|l| l.to_string()).collect();
        let snippet_start = line.saturating_sub(2).max(1);
        let snippet_end = (line + 2).min(lines.len());

        Self {
            lines,
            error_line: line,
            error_column: column,
            snippet_start,
            snippet_end,
        }
    }

    /// Formats the source snippet with line numbers and error indicator.
    ///
    /// ```text
    ///    3 | local x = "unterminated
    ///      |           ^
    /// ```
    pub fn format_snippet(&self) -> String {
        let mut result = String::new();

        for line_num in self.snippet_start..=self.snippet_end {
            if line_num == 0 || line_num > self.lines.len() {
                break;
            }

            let line = &self.lines[line_num - 1];
            result.push_str(&format!("{:4} | {}\n", line_num, line));

            if line_num == self.error_line {
                result.push_str(&format!(
                    "     | {}^\n",
                    " ".repeat(self.error_column.saturating_sub(1))
                ));
            }
        }

        result
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_snippet())
    }
}

struct OptSourceContextDisplay<'a>(&'a Option<SourceContext>);

impl fmt::Display for OptSourceContextDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ctx) => write!(f, "\n{}", ctx),
            None => Ok(()),
        }
    }
}

trait AsDisplay {
    fn as_display(&self) -> OptSourceContextDisplay<'_>;
}

impl AsDisplay for Option<SourceContext> {
    fn as_display(&self) -> OptSourceContextDisplay<'_> {
        OptSourceContextDisplay(self)
    }
}

/// The main error type for build worker operations.
#[derive(Error, Debug)]
pub enum ReplError {
    /// A tool artifact responded with a non-OK status.
    #[error("Unable to load dependency {url}: HTTP {status}")]
    DependencyFetch {
        /// The artifact URL.
        url: String,
        /// The HTTP status returned by the origin.
        status: u16,
    },

    /// A tool artifact could not be fetched at all.
    #[error("Unable to fetch {url}: {message}")]
    Transport {
        /// The artifact URL.
        url: String,
        /// Transport failure description.
        message: String,
    },

    /// A fetched artifact could not be turned into an active tool.
    #[error("Failed to activate {tool}: {message}")]
    ToolActivation {
        /// Tool name (core, compiler, bundler, ...).
        tool: String,
        /// Description of the failure.
        message: String,
    },

    /// Lua source could not be tokenized.
    #[error("Parse error in {file}: {message} at line {line}, column {column}{}", source_context.as_display())]
    Parse {
        /// The module path.
        file: String,
        /// Description of the parse error.
        message: String,
        /// Line number where the error occurred.
        line: usize,
        /// Column number where the error occurred.
        column: usize,
        /// Source context for rich error display.
        source_context: Option<SourceContext>,
    },

    /// The segment transform rejected a module.
    #[error("Transform error in {file}: {message}")]
    Transform {
        /// The module path.
        file: String,
        /// Description of the failure.
        message: String,
    },

    /// No plugin could resolve an import.
    #[error("Could not resolve \"{specifier}\" from \"{importer}\"")]
    Unresolved {
        /// The import specifier.
        specifier: String,
        /// The importing module id.
        importer: String,
    },

    /// No plugin could load a resolved module id.
    #[error("Could not load {id}{}", importer.as_ref().map(|i| format!(" (imported by {})", i)).unwrap_or_default())]
    LoadFailed {
        /// The module id.
        id: String,
        /// The importing module id, if any.
        importer: Option<String>,
    },

    /// Generic bundling failure.
    #[error("Bundle error: {0}")]
    Bundle(String),

    /// The server bundle could not be executed.
    #[error("Server render failed: {0}")]
    ServerExecution(String),

    /// The server bundle exceeded its wall-clock budget.
    #[error("Server render exceeded its execution budget of {0:?}")]
    Timeout(Duration),

    /// The output printer failed.
    #[error("Format error: {0}")]
    Format(String),

    /// A host message could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Lua runtime error.
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplError {
    /// Builds a [`ReplError::Parse`] with a source snippet around the location.
    pub fn parse(file: &str, source: &str, message: impl Into<String>, line: usize, column: usize) -> Self {
        ReplError::Parse {
            file: file.to_string(),
            message: message.into(),
            line,
            column,
            source_context: Some(SourceContext::from_source(source, line, column)),
        }
    }

    /// Builds a [`ReplError::Transform`].
    pub fn transform(file: &str, message: impl Into<String>) -> Self {
        ReplError::Transform {
            file: file.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results with [`ReplError`].
pub type Result<T> = std::result::Result<T, ReplError>;
