// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

// ReplError carries source snippets for parse errors.
#![allow(clippy::result_large_err)]

//! # lurepl
//!
//! REPL build worker for Lua component modules.
//!
//! A host page sends a set of virtual source files; the worker compiles them
//! with a segment-extracting transform, bundles them for the client and for
//! the server, renders the server bundle in a sandboxed Lua state, and
//! publishes the artifacts back. Later module requests from the result frame
//! are answered from memory.
//!
//! ## Features
//!
//! - Segment extraction for `component(...)` and `lazy(...)` functions
//! - Rollup-style bundler with plugin hooks, chunking and a transform cache
//! - Version-gated tool loading behind a pluggable fetcher
//! - Sandboxed server rendering with memory and time limits
//! - HTML pretty printing and document extraction
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lurepl::{run_cycle, BuildContext, BuildOptions, CycleConfig, DependencyLoader, EmbeddedFetcher, SourceInput, ToolUrls};
//!
//! let urls = ToolUrls::default();
//! let loader = DependencyLoader::new(Arc::new(EmbeddedFetcher::new(urls.clone())), urls);
//! let mut ctx = BuildContext::default();
//! let options = BuildOptions {
//!     src_inputs: vec![SourceInput::new("/app.lua", source)],
//!     ..BuildOptions::default()
//! };
//! let outcome = run_cycle(&mut ctx, &loader, "0.4.0", &options, &CycleConfig::default()).await;
//! println!("{}", outcome.result.output_html);
//! ```

/// Module graph, chunking and the bundler cache.
pub mod bundler;
/// Segment-extracting module compiler.
pub mod compiler;
/// Build cycle state machine.
pub mod cycle;
/// Import scanning and module ordering.
pub mod dependencies;
/// HTML DOM helpers.
pub mod dom;
/// Error types and reporting.
pub mod error;
/// Result-frame asset interception.
pub mod intercept;
/// Lua token scanner.
pub mod lexer;
/// Lua chunk minifier.
pub mod minify;
/// Client and server bundle passes.
pub mod orchestrator;
/// Virtual path helpers.
pub mod paths;
/// Output pretty printer.
pub mod printer;
/// Host message types.
pub mod protocol;
/// Server rendering and document extraction.
pub mod render;
/// Virtual module resolution.
pub mod resolver;
/// Sandboxed Lua execution.
pub mod sandbox;
/// Tool artifacts, fetching and loading.
pub mod tools;
/// Host-facing data model.
pub mod types;
/// Build worker.
pub mod worker;

pub use cycle::{run_cycle, BuildContext, CycleConfig, CycleOutcome, CycleState};
pub use error::*;
pub use intercept::{AssetInterceptor, InterceptedAsset};
pub use protocol::{HostMessage, HostRequest, WorkerMessage};
pub use render::{RenderOptions, RenderOutput};
pub use sandbox::{IsolatedExecutor, LuaSandbox, SandboxLimits};
pub use tools::{DependencyLoader, EmbeddedFetcher, FetchResponse, Fetcher, ToolUrls, FRAMEWORK_VERSION};
pub use types::*;
pub use worker::Worker;

#[cfg(test)]
mod tests;
