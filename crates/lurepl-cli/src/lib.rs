// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! lurepl CLI library.
//!
//! Hosts the lurepl build worker behind a WebSocket, serves the tool
//! artifacts it loads, and answers result-frame module requests from the
//! last completed build.
//!
//! # Usage
//!
//! ```bash
//! lurepl serve              # Start the playground server
//! lurepl build ./src        # Build a directory once
//! lurepl watch ./src        # Rebuild on every change
//! ```
//!
//! # Configuration
//!
//! Projects are configured via `lurepl.toml` in the working directory.

/// CLI commands (serve, build, watch).
pub mod commands;
/// Configuration from `lurepl.toml`.
pub mod config;
/// HTTP artifact fetcher with retries.
pub mod fetch;
/// Playground HTTP server and WebSocket bridge.
pub mod server;
/// File system watching for rebuilds.
pub mod watcher;
