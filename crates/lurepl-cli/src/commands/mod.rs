// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! - `build`: Run one build cycle over a source directory
//! - `serve`: Start the playground server
//! - `watch`: Rebuild a source directory on every change

/// One-shot build command.
pub mod build;
/// Playground server command.
pub mod serve;
/// File watch command.
pub mod watch;
