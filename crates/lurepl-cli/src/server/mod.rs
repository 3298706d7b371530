// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Playground server components.
//!
//! # Components
//!
//! - `http`: routes, tool artifacts and the interception layer
//! - `bridge`: WebSocket connection to the build worker

/// WebSocket bridge between host pages and the worker.
pub mod bridge;
/// HTTP server implementation using Axum.
pub mod http;
