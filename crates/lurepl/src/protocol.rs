// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! JSON messages exchanged with the host page.
//!
//! Inbound messages may carry an update request, a new iframe location, or
//! both. Messages of unknown type are ignored rather than rejected so older
//! hosts keep working.

use serde::{Deserialize, Serialize};

use crate::error::{ReplError, Result};
use crate::types::{BuildOptions, BuildResult};

/// A request carried by a host message.
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    /// Start a build cycle.
    Update {
        /// Framework version to build with.
        version: String,
        /// Build options.
        options: BuildOptions,
    },
}

/// A parsed inbound message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostMessage {
    /// New iframe location, if reported.
    pub location: Option<String>,
    /// Request to act on, if any.
    pub request: Option<HostRequest>,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    version: Option<String>,
    options: Option<BuildOptions>,
    location: Option<String>,
}

impl HostMessage {
    /// Parses an inbound JSON message.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawMessage =
            serde_json::from_str(text).map_err(|e| ReplError::Protocol(format!("invalid message: {}", e)))?;

        let request = match raw.kind.as_deref() {
            Some("update") => {
                let version = raw
                    .version
                    .ok_or_else(|| ReplError::Protocol("update request without a version".to_string()))?;
                Some(HostRequest::Update {
                    version,
                    options: raw.options.unwrap_or_default(),
                })
            }
            Some(other) => {
                tracing::debug!("ignoring host message of type {}", other);
                None
            }
            None => None,
        };

        Ok(HostMessage {
            location: raw.location,
            request,
        })
    }
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// The result of a build cycle.
    Result(BuildResult),
}

impl WorkerMessage {
    /// Serializes the message as JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
