// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Host-facing data model.
//!
//! Every type here crosses the host boundary as JSON, so field names use
//! camelCase on the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Path of the client entry module.
pub const CLIENT_ENTRY: &str = "/app.lua";
/// Path of the server entry module.
pub const SERVER_ENTRY: &str = "/entry.server.lua";

/// A virtual source file supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInput {
    /// Absolute path with a leading slash, unique within one request.
    pub path: String,
    /// Module source text.
    pub code: String,
}

impl SourceInput {
    /// Creates a source input.
    pub fn new(path: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
        }
    }
}

/// How extracted segments are grouped into client chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryStrategy {
    /// Segments stay inline in their parent module.
    Inline,
    /// All segments share one chunk.
    #[default]
    Single,
    /// One chunk per segment.
    Segment,
    /// One chunk per top-level component, including its nested segments.
    Component,
}

impl EntryStrategy {
    /// Returns the wire name for this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStrategy::Inline => "inline",
            EntryStrategy::Single => "single",
            EntryStrategy::Segment => "segment",
            EntryStrategy::Component => "component",
        }
    }
}

impl fmt::Display for EntryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inline" => Ok(EntryStrategy::Inline),
            "single" => Ok(EntryStrategy::Single),
            "segment" | "hook" => Ok(EntryStrategy::Segment),
            "component" => Ok(EntryStrategy::Component),
            _ => Err(format!("Unknown entry strategy: {}", s)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntryStrategyRepr {
    Name(String),
    Object {
        #[serde(rename = "type")]
        kind: String,
    },
}

impl<'de> Deserialize<'de> for EntryStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = match EntryStrategyRepr::deserialize(deserializer)? {
            EntryStrategyRepr::Name(name) => name,
            EntryStrategyRepr::Object { kind } => kind,
        };
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for EntryStrategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Output minification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinifyMode {
    /// Emit chunks as rendered.
    #[default]
    None,
    /// Run the minifier over every client chunk.
    Minify,
}

/// Options for one build cycle. Immutable for the cycle's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// Client chunking strategy.
    #[serde(default)]
    pub entry_strategy: EntryStrategy,
    /// Minification mode.
    #[serde(default)]
    pub minify: MinifyMode,
    /// Readable segment names and annotated segment modules.
    #[serde(default)]
    pub debug: bool,
    /// The virtual source files.
    #[serde(default)]
    pub src_inputs: Vec<SourceInput>,
    /// Run the server pass, rendering and formatting.
    #[serde(default = "default_ssr_build")]
    pub ssr_build: bool,
}

fn default_ssr_build() -> bool {
    true
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            entry_strategy: EntryStrategy::default(),
            minify: MinifyMode::default(),
            debug: false,
            src_inputs: Vec::new(),
            ssr_build: default_ssr_build(),
        }
    }
}

impl BuildOptions {
    /// Looks up a source input by exact path.
    pub fn input(&self, path: &str) -> Option<&SourceInput> {
        self.src_inputs.iter().find(|input| input.path == path)
    }
}

/// One emitted chunk or asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOutput {
    /// Bundle-relative file name, unique within its target.
    pub path: String,
    /// Emitted code or asset text.
    pub code: String,
    /// True for dynamic-entry chunks.
    pub is_entry: bool,
    /// Human-readable size of `code`.
    pub size: String,
}

impl ModuleOutput {
    /// Creates an output record, computing its display size.
    pub fn new(path: impl Into<String>, code: impl Into<String>, is_entry: bool) -> Self {
        let code = code.into();
        let size = format_size(code.len());
        Self {
            path: path.into(),
            code,
            is_entry,
            size,
        }
    }
}

/// Formats a byte count for display.
pub fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The cycle failed.
    Error,
    /// Non-fatal notice from the bundler or compiler.
    Warning,
}

/// A message reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Human-readable message.
    pub message: String,
    /// Severity, absent for plain notices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Diagnostic {
    /// Creates an `Error` diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Some(Severity::Error),
        }
    }

    /// Creates a `Warning` diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Some(Severity::Warning),
        }
    }

    /// Returns true when this diagnostic marks a failed cycle.
    pub fn is_error(&self) -> bool {
        self.severity == Some(Severity::Error)
    }
}

/// Element attributes in document order-independent form.
pub type Attributes = BTreeMap<String, String>;

/// Kind of an extracted segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// A `component(function ... end)` render function.
    Component,
    /// A `lazy(function ... end)` handler.
    Handler,
}

impl SegmentKind {
    /// Marker call name for this kind.
    pub fn marker(&self) -> &'static str {
        match self {
            SegmentKind::Component => "component",
            SegmentKind::Handler => "lazy",
        }
    }
}

/// One entry of the symbol manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolEntry {
    /// Display name, e.g. `app_component`.
    pub name: String,
    /// Segment kind.
    pub kind: SegmentKind,
    /// Module id the segment was extracted from.
    pub parent: String,
    /// Client chunk that defines the segment, when it was split out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
}

/// Symbol manifest produced by the client pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolManifest {
    /// Entries keyed by symbol id.
    pub symbols: BTreeMap<String, SymbolEntry>,
    /// Symbol id to chunk file name.
    pub mapping: BTreeMap<String, String>,
}

/// The artifacts of one build cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    /// Pretty-printed server-rendered document.
    pub output_html: String,
    /// Raw document markup with the bootstrap loader removed.
    pub app_html: String,
    /// Client chunks and assets shown to the user.
    pub client_modules: Vec<ModuleOutput>,
    /// Server chunks.
    pub server_modules: Vec<ModuleOutput>,
    /// Accumulated diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Attributes of the `<html>` element.
    pub doc_element_attributes: Attributes,
    /// Attributes of the `<head>` element.
    pub head_attributes: Attributes,
    /// Attributes of the `<body>` element.
    pub body_attributes: Attributes,
    /// Inner markup of `<body>`.
    pub body_inner_html: String,
    /// Inline text of the stripped bootstrap loader script.
    #[serde(rename = "qwikloader")]
    pub loader_script: String,
    /// Symbol manifest from the client pass.
    pub symbols_entry_map: Option<SymbolManifest>,
    /// Transformed source per module id, from the client pass.
    pub transformed_module_output: BTreeMap<String, String>,
}

impl BuildResult {
    /// Returns true when the diagnostics contain an error.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_strategy_accepts_string_and_object() {
        let single: EntryStrategy = serde_json::from_value(json!("single")).unwrap();
        assert_eq!(single, EntryStrategy::Single);

        let hook: EntryStrategy = serde_json::from_value(json!({ "type": "hook" })).unwrap();
        assert_eq!(hook, EntryStrategy::Segment);

        assert!(serde_json::from_value::<EntryStrategy>(json!("smart-ish")).is_err());
    }

    #[test]
    fn build_options_defaults() {
        let options: BuildOptions = serde_json::from_value(json!({
            "srcInputs": [{ "path": "/app.lua", "code": "return 1" }]
        }))
        .unwrap();
        assert_eq!(options.entry_strategy, EntryStrategy::Single);
        assert_eq!(options.minify, MinifyMode::None);
        assert!(options.ssr_build);
        assert_eq!(options.input("/app.lua").map(|i| i.code.as_str()), Some("return 1"));
    }

    #[test]
    fn result_serializes_camel_case() {
        let mut result = BuildResult::default();
        result.client_modules.push(ModuleOutput::new("q-1.lua", "return 1", true));
        result.diagnostics.push(Diagnostic::error("boom"));
        result.loader_script = "loader".to_string();

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["clientModules"][0]["isEntry"], json!(true));
        assert_eq!(value["clientModules"][0]["size"], json!("8 B"));
        assert_eq!(value["diagnostics"][0]["severity"], json!("Error"));
        assert_eq!(value["qwikloader"], json!("loader"));
        assert!(value.get("bodyInnerHtml").is_some());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.50 KB");
    }
}
