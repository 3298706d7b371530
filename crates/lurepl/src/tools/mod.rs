// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Versioned build tools.
//!
//! A build needs seven artifacts: the two framework runtimes (plain Lua
//! sources) and five descriptor artifacts (JSON) naming the compiler,
//! bundler, printer, printer HTML plugin and minifier. Runtimes are
//! evaluated once to learn their version and exports; descriptors are handed
//! to a [`ToolFactories`] entry that builds the tool instance.
//!
//! Fetching is abstracted behind [`Fetcher`] so the same loader runs against
//! the embedded artifacts, a local dev server or a CDN.

mod fetch;
mod loader;

pub use fetch::{embedded_artifact, EmbeddedFetcher, FetchResponse, Fetcher};
pub use loader::DependencyLoader;

use mlua::{Lua, Table, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::bundler::{Bundler, LuaBundler};
use crate::compiler::{Compiler, SegmentCompiler};
use crate::error::{ReplError, Result};
use crate::minify::{LuaMinifier, Minifier};
use crate::printer::{HtmlPlugin, Printer, PrinterPlugin, StandalonePrinter};

/// Framework version of the built-in runtimes and compiler.
pub const FRAMEWORK_VERSION: &str = "0.4.0";
/// Pinned bundler version.
pub const BUNDLER_VERSION: &str = "1.4.0";
/// Pinned printer version, shared by its HTML plugin.
pub const PRINTER_VERSION: &str = "2.6.0";
/// Pinned minifier version.
pub const MINIFIER_VERSION: &str = "0.8.1";

/// Source of the built-in `@lurepl/core` runtime.
pub const CORE_SOURCE: &str = include_str!("../runtime/core.lua");
/// Source of the built-in `@lurepl/server` runtime.
pub const SERVER_SOURCE: &str = include_str!("../runtime/server.lua");

/// Name of the global table the runtimes are installed under.
pub const RUNTIME_GLOBAL: &str = "__lurepl_runtime";

/// A loadable tool artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// `@lurepl/core` runtime source
    Core,
    /// Compiler descriptor
    Compiler,
    /// Bundler descriptor
    Bundler,
    /// `@lurepl/server` runtime source
    Server,
    /// Printer descriptor
    Printer,
    /// Printer HTML plugin descriptor
    PrinterHtml,
    /// Minifier descriptor
    Minifier,
}

impl ToolKind {
    /// The version-gated group, in activation order.
    pub const REQUIRED: [ToolKind; 6] = [
        ToolKind::Core,
        ToolKind::Compiler,
        ToolKind::Bundler,
        ToolKind::Server,
        ToolKind::Printer,
        ToolKind::PrinterHtml,
    ];

    /// Returns the string identifier for this tool.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Core => "core",
            ToolKind::Compiler => "compiler",
            ToolKind::Bundler => "bundler",
            ToolKind::Server => "server",
            ToolKind::Printer => "printer",
            ToolKind::PrinterHtml => "printer-html",
            ToolKind::Minifier => "minifier",
        }
    }
}

impl std::str::FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "core" => Ok(ToolKind::Core),
            "compiler" => Ok(ToolKind::Compiler),
            "bundler" => Ok(ToolKind::Bundler),
            "server" => Ok(ToolKind::Server),
            "printer" | "prettier" => Ok(ToolKind::Printer),
            "printer-html" | "parser-html" => Ok(ToolKind::PrinterHtml),
            "minifier" | "minify" => Ok(ToolKind::Minifier),
            _ => Err(format!("Unknown tool: {}", s)),
        }
    }
}

/// Where tool artifacts are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUrls {
    /// Local origin serving the framework runtimes and compiler.
    pub origin: String,
    /// CDN base serving `{package}@{version}/{path}`.
    pub cdn: String,
}

impl ToolUrls {
    /// Creates URLs for an origin and CDN base, trailing slashes removed.
    pub fn new(origin: impl Into<String>, cdn: impl Into<String>) -> Self {
        let origin: String = origin.into();
        let cdn: String = cdn.into();
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            cdn: cdn.trim_end_matches('/').to_string(),
        }
    }

    /// URLs served by a lurepl dev server at `origin`.
    pub fn local(origin: impl Into<String>) -> Self {
        let origin: String = origin.into();
        let cdn = format!("{}/cdn", origin.trim_end_matches('/'));
        Self::new(origin, cdn)
    }

    /// Artifact URL of `kind`.
    pub fn url(&self, kind: ToolKind) -> String {
        match kind {
            ToolKind::Core => format!("{}/repl/core.lua", self.origin),
            ToolKind::Compiler => format!("{}/repl/compiler.json", self.origin),
            ToolKind::Server => format!("{}/repl/server.lua", self.origin),
            ToolKind::Bundler => self.cdn_url("lurepl-bundler", BUNDLER_VERSION, "dist/bundler.json"),
            ToolKind::Printer => self.cdn_url("lurepl-printer", PRINTER_VERSION, "standalone.json"),
            ToolKind::PrinterHtml => self.cdn_url("lurepl-printer", PRINTER_VERSION, "parser-html.json"),
            ToolKind::Minifier => self.cdn_url("lurepl-minify", MINIFIER_VERSION, "dist/minify.json"),
        }
    }

    fn cdn_url(&self, package: &str, version: &str, path: &str) -> String {
        format!("{}/{}@{}/{}", self.cdn, package, version, path)
    }
}

impl Default for ToolUrls {
    fn default() -> Self {
        Self::local("http://localhost:3000")
    }
}

/// A descriptor artifact naming a tool implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Implementation name, e.g. `lurepl-bundler`.
    pub name: String,
    /// Version tag reported by the activated tool.
    pub version: String,
    /// Implementation specific options.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl ToolDescriptor {
    /// Creates a descriptor without options.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            options: serde_json::Value::Object(Default::default()),
        }
    }

    /// Parses a fetched descriptor artifact.
    pub fn parse(kind: ToolKind, body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| ReplError::ToolActivation {
            tool: kind.as_str().to_string(),
            message: format!("invalid descriptor: {}", e),
        })
    }

    fn expect_name(&self, kind: ToolKind, name: &str) -> Result<()> {
        if self.name == name {
            Ok(())
        } else {
            Err(ReplError::ToolActivation {
                tool: kind.as_str().to_string(),
                message: format!("no implementation for \"{}\"", self.name),
            })
        }
    }
}

/// An evaluated framework runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBundle {
    /// Version the runtime reports.
    pub version: String,
    /// Runtime source, bundled into client chunks.
    pub source: String,
    /// Sorted exported member names.
    pub exports: Vec<String>,
}

fn activation_error(kind: ToolKind) -> impl Fn(mlua::Error) -> ReplError {
    move |e| ReplError::ToolActivation {
        tool: kind.as_str().to_string(),
        message: e.to_string(),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn describe(kind: ToolKind, source: &str, module: Table) -> Result<RuntimeBundle> {
    let version: String = module
        .get::<Option<String>>("version")
        .map_err(activation_error(kind))?
        .ok_or_else(|| ReplError::ToolActivation {
            tool: kind.as_str().to_string(),
            message: "runtime does not report a version".to_string(),
        })?;

    let mut exports = Vec::new();
    for pair in module.pairs::<Value, Value>() {
        let (key, _) = pair.map_err(activation_error(kind))?;
        if let Value::String(key) = key {
            let key = key.to_string_lossy().to_string();
            if is_identifier(&key) {
                exports.push(key);
            }
        }
    }
    exports.sort();

    Ok(RuntimeBundle {
        version,
        source: source.to_string(),
        exports,
    })
}

fn eval_runtime(lua: &Lua, kind: ToolKind, source: &str) -> Result<Table> {
    lua.load(source)
        .set_name(format!("@lurepl/{}", kind.as_str()))
        .eval::<Table>()
        .map_err(activation_error(kind))
}

impl RuntimeBundle {
    /// Evaluates the core runtime in a scratch state.
    pub fn core(source: &str) -> Result<Self> {
        let lua = Lua::new();
        let module = eval_runtime(&lua, ToolKind::Core, source)?;
        describe(ToolKind::Core, source, module)
    }

    /// Evaluates the server runtime with `core` installed as
    /// `__lurepl_runtime.core`.
    pub fn server(source: &str, core: &RuntimeBundle) -> Result<Self> {
        let lua = Lua::new();
        let core_module = eval_runtime(&lua, ToolKind::Core, &core.source)?;
        let runtime = lua.create_table().map_err(activation_error(ToolKind::Server))?;
        runtime.set("core", core_module).map_err(activation_error(ToolKind::Server))?;
        lua.globals()
            .set(RUNTIME_GLOBAL, runtime)
            .map_err(activation_error(ToolKind::Server))?;
        let module = eval_runtime(&lua, ToolKind::Server, source)?;
        describe(ToolKind::Server, source, module)
    }
}

/// Evaluates the built-in core and server runtimes.
pub fn builtin_runtimes() -> Result<(RuntimeBundle, RuntimeBundle)> {
    let core = RuntimeBundle::core(CORE_SOURCE)?;
    let server = RuntimeBundle::server(SERVER_SOURCE, &core)?;
    Ok((core, server))
}

/// Builds a tool instance from its descriptor.
pub type Factory<T> = Box<dyn Fn(&ToolDescriptor) -> Result<T> + Send + Sync>;

/// Factories turning descriptors into tool instances.
pub struct ToolFactories {
    /// Compiler factory.
    pub compiler: Factory<Arc<dyn Compiler>>,
    /// Bundler factory.
    pub bundler: Factory<Arc<dyn Bundler>>,
    /// Printer factory.
    pub printer: Factory<Box<dyn Printer>>,
    /// Printer plugin factory.
    pub printer_plugin: Factory<Box<dyn PrinterPlugin>>,
    /// Minifier factory.
    pub minifier: Factory<Arc<dyn Minifier>>,
}

impl Default for ToolFactories {
    fn default() -> Self {
        Self {
            compiler: Box::new(|d| {
                d.expect_name(ToolKind::Compiler, "lurepl-compiler")?;
                Ok(Arc::new(SegmentCompiler::new(d.version.clone())) as Arc<dyn Compiler>)
            }),
            bundler: Box::new(|d| {
                d.expect_name(ToolKind::Bundler, "lurepl-bundler")?;
                Ok(Arc::new(LuaBundler::new(d.version.clone())) as Arc<dyn Bundler>)
            }),
            printer: Box::new(|d| {
                d.expect_name(ToolKind::Printer, "lurepl-printer")?;
                Ok(Box::new(StandalonePrinter::new(d.version.clone())) as Box<dyn Printer>)
            }),
            printer_plugin: Box::new(|d| {
                d.expect_name(ToolKind::PrinterHtml, "lurepl-printer-html")?;
                Ok(Box::new(HtmlPlugin) as Box<dyn PrinterPlugin>)
            }),
            minifier: Box::new(|d| {
                d.expect_name(ToolKind::Minifier, "lurepl-minify")?;
                Ok(Arc::new(LuaMinifier::new(d.version.clone())) as Arc<dyn Minifier>)
            }),
        }
    }
}

/// The active, version-gated tool group.
pub struct ToolSet {
    /// Core runtime.
    pub core: Arc<RuntimeBundle>,
    /// Server runtime.
    pub server: Arc<RuntimeBundle>,
    /// Module compiler.
    pub compiler: Arc<dyn Compiler>,
    /// Bundler.
    pub bundler: Arc<dyn Bundler>,
    /// Printer with its HTML plugin registered.
    pub printer: Box<dyn Printer>,
}

impl ToolSet {
    /// True when every versioned member matches `version` and the bundler
    /// matches its pinned version.
    pub fn matches(&self, version: &str) -> bool {
        self.core.version == version
            && self.compiler.version() == version
            && self.server.version == version
            && self.bundler.version() == BUNDLER_VERSION
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("core", &self.core.version)
            .field("server", &self.server.version)
            .field("compiler", &self.compiler.version())
            .field("bundler", &self.bundler.version())
            .field("printer", &self.printer.version())
            .finish()
    }
}
