// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Virtual module resolution for REPL builds.
//!
//! Source inputs live in memory, the framework runtimes are pre-loaded tool
//! bundles, and everything else is left to the runtime as an external
//! import. The resolver never fetches packages on its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bundler::{BundlerPlugin, ResolvedId};
use crate::compiler::Target;
use crate::error::Result;
use crate::tools::RuntimeBundle;
use crate::types::{SourceInput, SERVER_ENTRY};

/// Module id of the core runtime.
pub const CORE_ID: &str = "\0lurepl-core";
/// Module id of the server runtime.
pub const SERVER_ID: &str = "\0lurepl-server";

/// Server entry used when the inputs do not provide one.
pub const DEFAULT_SERVER_ENTRY: &str = r#"local server = require("@lurepl/server")
local core = require("@lurepl/core")
local App = require("./app")

return {
  render = function(opts)
    return server.render_to_string(core.h(App, {}), opts)
  end,
}
"#;

/// A pre-loaded runtime bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// `@lurepl/core`
    Core,
    /// `@lurepl/server`
    Server,
}

impl Sentinel {
    /// Module id the sentinel resolves to.
    pub fn id(&self) -> &'static str {
        match self {
            Sentinel::Core => CORE_ID,
            Sentinel::Server => SERVER_ID,
        }
    }

    /// Name of the global runtime table member.
    fn global(&self) -> &'static str {
        match self {
            Sentinel::Core => "core",
            Sentinel::Server => "server",
        }
    }
}

/// Outcome of resolving a specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Served from the source inputs.
    Internal(String),
    /// Redirected to a runtime bundle.
    Sentinel(Sentinel),
    /// Left to the runtime.
    External(String),
}

/// Outcome of loading a module id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Module source.
    Source(String),
    /// Not a virtual module.
    NotFound,
}

/// Resolver over one request's source inputs.
#[derive(Debug, Clone)]
pub struct VirtualResolver {
    mode: Target,
    inputs: BTreeMap<String, String>,
    core: Arc<RuntimeBundle>,
    server: Arc<RuntimeBundle>,
}

impl VirtualResolver {
    /// Creates a resolver for one bundle pass.
    pub fn new(mode: Target, inputs: &[SourceInput], core: Arc<RuntimeBundle>, server: Arc<RuntimeBundle>) -> Self {
        Self {
            mode,
            inputs: inputs.iter().map(|i| (i.path.clone(), i.code.clone())).collect(),
            core,
            server,
        }
    }

    /// Resolves `specifier` imported from `importer`.
    pub fn resolve(&self, specifier: &str, importer: Option<&str>) -> Resolution {
        if importer.is_none() {
            return Resolution::Internal(specifier.to_string());
        }
        match specifier {
            "@lurepl/core" | "@lurepl/core/runtime" => Resolution::Sentinel(Sentinel::Core),
            "@lurepl/server" => Resolution::Sentinel(Sentinel::Server),
            other => Resolution::External(other.to_string()),
        }
    }

    /// Loads a resolved module id.
    pub fn load(&self, id: &str) -> LoadOutcome {
        if let Some(code) = self.inputs.get(id) {
            return LoadOutcome::Source(code.clone());
        }
        match (id, self.mode) {
            (CORE_ID, Target::Client) => LoadOutcome::Source(self.core.source.clone()),
            (CORE_ID, Target::Server) => LoadOutcome::Source(shim(Sentinel::Core, &self.core)),
            (SERVER_ID, Target::Server) => LoadOutcome::Source(shim(Sentinel::Server, &self.server)),
            (SERVER_ENTRY, _) => LoadOutcome::Source(DEFAULT_SERVER_ENTRY.to_string()),
            _ => LoadOutcome::NotFound,
        }
    }
}

/// A module re-exporting a runtime that is already loaded in the sandbox.
fn shim(sentinel: Sentinel, bundle: &RuntimeBundle) -> String {
    let mut code = format!("local rt = __lurepl_runtime.{}\nreturn {{\n", sentinel.global());
    for name in &bundle.exports {
        code.push_str(&format!("  {0} = rt.{0},\n", name));
    }
    code.push_str("}\n");
    code
}

/// [`VirtualResolver`] as a bundler plugin.
pub struct ReplResolverPlugin {
    resolver: VirtualResolver,
}

impl ReplResolverPlugin {
    /// Wraps a resolver.
    pub fn new(resolver: VirtualResolver) -> Self {
        Self { resolver }
    }
}

impl BundlerPlugin for ReplResolverPlugin {
    fn name(&self) -> &str {
        "repl-resolver"
    }

    fn cache_key(&self) -> String {
        format!("repl-resolver:{}", self.resolver.mode.as_str())
    }

    fn resolve_id(&self, specifier: &str, importer: Option<&str>) -> Result<Option<ResolvedId>> {
        Ok(Some(match self.resolver.resolve(specifier, importer) {
            Resolution::Internal(id) => ResolvedId::internal(id),
            Resolution::Sentinel(sentinel) => ResolvedId::internal(sentinel.id()),
            Resolution::External(spec) => ResolvedId::external(spec),
        }))
    }

    fn load(&self, id: &str) -> Result<Option<String>> {
        Ok(match self.resolver.load(id) {
            LoadOutcome::Source(code) => Some(code),
            LoadOutcome::NotFound => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin_runtimes;

    fn resolver(mode: Target, inputs: &[SourceInput]) -> VirtualResolver {
        let (core, server) = builtin_runtimes().unwrap();
        VirtualResolver::new(mode, inputs, Arc::new(core), Arc::new(server))
    }

    #[test]
    fn resolves_entry_sentinels_and_externals() {
        let resolver = resolver(Target::Client, &[]);
        assert_eq!(resolver.resolve("/app.lua", None), Resolution::Internal("/app.lua".into()));
        assert_eq!(resolver.resolve("@lurepl/core", Some("/app.lua")), Resolution::Sentinel(Sentinel::Core));
        assert_eq!(
            resolver.resolve("@lurepl/core/runtime", Some("/app.lua")),
            Resolution::Sentinel(Sentinel::Core)
        );
        assert_eq!(resolver.resolve("@lurepl/server", Some("/x.lua")), Resolution::Sentinel(Sentinel::Server));
        assert_eq!(resolver.resolve("lodash", Some("/app.lua")), Resolution::External("lodash".into()));
    }

    #[test]
    fn loads_inputs_verbatim() {
        let resolver = resolver(Target::Client, &[SourceInput::new("/app.lua", "return 1")]);
        assert_eq!(resolver.load("/app.lua"), LoadOutcome::Source("return 1".into()));
        assert_eq!(resolver.load("/nope.lua"), LoadOutcome::NotFound);
    }

    #[test]
    fn core_is_bundled_on_client_and_shimmed_on_server() {
        let client = resolver(Target::Client, &[]);
        let LoadOutcome::Source(full) = client.load(CORE_ID) else {
            panic!("core not loaded");
        };
        assert!(full.contains("function M.h("));
        assert_eq!(client.load(SERVER_ID), LoadOutcome::NotFound);

        let server = resolver(Target::Server, &[]);
        let LoadOutcome::Source(shim) = server.load(CORE_ID) else {
            panic!("core shim not loaded");
        };
        assert!(shim.starts_with("local rt = __lurepl_runtime.core\n"));
        assert!(shim.contains("  h = rt.h,\n"));
        let LoadOutcome::Source(server_shim) = server.load(SERVER_ID) else {
            panic!("server shim not loaded");
        };
        assert!(server_shim.contains("render_to_string = rt.render_to_string"));
    }

    #[test]
    fn synthesizes_missing_server_entry() {
        let resolver = resolver(Target::Server, &[SourceInput::new("/app.lua", "return 1")]);
        assert_eq!(resolver.load(SERVER_ENTRY), LoadOutcome::Source(DEFAULT_SERVER_ENTRY.into()));

        let custom = resolver_with_entry();
        assert_eq!(custom.load(SERVER_ENTRY), LoadOutcome::Source("return {}".into()));
    }

    fn resolver_with_entry() -> VirtualResolver {
        resolver(Target::Server, &[SourceInput::new(SERVER_ENTRY, "return {}")])
    }

    #[test]
    fn plugin_cache_key_includes_mode() {
        let plugin = ReplResolverPlugin::new(resolver(Target::Server, &[]));
        assert_eq!(plugin.cache_key(), "repl-resolver:server");
        let resolved = plugin.resolve_id("@lurepl/core", Some("/app.lua")).unwrap().unwrap();
        assert_eq!(resolved, ResolvedId::internal(CORE_ID));
    }
}
