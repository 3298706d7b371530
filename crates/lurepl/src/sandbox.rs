// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Isolated execution of server bundles.
//!
//! Every render gets a fresh Lua state. The state is sandboxed before any
//! user code runs:
//!
//! - `io`, `debug` and `package` are removed
//! - `load`, `loadstring`, `loadfile` and `dofile` are removed
//! - `os` is reduced to `date`, `time`, `clock` and `difftime`
//! - `require` raises an error; bundles resolve their modules internally
//!
//! A memory limit and a wall-clock budget bound the execution. The budget is
//! checked from an instruction hook, so a runaway loop in user code fails
//! with [`ReplError::Timeout`] instead of hanging the worker. Once the budget
//! has expired, `pcall`, `xpcall` and `coroutine.resume` re-raise instead of
//! catching, and every coroutine is hooked before it is resumed.

use mlua::{Function, HookTriggers, Lua, Table, Thread, Value, VmState};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ReplError, Result};
use crate::tools::{RuntimeBundle, RUNTIME_GLOBAL};

/// Default memory limit of a render.
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;
/// Default wall-clock budget of a render.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(2);
/// Instructions between budget checks.
const HOOK_INTERVAL: u32 = 1000;

/// Replaces the catching builtins with versions that stop catching once the
/// budget has expired. `arm` installs the deadline hook on a thread; mlua
/// hooks one thread at a time, so the running thread is re-armed whenever a
/// coroutine hands control back.
const BUDGET_GUARD: &str = r#"
local expired, arm = ...
local native_pcall, native_xpcall, error = pcall, xpcall, error
local create, resume, running, close = coroutine.create, coroutine.resume, coroutine.running, coroutine.close

local function settle(ok, ...)
  if not ok and expired() then
    error((...), 0)
  end
  return ok, ...
end

pcall = function(f, ...)
  return settle(native_pcall(f, ...))
end

xpcall = function(f, handler, ...)
  return settle(native_xpcall(f, handler, ...))
end

local function resumed(ok, ...)
  arm(running())
  return settle(ok, ...)
end

coroutine.resume = function(co, ...)
  arm(co)
  return resumed(resume(co, ...))
end

coroutine.wrap = function(f)
  local co = create(f)
  local function unwrap(ok, ...)
    if not ok then
      error((...), 0)
    end
    return ...
  end
  return function(...)
    arm(co)
    return unwrap(resumed(resume(co, ...)))
  end
end

coroutine.close = function(co)
  arm(co)
  return resumed(close(co))
end
"#;

/// Resource limits of a sandboxed render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Maximum Lua heap size in bytes.
    pub memory_limit: usize,
    /// Wall-clock execution budget.
    pub budget: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            budget: DEFAULT_BUDGET,
        }
    }
}

/// A server chunk to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Chunk file name, used as the chunk name in Lua errors.
    pub chunk_name: String,
    /// Chunk code.
    pub code: String,
    /// Base URL of client chunks.
    pub base: String,
    /// Symbol id to client chunk file.
    pub symbols: BTreeMap<String, String>,
}

/// Runs a server chunk and returns the rendered markup.
pub trait IsolatedExecutor: Send + Sync {
    /// Executes `request` with both runtimes pre-loaded.
    fn execute(&self, request: &RenderRequest, core: &RuntimeBundle, server: &RuntimeBundle) -> Result<String>;
}

/// [`IsolatedExecutor`] backed by a fresh, sandboxed Lua state per call.
#[derive(Debug, Clone, Default)]
pub struct LuaSandbox {
    limits: SandboxLimits,
}

impl LuaSandbox {
    /// Creates a sandbox with the given limits.
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    /// Limits applied to every execution.
    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }
}

fn restrict_globals(lua: &Lua, globals: &Table) -> mlua::Result<()> {
    let os_table: Table = globals.get("os")?;
    let safe_os = lua.create_table()?;
    for name in ["date", "time", "clock", "difftime"] {
        let f: Function = os_table.get(name)?;
        safe_os.set(name, f)?;
    }
    globals.set("os", safe_os)?;

    for name in ["io", "debug", "package", "load", "loadstring", "loadfile", "dofile"] {
        globals.set(name, Value::Nil)?;
    }

    let require = lua.create_function(|_, name: String| -> mlua::Result<()> {
        Err(mlua::Error::RuntimeError(format!(
            "module '{}' is not available in the server sandbox",
            name
        )))
    })?;
    globals.set("require", require)?;

    let load_chunk = lua.create_function(|_, file: String| -> mlua::Result<()> {
        Err(mlua::Error::RuntimeError(format!(
            "cannot load client chunk {} while rendering on the server",
            file
        )))
    })?;
    globals.set("__lurepl_load_chunk", load_chunk)?;
    Ok(())
}

fn deadline_hook(
    deadline: Instant,
    expired: Arc<AtomicBool>,
) -> impl Fn(&Lua, mlua::Debug) -> mlua::Result<VmState> + Clone + Send + 'static {
    move |_, _| {
        if Instant::now() >= deadline {
            expired.store(true, Ordering::SeqCst);
            return Err(mlua::Error::RuntimeError("execution budget exceeded".to_string()));
        }
        Ok(VmState::Continue)
    }
}

fn install_budget_guard<H>(lua: &Lua, expired: Arc<AtomicBool>, triggers: HookTriggers, hook: H) -> mlua::Result<()>
where
    H: Fn(&Lua, mlua::Debug) -> mlua::Result<VmState> + Clone + Send + 'static,
{
    let is_expired = lua.create_function(move |_, ()| Ok(expired.load(Ordering::SeqCst)))?;
    let arm = lua.create_function(move |_, thread: Thread| {
        thread.set_hook(triggers, hook.clone());
        Ok(())
    })?;
    lua.load(BUDGET_GUARD)
        .set_name("=budget-guard")
        .call::<()>((is_expired, arm))
}

fn install_runtimes(lua: &Lua, globals: &Table, core: &RuntimeBundle, server: &RuntimeBundle) -> mlua::Result<()> {
    let runtime = lua.create_table()?;
    globals.set(RUNTIME_GLOBAL, runtime.clone())?;
    let core_module: Table = lua.load(core.source.as_str()).set_name("@lurepl/core").eval()?;
    runtime.set("core", core_module)?;
    let server_module: Table = lua.load(server.source.as_str()).set_name("@lurepl/server").eval()?;
    runtime.set("server", server_module)?;
    Ok(())
}

/// Module scope for the chunk: `module`, `exports`, globals behind `__index`.
fn module_scope(lua: &Lua, globals: &Table) -> mlua::Result<(Table, Table)> {
    let module = lua.create_table()?;
    let exports = lua.create_table()?;
    module.set("exports", exports.clone())?;

    let meta = lua.create_table()?;
    meta.set("__index", globals.clone())?;
    let setmetatable: Function = globals.get("setmetatable")?;
    let env: Table = setmetatable.call((lua.create_table()?, meta))?;
    env.set("module", module.clone())?;
    env.set("exports", exports)?;
    Ok((env, module))
}

fn render_markup(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.to_string_lossy().to_string()),
        Value::Table(t) => match t.get::<Value>("html")? {
            Value::String(s) => Ok(s.to_string_lossy().to_string()),
            _ => Err(ReplError::ServerExecution(
                "render() returned a table without an html string".to_string(),
            )),
        },
        Value::Integer(_) | Value::Number(_) => Err(ReplError::ServerExecution(
            "render() returned number, expected a string or a table with html".to_string(),
        )),
        other => Err(ReplError::ServerExecution(format!(
            "render() returned {}, expected a string or a table with html",
            other.type_name()
        ))),
    }
}

impl LuaSandbox {
    fn run(&self, lua: &Lua, request: &RenderRequest, core: &RuntimeBundle, server: &RuntimeBundle) -> Result<String> {
        let globals = lua.globals();
        install_runtimes(lua, &globals, core, server)?;

        let (env, module) = module_scope(lua, &globals)?;
        let returned: Value = lua
            .load(request.code.as_str())
            .set_name(format!("@{}", request.chunk_name))
            .set_environment(env)
            .eval()?;

        let exports = match returned {
            Value::Table(table) => table,
            _ => module.get::<Table>("exports")?,
        };
        let render = exports
            .get::<Option<Function>>("render")?
            .ok_or_else(|| ReplError::ServerExecution("server entry does not export a render function".to_string()))?;

        let symbols = lua.create_table()?;
        for (symbol, chunk) in &request.symbols {
            symbols.set(symbol.as_str(), chunk.as_str())?;
        }
        let opts = lua.create_table()?;
        opts.set("base", request.base.as_str())?;
        opts.set("symbols", symbols)?;

        render_markup(render.call::<Value>(opts)?)
    }
}

impl IsolatedExecutor for LuaSandbox {
    fn execute(&self, request: &RenderRequest, core: &RuntimeBundle, server: &RuntimeBundle) -> Result<String> {
        let lua = Lua::new();
        lua.set_memory_limit(self.limits.memory_limit)?;

        let deadline = Instant::now() + self.limits.budget;
        let expired = Arc::new(AtomicBool::new(false));
        let hook = deadline_hook(deadline, expired.clone());
        let triggers = HookTriggers::new().every_nth_instruction(HOOK_INTERVAL);

        restrict_globals(&lua, &lua.globals())?;
        install_budget_guard(&lua, expired.clone(), triggers, hook.clone())?;
        lua.set_hook(triggers, hook);

        let start = Instant::now();
        let result = self.run(&lua, request, core, server);
        tracing::debug!("server chunk {} ran for {}ms", request.chunk_name, start.elapsed().as_millis());

        result.map_err(|err| {
            if expired.load(Ordering::SeqCst) {
                return ReplError::Timeout(self.limits.budget);
            }
            match err {
                ReplError::Lua(mlua::Error::MemoryError(message)) => {
                    ReplError::ServerExecution(format!("memory limit exceeded: {}", message))
                }
                ReplError::Lua(lua_err) => ReplError::ServerExecution(lua_err.to_string()),
                other => other,
            }
        })
    }
}
