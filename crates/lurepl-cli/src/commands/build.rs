// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Build command: one cycle over a directory of Lua sources.

use clap::Args;
use console::style;
use lurepl::{
    run_cycle, BuildContext, BuildOptions, BuildResult, CycleOutcome, Diagnostic, EntryStrategy, MinifyMode,
    Severity, SourceInput,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::Config;
use crate::fetch;
use crate::watcher::is_lua;

/// Arguments of `lurepl build`.
#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    /// Source directory; every `.lua` file below it becomes an input
    pub dir: PathBuf,
    /// Framework version to build with (overrides lurepl.toml)
    #[arg(long = "version", value_name = "VERSION")]
    pub framework_version: Option<String>,
    /// Entry strategy: inline, single, segment, component
    #[arg(long, default_value = "single")]
    pub entry_strategy: EntryStrategy,
    /// Minify client chunks
    #[arg(long)]
    pub minify: bool,
    /// Annotate extracted segments
    #[arg(long)]
    pub debug: bool,
    /// Use the embedded tool artifacts instead of fetching them
    #[arg(long)]
    pub offline: bool,
    /// Output directory
    #[arg(short, long, default_value = "dist")]
    pub output: PathBuf,
}

impl BuildArgs {
    /// Build options for the sources currently in `dir`.
    pub fn options(&self) -> anyhow::Result<BuildOptions> {
        Ok(BuildOptions {
            entry_strategy: self.entry_strategy,
            minify: if self.minify { MinifyMode::Minify } else { MinifyMode::None },
            debug: self.debug,
            src_inputs: collect_inputs(&self.dir)?,
            ..BuildOptions::default()
        })
    }
}

/// Runs the build command.
pub async fn run(args: BuildArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    let start = Instant::now();

    println!("{} {}", style("Building sources from:").cyan(), args.dir.display());

    let outcome = execute(&args, &config).await?;
    print_diagnostics(&outcome.result.diagnostics);

    if !outcome.is_completed() {
        anyhow::bail!("build failed while {}", outcome.state);
    }

    write_output(&args.output, &outcome.result)?;
    println!(
        "{} {} client module(s) to {} in {}ms",
        style("Wrote").green().bold(),
        outcome.result.client_modules.len(),
        args.output.display(),
        start.elapsed().as_millis()
    );
    Ok(())
}

/// Runs one cycle for `args` with a fresh build context.
pub async fn execute(args: &BuildArgs, config: &Config) -> anyhow::Result<CycleOutcome> {
    let options = args.options()?;
    let version = args
        .framework_version
        .clone()
        .unwrap_or_else(|| config.worker.version.clone());

    let urls = config.tools.urls(&format!("http://127.0.0.1:{}", config.server.port));
    let loader = fetch::loader(urls, args.offline || config.tools.offline);
    let mut ctx = BuildContext::with_cache_capacity(config.worker.cache_capacity);

    Ok(run_cycle(&mut ctx, &loader, &version, &options, &config.worker.cycle_config()).await)
}

/// Reads every `.lua` file below `dir` as a source input named by its
/// absolute virtual path (`/sub/file.lua`).
pub fn collect_inputs(dir: &Path) -> anyhow::Result<Vec<SourceInput>> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut inputs = Vec::with_capacity(files.len());
    for file in files {
        let relative = file.strip_prefix(dir).unwrap_or(&file);
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        inputs.push(SourceInput::new(format!("/{}", path), fs::read_to_string(&file)?));
    }
    Ok(inputs)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if is_lua(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Writes `client/`, `server/`, `index.html` and `result.json` below `output`.
pub fn write_output(output: &Path, result: &BuildResult) -> anyhow::Result<()> {
    for (dir, modules) in [("client", &result.client_modules), ("server", &result.server_modules)] {
        let dir = output.join(dir);
        fs::create_dir_all(&dir)?;
        for module in modules {
            fs::write(dir.join(&module.path), &module.code)?;
        }
    }
    fs::write(output.join("index.html"), &result.output_html)?;
    fs::write(output.join("result.json"), serde_json::to_string_pretty(result)?)?;
    Ok(())
}

/// Prints diagnostics, errors in red and warnings in yellow.
pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Some(Severity::Error) => eprintln!("{} {}", style("error:").red().bold(), diagnostic.message),
            Some(Severity::Warning) => eprintln!("{} {}", style("warning:").yellow(), diagnostic.message),
            None => eprintln!("{}", diagnostic.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lurepl::CycleState;
    use tempfile::tempdir;

    const APP: &str = r#"local core = require("@lurepl/core")
local Title = require("./ui/title")

return core.component(function()
  return core.h("main", nil, core.h(Title, { text = "Built" }))
end)
"#;

    const TITLE: &str = r#"local core = require("@lurepl/core")

return core.component(function(props)
  return core.h("h1", nil, props.text)
end)
"#;

    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ui")).unwrap();
        fs::write(dir.path().join("app.lua"), APP).unwrap();
        fs::write(dir.path().join("ui/title.lua"), TITLE).unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();
        dir
    }

    fn args(dir: &Path, output: &Path) -> BuildArgs {
        BuildArgs {
            dir: dir.to_path_buf(),
            framework_version: None,
            entry_strategy: EntryStrategy::Segment,
            minify: false,
            debug: false,
            offline: true,
            output: output.to_path_buf(),
        }
    }

    #[test]
    fn collects_lua_sources_as_virtual_paths() {
        let dir = project();
        let inputs = collect_inputs(dir.path()).unwrap();
        let paths: Vec<_> = inputs.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["/app.lua", "/ui/title.lua"]);
        assert_eq!(inputs[0].code, APP);
    }

    #[tokio::test]
    async fn builds_and_writes_output() {
        let dir = project();
        let out = tempdir().unwrap();
        let args = args(dir.path(), out.path());

        let outcome = execute(&args, &Config::default()).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.result.diagnostics);
        assert!(outcome.result.body_inner_html.contains("<h1>Built</h1>"));

        write_output(out.path(), &outcome.result).unwrap();
        for module in &outcome.result.client_modules {
            let written = fs::read_to_string(out.path().join("client").join(&module.path)).unwrap();
            assert_eq!(written, module.code);
        }
        assert!(out.path().join("server/entry.server.lua").exists());
        let index = fs::read_to_string(out.path().join("index.html")).unwrap();
        assert!(index.contains("Built"));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.path().join("result.json")).unwrap()).unwrap();
        assert_eq!(json["diagnostics"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn missing_entry_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("other.lua"), TITLE).unwrap();
        let out = tempdir().unwrap();

        let outcome = execute(&args(dir.path(), out.path()), &Config::default()).await.unwrap();
        assert_eq!(outcome.state, CycleState::Failed);
        assert_eq!(outcome.result.diagnostics.len(), 1);
    }
}
