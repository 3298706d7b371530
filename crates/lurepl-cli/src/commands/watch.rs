// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File watcher command: rebuilds a source directory on every change.

use console::style;
use lurepl::{BuildContext, BuildOptions, Worker, WorkerMessage};
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

use super::build::{collect_inputs, print_diagnostics, write_output};
use crate::config::Config;
use crate::fetch;
use crate::watcher::FileWatcher;

fn options_for(dir: &Path) -> Option<BuildOptions> {
    match collect_inputs(dir) {
        Ok(src_inputs) => Some(BuildOptions {
            src_inputs,
            ..BuildOptions::default()
        }),
        Err(e) => {
            eprintln!("{} could not read {}: {}", style("error:").red().bold(), dir.display(), e);
            None
        }
    }
}

/// Watches `dir` and writes every completed build to `output`.
pub async fn run(dir: &Path, output: &Path, offline: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let version = config.worker.version.clone();
    let urls = config.tools.urls(&format!("http://127.0.0.1:{}", config.server.port));
    let worker = Worker::with_context(
        fetch::loader(urls, offline || config.tools.offline),
        config.worker.cycle_config(),
        BuildContext::with_cache_capacity(config.worker.cache_capacity),
    );

    let (_, mut results) = worker.subscribe();
    let output = output.to_path_buf();
    let writer = tokio::spawn(async move {
        loop {
            let message = match results.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            let WorkerMessage::Result(result) = message.as_ref();
            print_diagnostics(&result.diagnostics);
            if result.has_errors() {
                continue;
            }
            match write_output(&output, result) {
                Ok(()) => println!(
                    "  {} {} client module(s) to {}",
                    style("Rebuilt").green(),
                    result.client_modules.len(),
                    output.display()
                ),
                Err(e) => eprintln!("{} {}", style("error:").red().bold(), e),
            }
        }
    });

    if let Some(options) = options_for(dir) {
        worker.submit(version.clone(), options);
    }

    let handle = tokio::runtime::Handle::current();
    let source_dir = dir.to_path_buf();
    let watched = worker.clone();
    let _watcher = FileWatcher::new(dir, move |paths: Vec<PathBuf>| {
        let files = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("  File changed: {} - rebuild triggered", files);

        if let Some(options) = options_for(&source_dir) {
            let _guard = handle.enter();
            watched.submit(version.clone(), options);
        }
    })?;

    println!("Watching for changes in: {}", dir.display());
    println!("Press Ctrl+C to stop...");
    println!();

    signal::ctrl_c().await?;

    println!("\nStopping file watcher...");
    writer.abort();
    Ok(())
}
