// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Playground server command.

use console::style;
use lurepl::{BuildContext, Worker};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::fetch;
use crate::server::http::{create_server, AppState};

/// Runs the playground server until it is stopped.
pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", host, port);

    // The worker fetches its tools from this server unless told otherwise.
    let urls = config.tools.urls(&format!("http://127.0.0.1:{}", port));
    let worker = Worker::with_context(
        fetch::loader(urls.clone(), config.tools.offline),
        config.worker.cycle_config(),
        BuildContext::with_cache_capacity(config.worker.cache_capacity),
    );

    let state = Arc::new(AppState {
        worker,
        static_dir: PathBuf::from(&config.server.static_dir),
    });

    println!("{} http://{}", style("lurepl playground at").green().bold(), addr);
    println!("  worker socket:  ws://{}/repl/ws", addr);
    println!("  tool artifacts: {}", urls.origin);
    println!("  static files:   {}", config.server.static_dir);

    create_server(&addr, state).await
}
