// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Integration tests for the playground server: interception, tool
//! artifacts and the static fallback.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use tempfile::tempdir;

use lurepl::{BuildOptions, CycleConfig, EmbeddedFetcher, EntryStrategy, SourceInput, ToolUrls, Worker, FRAMEWORK_VERSION};
use lurepl_cli::fetch;
use lurepl_cli::server::http::{router, AppState};

const APP: &str = r#"local core = require("@lurepl/core")

return core.component(function()
  return core.h("button", { on_click = core.lazy(function() print("hi") end) }, "Hi")
end)
"#;

fn offline_worker() -> Worker {
    let urls = ToolUrls::default();
    let loader = lurepl::DependencyLoader::new(Arc::new(EmbeddedFetcher::new(urls.clone())), urls);
    Worker::new(loader, CycleConfig::default())
}

fn options(inputs: Vec<SourceInput>) -> BuildOptions {
    BuildOptions {
        entry_strategy: EntryStrategy::Segment,
        src_inputs: inputs,
        ..BuildOptions::default()
    }
}

fn test_server(worker: Worker, static_dir: &Path) -> TestServer {
    let state = Arc::new(AppState {
        worker,
        static_dir: static_dir.to_path_buf(),
    });
    TestServer::new(router(state)).unwrap()
}

#[tokio::test]
async fn serves_client_modules_of_the_last_build() {
    let statics = tempdir().unwrap();
    let worker = offline_worker();
    let outcome = worker
        .run_cycle_now(FRAMEWORK_VERSION, &options(vec![SourceInput::new("/app.lua", APP)]))
        .await;
    assert!(outcome.is_completed(), "{:?}", outcome.result.diagnostics);
    assert_eq!(outcome.result.client_modules.len(), 2);

    let server = test_server(worker, statics.path());
    for module in &outcome.result.client_modules {
        let response = server.get(&format!("/build/{}", module.path)).await;
        response.assert_status_ok();
        assert_eq!(response.text(), module.code);
        assert_eq!(
            response.header("content-type").to_str().unwrap(),
            "application/javascript; charset=utf-8"
        );
        assert_eq!(response.header("x-lurepl-playground").to_str().unwrap(), FRAMEWORK_VERSION);
    }
}

#[tokio::test]
async fn failed_builds_keep_serving_previous_modules() {
    let statics = tempdir().unwrap();
    let worker = offline_worker();
    let good = worker
        .run_cycle_now(FRAMEWORK_VERSION, &options(vec![SourceInput::new("/app.lua", APP)]))
        .await;
    let bad = worker
        .run_cycle_now(FRAMEWORK_VERSION, &options(vec![SourceInput::new("/other.lua", APP)]))
        .await;
    assert!(bad.result.has_errors());

    let server = test_server(worker, statics.path());
    let module = &good.result.client_modules[0];
    let response = server.get(&format!("/{}", module.path)).await;
    response.assert_status_ok();
    assert_eq!(response.text(), module.code);
}

#[tokio::test]
async fn unmatched_requests_fall_through_to_static_files() {
    let statics = tempdir().unwrap();
    fs::write(statics.path().join("index.html"), "<h1>playground</h1>").unwrap();

    let server = test_server(offline_worker(), statics.path());
    let response = server.get("/index.html").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "<h1>playground</h1>");

    server.get("/build/q-00000000.lua").await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn serves_tool_artifacts() {
    let statics = tempdir().unwrap();
    let server = test_server(offline_worker(), statics.path());

    let core = server.get("/repl/core.lua").await;
    core.assert_status_ok();
    assert!(core.text().contains("@lurepl/core"));

    let bundler = server.get("/cdn/lurepl-bundler@1.4.0/dist/bundler.json").await;
    bundler.assert_status_ok();
    let descriptor: serde_json::Value = bundler.json();
    assert_eq!(descriptor["name"], "lurepl-bundler");
    assert_eq!(descriptor["version"], "1.4.0");

    server
        .get("/cdn/lurepl-bundler@0.0.1/dist/bundler.json")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn worker_loads_tools_from_a_running_server() {
    let statics = tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState {
        worker: offline_worker(),
        static_dir: statics.path().to_path_buf(),
    });
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let urls = ToolUrls::local(format!("http://{}", addr));
    let worker = Worker::new(fetch::loader(urls, false), CycleConfig::default());
    let outcome = worker
        .run_cycle_now(FRAMEWORK_VERSION, &options(vec![SourceInput::new("/app.lua", APP)]))
        .await;
    assert!(outcome.is_completed(), "{:?}", outcome.result.diagnostics);
    assert!(outcome.result.body_inner_html.contains("Hi</button>"));
}
