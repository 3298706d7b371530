// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use crate::tools::{CORE_SOURCE, SERVER_SOURCE};
use crate::*;
use mlua::{Function, Lua, Table, Value};
use std::sync::Arc;
use std::time::Duration;

const APP: &str = r#"local core = require("@lurepl/core")
local Counter = require("./counter")

return core.component(function()
  return core.h("main", { id = "app" },
    core.h("h1", nil, "Hello lurepl"),
    core.h(Counter, { start = 3 })
  )
end)
"#;

const COUNTER: &str = r#"local core = require("@lurepl/core")

return core.component(function(props)
  local count = core.signal(props.start or 0)
  return core.h("button", {
    class = "counter",
    on_click = core.lazy(function()
      count:set(count.value + 1)
    end),
  }, "Count: ", count.value)
end)
"#;

fn inputs() -> Vec<SourceInput> {
    vec![SourceInput::new("/app.lua", APP), SourceInput::new("/counter.lua", COUNTER)]
}

fn options(strategy: EntryStrategy) -> BuildOptions {
    BuildOptions {
        entry_strategy: strategy,
        src_inputs: inputs(),
        ..BuildOptions::default()
    }
}

struct Harness {
    fetcher: Arc<EmbeddedFetcher>,
    loader: DependencyLoader,
    ctx: BuildContext,
    config: CycleConfig,
}

impl Harness {
    fn new() -> Self {
        let urls = ToolUrls::default();
        let fetcher = Arc::new(EmbeddedFetcher::new(urls.clone()));
        Self {
            loader: DependencyLoader::new(fetcher.clone(), urls),
            fetcher,
            ctx: BuildContext::default(),
            config: CycleConfig::default(),
        }
    }

    async fn run(&mut self, options: &BuildOptions) -> CycleOutcome {
        run_cycle(&mut self.ctx, &self.loader, FRAMEWORK_VERSION, options, &self.config).await
    }
}

fn worker() -> Worker {
    let urls = ToolUrls::default();
    let loader = DependencyLoader::new(Arc::new(EmbeddedFetcher::new(urls.clone())), urls);
    Worker::new(loader, CycleConfig::default())
}

/// Evaluates a self-contained client chunk and renders the component it
/// returns with the server runtime.
fn render_client_chunk(code: &str) -> String {
    let lua = Lua::new();
    let app: Value = lua.load(code).eval().unwrap();
    let core: Table = lua.load(CORE_SOURCE).eval().unwrap();
    let runtime = lua.create_table().unwrap();
    runtime.set("core", core.clone()).unwrap();
    lua.globals().set("__lurepl_runtime", runtime).unwrap();
    let server: Table = lua.load(SERVER_SOURCE).eval().unwrap();

    let h: Function = core.get("h").unwrap();
    let node: Value = h.call((app, Value::Nil)).unwrap();
    let render: Function = server.get("render_to_string").unwrap();
    let out: Table = render.call(node).unwrap();
    out.get("html").unwrap()
}

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn single_strategy_builds_renders_and_formats() {
        let mut harness = Harness::new();
        let outcome = harness.run(&options(EntryStrategy::Single)).await;
        let result = &outcome.result;

        assert_eq!(outcome.state, CycleState::Completed);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

        assert_eq!(result.client_modules.len(), 1);
        assert!(result.client_modules[0].is_entry);
        assert!(result.client_modules[0].path.starts_with("q-"));
        assert_eq!(result.server_modules.len(), 1);
        assert_eq!(result.server_modules[0].path, "entry.server.lua");

        assert!(result.output_html.contains("Hello lurepl"));
        assert!(result.body_inner_html.contains("<h1>Hello lurepl</h1>"));
        assert!(result.body_inner_html.contains("Count: 3"));
        assert_eq!(result.doc_element_attributes.get("lr:container").map(String::as_str), Some("paused"));
        assert!(!result.loader_script.is_empty());
        assert!(!result.app_html.contains("lurepl-loader"));

        let symbols = result.symbols_entry_map.as_ref().unwrap();
        assert_eq!(symbols.symbols.len(), 3);
        let chunk = &result.client_modules[0].path;
        assert!(symbols.mapping.values().all(|file| file == chunk));
        let handler = symbols
            .symbols
            .iter()
            .find(|(_, entry)| entry.kind == SegmentKind::Handler)
            .map(|(symbol, _)| symbol.clone())
            .unwrap();
        assert!(result
            .body_inner_html
            .contains(&format!("on:click=\"/build/{}#{}\"", chunk, handler)));

        assert!(result.transformed_module_output.contains_key("/app.lua"));
        assert!(result.transformed_module_output.contains_key("/counter.lua"));
    }

    #[tokio::test]
    async fn segment_strategy_splits_every_segment() {
        let mut harness = Harness::new();
        let outcome = harness.run(&options(EntryStrategy::Segment)).await;
        assert!(outcome.is_completed(), "{:?}", outcome.result.diagnostics);
        assert_eq!(outcome.result.client_modules.len(), 3);
        assert!(outcome.result.client_modules.iter().all(|m| m.is_entry));
    }

    #[tokio::test]
    async fn inline_strategy_keeps_the_entry_chunk() {
        let mut harness = Harness::new();
        let outcome = harness.run(&options(EntryStrategy::Inline)).await;
        let modules = &outcome.result.client_modules;
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].path, "app.lua");
        assert!(!modules[0].is_entry);

        let html = render_client_chunk(&modules[0].code);
        assert!(html.contains("<button class=\"counter\""));
    }

    #[tokio::test]
    async fn missing_entry_is_a_single_error() {
        let mut harness = Harness::new();
        let options = BuildOptions {
            src_inputs: vec![SourceInput::new("/counter.lua", COUNTER)],
            ..BuildOptions::default()
        };
        let outcome = harness.run(&options).await;

        assert_eq!(outcome.state, CycleState::Failed);
        assert_eq!(outcome.result.diagnostics.len(), 1);
        assert!(outcome.result.diagnostics[0].is_error());
        assert_eq!(outcome.result.diagnostics[0].message, "Could not load /app.lua");
        assert!(outcome.result.client_modules.is_empty());
        assert!(outcome.result.server_modules.is_empty());
    }

    #[tokio::test]
    async fn repeated_builds_are_byte_identical() {
        let mut harness = Harness::new();
        let first = harness.run(&options(EntryStrategy::Segment)).await.result;
        let second = harness.run(&options(EntryStrategy::Segment)).await.result;
        assert_eq!(first.client_modules, second.client_modules);
        assert_eq!(first.server_modules, second.server_modules);
        assert_eq!(first.output_html, second.output_html);
    }

    #[tokio::test]
    async fn same_version_reuses_tools() {
        let mut harness = Harness::new();
        harness.run(&options(EntryStrategy::Single)).await;
        let fetched = harness.fetcher.fetch_count();
        harness.run(&options(EntryStrategy::Single)).await;
        assert_eq!(harness.fetcher.fetch_count(), fetched);
        assert!(harness.ctx.bundler_cache.as_ref().map(|c| c.hits() > 0).unwrap_or(false));
    }

    #[tokio::test]
    async fn minify_changes_chunks_but_not_behavior() {
        let mut harness = Harness::new();
        let plain = harness.run(&options(EntryStrategy::Inline)).await.result;
        let minified = harness
            .run(&BuildOptions {
                minify: MinifyMode::Minify,
                ..options(EntryStrategy::Inline)
            })
            .await
            .result;

        assert!(minified.diagnostics.is_empty(), "{:?}", minified.diagnostics);
        assert_ne!(plain.client_modules[0].code, minified.client_modules[0].code);
        assert!(minified.client_modules[0].code.len() < plain.client_modules[0].code.len());
        assert_eq!(
            render_client_chunk(&plain.client_modules[0].code),
            render_client_chunk(&minified.client_modules[0].code)
        );
        assert!(harness.ctx.minifier.is_some());
    }

    #[tokio::test]
    async fn client_only_builds_skip_rendering() {
        let mut harness = Harness::new();
        let outcome = harness
            .run(&BuildOptions {
                ssr_build: false,
                ..options(EntryStrategy::Single)
            })
            .await;
        assert!(outcome.is_completed());
        assert!(!outcome.result.client_modules.is_empty());
        assert!(outcome.result.server_modules.is_empty());
        assert!(outcome.result.output_html.is_empty());
    }

    #[tokio::test]
    async fn captured_locals_are_reported_as_warnings() {
        let mut harness = Harness::new();
        let app = r#"local core = require("@lurepl/core")
local greeting = "hi"

return core.component(function()
  return core.h("p", nil, greeting)
end)
"#;
        let outcome = harness
            .run(&BuildOptions {
                src_inputs: vec![SourceInput::new("/app.lua", app)],
                ..BuildOptions::default()
            })
            .await;

        assert!(outcome.is_completed());
        assert!(!outcome.result.has_errors());
        let warnings: Vec<_> = outcome
            .result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Some(Severity::Warning))
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("captures top-level local \"greeting\""));
        assert!(outcome.result.body_inner_html.contains("<p>hi</p>"));
    }

    #[tokio::test]
    async fn split_handlers_receive_component_state() {
        let mut harness = Harness::new();
        let outcome = harness.run(&options(EntryStrategy::Segment)).await;
        assert!(outcome.is_completed(), "{:?}", outcome.result.diagnostics);
        assert!(outcome.result.diagnostics.is_empty(), "{:?}", outcome.result.diagnostics);

        let modules = &outcome.result.transformed_module_output;
        let (_, handler) = modules
            .iter()
            .find(|(id, _)| id.starts_with("/counter_component_lazy_"))
            .unwrap();
        assert!(handler.contains("return function(count)\nreturn function()"), "{}", handler);

        let (_, component) = modules
            .iter()
            .find(|(id, _)| id.starts_with("/counter_component_") && !id.contains("lazy"))
            .unwrap();
        assert!(component.contains("(count) end)"), "{}", component);
    }

    #[tokio::test]
    async fn debug_builds_annotate_segments() {
        let mut harness = Harness::new();
        let outcome = harness
            .run(&BuildOptions {
                debug: true,
                ..options(EntryStrategy::Segment)
            })
            .await;
        assert!(outcome
            .result
            .transformed_module_output
            .values()
            .any(|code| code.contains("extracted from /app.lua")));
    }

    #[tokio::test]
    async fn infinite_loops_fail_with_timeout() {
        let mut harness = Harness::new();
        harness.config = CycleConfig {
            executor: Arc::new(LuaSandbox::new(SandboxLimits {
                budget: Duration::from_millis(200),
                ..SandboxLimits::default()
            })),
            ..CycleConfig::default()
        };
        let app = r#"local core = require("@lurepl/core")
return core.component(function()
  while true do end
end)
"#;
        let outcome = harness
            .run(&BuildOptions {
                src_inputs: vec![SourceInput::new("/app.lua", app)],
                ..BuildOptions::default()
            })
            .await;

        assert_eq!(outcome.state, CycleState::Failed);
        assert!(outcome.result.diagnostics[0].message.contains("exceeded its execution budget"));
        assert!(!outcome.result.client_modules.is_empty());
    }

    #[tokio::test]
    async fn user_code_has_no_io() {
        let mut harness = Harness::new();
        let app = r#"local core = require("@lurepl/core")
return core.component(function()
  return core.h("p", nil, type(io), "/", type(os.execute))
end)
"#;
        let outcome = harness
            .run(&BuildOptions {
                src_inputs: vec![SourceInput::new("/app.lua", app)],
                ..BuildOptions::default()
            })
            .await;
        assert!(outcome.result.body_inner_html.contains("<p>nil/nil</p>"));
    }

    #[tokio::test]
    async fn unknown_dependency_url_fails_the_cycle() {
        let urls = ToolUrls::default();
        let fetcher = Arc::new(EmbeddedFetcher::new(ToolUrls::new("http://elsewhere", "http://elsewhere/cdn")));
        let loader = DependencyLoader::new(fetcher, urls);
        let mut ctx = BuildContext::default();
        let outcome = run_cycle(
            &mut ctx,
            &loader,
            FRAMEWORK_VERSION,
            &options(EntryStrategy::Single),
            &CycleConfig::default(),
        )
        .await;

        assert_eq!(outcome.state, CycleState::Failed);
        assert_eq!(outcome.result.diagnostics.len(), 1);
        assert!(outcome.result.diagnostics[0].message.starts_with("Unable to load dependency"));
    }
}

mod worker_tests {
    use super::*;

    #[tokio::test]
    async fn client_modules_are_intercepted_after_completion() {
        let worker = worker();
        let outcome = worker.run_cycle_now(FRAMEWORK_VERSION, &options(EntryStrategy::Segment)).await;
        assert!(outcome.is_completed());

        for module in &outcome.result.client_modules {
            let asset = worker
                .intercept(&format!("http://localhost/build/{}", module.path))
                .unwrap();
            assert_eq!(asset.body, module.code);
            assert_eq!(asset.headers[0].1, "application/javascript; charset=utf-8");
            assert_eq!(asset.headers[2], ("X-Lurepl-Playground".to_string(), "0.4.0".to_string()));
        }
        assert!(worker.intercept("http://localhost/build/index.html").is_none());
    }

    #[tokio::test]
    async fn failed_cycle_keeps_previous_modules() {
        let worker = worker();
        let good = worker.run_cycle_now(FRAMEWORK_VERSION, &options(EntryStrategy::Single)).await;
        let path = good.result.client_modules[0].path.clone();

        let broken = BuildOptions {
            src_inputs: vec![SourceInput::new("/counter.lua", COUNTER)],
            ..BuildOptions::default()
        };
        let bad = worker.run_cycle_now(FRAMEWORK_VERSION, &broken).await;
        assert!(bad.result.has_errors());
        assert!(bad.result.client_modules.is_empty());

        let asset = worker.intercept(&format!("http://localhost/{}", path)).unwrap();
        assert_eq!(asset.body, good.result.client_modules[0].code);
        assert!(worker.latest().unwrap().has_errors());
    }

    #[tokio::test]
    async fn newer_submissions_win() {
        let worker = worker();
        let (_, mut receiver) = worker.subscribe();

        worker.submit(FRAMEWORK_VERSION, options(EntryStrategy::Segment));
        let last = worker.submit(FRAMEWORK_VERSION, options(EntryStrategy::Single));
        assert_eq!(last, 2);

        let message = receiver.recv().await.unwrap();
        let WorkerMessage::Result(result) = message.as_ref();
        // The first cycle was aborted before it could publish.
        assert_eq!(result.client_modules.len(), 1);
        assert_eq!(worker.latest().as_ref(), Some(result));
    }

    #[tokio::test]
    async fn update_messages_start_cycles() {
        let worker = worker();
        let (_, mut receiver) = worker.subscribe();
        let message = serde_json::json!({
            "type": "update",
            "version": FRAMEWORK_VERSION,
            "options": {
                "entryStrategy": "single",
                "srcInputs": [
                    { "path": "/app.lua", "code": APP },
                    { "path": "/counter.lua", "code": COUNTER }
                ]
            }
        });
        worker.handle_message(&message.to_string()).unwrap();

        let message = receiver.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["diagnostics"], serde_json::json!([]));
        assert!(json["outputHtml"].as_str().unwrap().contains("Hello lurepl"));
    }

    #[tokio::test]
    async fn invalid_location_still_runs_the_update() {
        let worker = worker();
        let (_, mut receiver) = worker.subscribe();
        let message = serde_json::json!({
            "type": "update",
            "location": "not a url",
            "version": FRAMEWORK_VERSION,
            "options": {
                "srcInputs": [
                    { "path": "/app.lua", "code": APP },
                    { "path": "/counter.lua", "code": COUNTER }
                ]
            }
        });
        let err = worker.handle_message(&message.to_string()).unwrap_err();
        assert!(matches!(err, ReplError::Protocol(_)), "{:?}", err);

        let message = receiver.recv().await.unwrap();
        let WorkerMessage::Result(result) = message.as_ref();
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert!(result.output_html.contains("Hello lurepl"));
    }
}
