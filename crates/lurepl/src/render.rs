// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Server rendering and document extraction.

use std::sync::Arc;

use crate::dom;
use crate::error::{ReplError, Result};
use crate::sandbox::{IsolatedExecutor, RenderRequest};
use crate::tools::RuntimeBundle;
use crate::types::{Attributes, ModuleOutput, SymbolManifest};

/// Id of the bootstrap loader script injected by the server runtime.
pub const LOADER_SCRIPT_ID: &str = "lurepl-loader";

/// Options for [`render_server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Base URL of client chunks, passed to `render` as `base`.
    pub base: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            base: "/build/".to_string(),
        }
    }
}

/// Document data extracted from the rendered markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    /// Markup as returned by `render`.
    pub html: String,
    /// Document markup with the loader script removed.
    pub app_html: String,
    /// Text of the removed loader script.
    pub loader_script: String,
    /// Attributes of `<html>`.
    pub doc_element_attributes: Attributes,
    /// Attributes of `<head>`.
    pub head_attributes: Attributes,
    /// Attributes of `<body>`.
    pub body_attributes: Attributes,
    /// Inner markup of `<body>`.
    pub body_inner_html: String,
}

/// Picks the server chunk to execute.
pub fn server_chunk(server_modules: &[ModuleOutput]) -> Result<&ModuleOutput> {
    server_modules
        .iter()
        .find(|module| module.path.ends_with(".lua"))
        .ok_or_else(|| ReplError::ServerExecution("server bundle did not emit a chunk".to_string()))
}

/// Executes the server chunk and extracts document data from its markup.
///
/// The execution runs on the blocking thread pool.
pub async fn render_server(
    executor: Arc<dyn IsolatedExecutor>,
    server_modules: &[ModuleOutput],
    runtimes: (Arc<RuntimeBundle>, Arc<RuntimeBundle>),
    symbols: Option<&SymbolManifest>,
    options: &RenderOptions,
) -> Result<RenderOutput> {
    let chunk = server_chunk(server_modules)?;
    let request = RenderRequest {
        chunk_name: chunk.path.clone(),
        code: chunk.code.clone(),
        base: options.base.clone(),
        symbols: symbols.map(|s| s.mapping.clone()).unwrap_or_default(),
    };
    let (core, server) = runtimes;

    let html = tokio::task::spawn_blocking(move || executor.execute(&request, &core, &server))
        .await
        .map_err(|e| ReplError::ServerExecution(format!("render task failed: {}", e)))??;

    extract_document(html)
}

/// Splits rendered markup into the parts a host displays.
pub fn extract_document(html: String) -> Result<RenderOutput> {
    let dom = dom::parse_document(&html)?;
    let document = &dom.document;

    let mut loader_script = String::new();
    if let Some(loader) = dom::find_by_id(document, LOADER_SCRIPT_ID) {
        loader_script = dom::text_content(&loader);
        dom::detach(&loader);
    }

    let attributes_of = |tag: &str| {
        dom::find_by_tag(document, tag)
            .map(|node| dom::attributes(&node))
            .unwrap_or_default()
    };
    let doc_element_attributes = attributes_of("html");
    let head_attributes = attributes_of("head");
    let body_attributes = attributes_of("body");

    let body_inner_html = match dom::find_by_tag(document, "body") {
        Some(body) => dom::inner_html(&body)?,
        None => String::new(),
    };
    let app_html = dom::inner_html(document)?;

    Ok(RenderOutput {
        html,
        app_html,
        loader_script,
        doc_element_attributes,
        head_attributes,
        body_attributes,
        body_inner_html,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::LuaSandbox;
    use crate::tools::builtin_runtimes;

    #[test]
    fn extracts_attributes_and_strips_loader() {
        let html = r#"<!DOCTYPE html><html lang="en" lr:container="paused"><head data-x="1"><title>t</title></head><body class="app"><main>hi</main><script id="lurepl-loader">boot()</script></body></html>"#;
        let output = extract_document(html.to_string()).unwrap();
        assert_eq!(output.loader_script, "boot()");
        assert_eq!(output.doc_element_attributes.get("lr:container").map(String::as_str), Some("paused"));
        assert_eq!(output.head_attributes.get("data-x").map(String::as_str), Some("1"));
        assert_eq!(output.body_attributes.get("class").map(String::as_str), Some("app"));
        assert_eq!(output.body_inner_html, "<main>hi</main>");
        assert!(!output.app_html.contains("lurepl-loader"));
        assert!(output.app_html.starts_with("<!DOCTYPE html>"));
        assert_eq!(output.html, html);
    }

    #[test]
    fn missing_server_chunk() {
        let modules = vec![ModuleOutput::new("q-manifest.json", "{}", false)];
        let err = server_chunk(&modules).unwrap_err();
        assert_eq!(err.to_string(), "Server render failed: server bundle did not emit a chunk");
    }

    #[tokio::test]
    async fn renders_on_the_blocking_pool() {
        let (core, server) = builtin_runtimes().unwrap();
        let modules = vec![ModuleOutput::new(
            "entry.server.lua",
            "return { render = function(o) return __lurepl_runtime.server.render_to_string('hello', o) end }",
            false,
        )];
        let output = render_server(
            Arc::new(LuaSandbox::default()),
            &modules,
            (Arc::new(core), Arc::new(server)),
            None,
            &RenderOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(output.body_inner_html, "hello");
        assert!(!output.loader_script.is_empty());
        assert_eq!(output.doc_element_attributes.get("lr:base").map(String::as_str), Some("/build/"));
    }
}
