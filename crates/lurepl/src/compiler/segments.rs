// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The built-in segment compiler.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::{Compiler, SegmentModule, TransformOptions, TransformOutput};
use crate::bundler::SegmentMeta;
use crate::error::{ReplError, Result};
use crate::lexer::{self, quote, Token, TokenKind};
use crate::paths;
use crate::types::{EntryStrategy, SegmentKind};

/// Line injected in front of every module that contains markers. It stays on
/// the first line so line numbers of the user code are unchanged.
const CORE_IMPORT: &str = "local __lurepl = require(\"@lurepl/core\"); ";

/// Group shared by every segment with the `single` strategy.
const SINGLE_GROUP: &str = "segments";

lazy_static! {
    /// Top-level `local x = require("y")` declarations, copied into segments.
    static ref REQUIRE_LOCAL: Regex = Regex::new(
        r#"(?m)^local\s+([A-Za-z_][A-Za-z0-9_]*)\s*=\s*require\s*\(?\s*["'][^"'\n]+["']\s*\)?[ \t]*;?[ \t]*$"#
    )
    .unwrap();

    /// Any other top-level local declaration.
    static ref TOP_LEVEL_LOCAL: Regex = Regex::new(
        r"(?m)^local\s+(?:function\s+([A-Za-z_][A-Za-z0-9_]*)|([A-Za-z_][A-Za-z0-9_]*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_]*)*))"
    )
    .unwrap();
}

/// Extracts `component`/`lazy` function literals into segments.
#[derive(Debug, Clone)]
pub struct SegmentCompiler {
    version: String,
}

impl SegmentCompiler {
    /// Creates a compiler reporting the given version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Compiler for SegmentCompiler {
    fn version(&self) -> &str {
        &self.version
    }

    fn transform_module(&self, path: &str, code: &str, options: &TransformOptions) -> Result<TransformOutput> {
        let tokens = lexer::significant_tokens(path, code)?;

        let mut module = ModuleTransform::new(path, code, tokens, options);
        let rewritten = module.rewrite(0, module.tokens.len(), 0, code.len(), None)?;

        if module.markers == 0 {
            return Ok(TransformOutput {
                code: code.to_string(),
                ..TransformOutput::default()
            });
        }

        tracing::debug!(
            "{}: {} marker(s), {} extracted segment(s) for {}",
            path,
            module.markers,
            module.segments.len(),
            options.target.as_str()
        );

        Ok(TransformOutput {
            code: format!("{}{}", CORE_IMPORT, rewritten),
            segments: module.segments,
            warnings: module.warnings,
        })
    }
}

#[derive(Clone, Copy)]
struct Marker {
    kind: SegmentKind,
    fn_token: usize,
    end_token: usize,
}

/// Naming scope of the segment being rewritten.
struct Scope {
    name: String,
    root: String,
}

struct ModuleTransform<'a> {
    path: &'a str,
    code: &'a str,
    tokens: Vec<Token>,
    options: &'a TransformOptions,
    stem: String,
    require_lines: Vec<&'a str>,
    required: HashSet<&'a str>,
    top_level_locals: BTreeSet<String>,
    names: HashMap<String, usize>,
    markers: usize,
    segments: Vec<SegmentModule>,
    warnings: Vec<String>,
}

impl<'a> ModuleTransform<'a> {
    fn new(path: &'a str, code: &'a str, tokens: Vec<Token>, options: &'a TransformOptions) -> Self {
        let mut require_lines = Vec::new();
        let mut required = HashSet::new();
        for captures in REQUIRE_LOCAL.captures_iter(code) {
            if let (Some(line), Some(name)) = (captures.get(0), captures.get(1)) {
                require_lines.push(line.as_str().trim_end());
                required.insert(name.as_str());
            }
        }

        let mut top_level_locals = BTreeSet::new();
        for captures in TOP_LEVEL_LOCAL.captures_iter(code) {
            let names = captures.get(1).or_else(|| captures.get(2)).map(|m| m.as_str()).unwrap_or("");
            for name in names.split(',').map(str::trim) {
                if !name.is_empty() && !required.contains(name) {
                    top_level_locals.insert(name.to_string());
                }
            }
        }

        Self {
            path,
            code,
            tokens,
            options,
            stem: paths::stem_ident(path),
            require_lines,
            required,
            top_level_locals,
            names: HashMap::new(),
            markers: 0,
            segments: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn marker_kind(&self, index: usize) -> Option<SegmentKind> {
        let token = &self.tokens[index];
        if token.kind != TokenKind::Name {
            return None;
        }
        let kind = match token.text(self.code) {
            "component" => SegmentKind::Component,
            "lazy" => SegmentKind::Handler,
            _ => return None,
        };
        if let Some(prev) = index.checked_sub(1).map(|p| &self.tokens[p]) {
            if prev.is_keyword(self.code, "function") || prev.is_symbol(self.code, ":") {
                return None;
            }
        }
        let open = self.tokens.get(index + 1)?;
        let literal = self.tokens.get(index + 2)?;
        (open.is_symbol(self.code, "(") && literal.is_keyword(self.code, "function")).then_some(kind)
    }

    /// Outermost markers among tokens `lo..hi`.
    fn find_markers(&self, lo: usize, hi: usize) -> Result<Vec<Marker>> {
        let mut markers = Vec::new();
        let mut i = lo;
        while i < hi {
            let Some(kind) = self.marker_kind(i) else {
                i += 1;
                continue;
            };
            let line = self.tokens[i].line;
            let fn_token = i + 2;
            let end_token = lexer::matching_block_end(self.code, &self.tokens, fn_token)
                .filter(|&end| end < hi)
                .ok_or_else(|| {
                    ReplError::transform(
                        self.path,
                        format!("unterminated function passed to {}() on line {}", kind.marker(), line),
                    )
                })?;
            match self.tokens.get(end_token + 1) {
                Some(close) if close.is_symbol(self.code, ")") => {}
                _ => {
                    return Err(ReplError::transform(
                        self.path,
                        format!("{}() on line {} takes a single function literal", kind.marker(), line),
                    ))
                }
            }
            markers.push(Marker {
                kind,
                fn_token,
                end_token,
            });
            i = end_token + 2;
        }
        Ok(markers)
    }

    fn next_name(&mut self, prefix: &str, kind: SegmentKind) -> String {
        let base = format!("{}_{}", prefix, kind.marker());
        let seen = self.names.entry(base.clone()).or_insert(0);
        *seen += 1;
        match *seen {
            1 => base,
            n => format!("{}_{}", base, n - 1),
        }
    }

    /// Rewrites the source between `byte_start` and `byte_end`, whose
    /// significant tokens are `lo..hi`.
    fn rewrite(
        &mut self,
        lo: usize,
        hi: usize,
        byte_start: usize,
        byte_end: usize,
        scope: Option<&Scope>,
    ) -> Result<String> {
        let markers = self.find_markers(lo, hi)?;
        let mut out = String::with_capacity(byte_end - byte_start);
        let mut cursor = byte_start;

        for marker in markers {
            self.markers += 1;
            let start = self.tokens[marker.fn_token].start;
            let end = self.tokens[marker.end_token].end;
            out.push_str(&self.code[cursor..start]);

            let prefix = scope.map(|s| s.name.clone()).unwrap_or_else(|| self.stem.clone());
            let name = self.next_name(&prefix, marker.kind);
            let inner = Scope {
                root: scope.map(|s| s.root.clone()).unwrap_or_else(|| name.clone()),
                name,
            };
            let body = self.rewrite(marker.fn_token + 1, marker.end_token, start, end, Some(&inner))?;

            let hash = segment_hash(self.path, &inner.name);
            let symbol = format!("s_{}", hash);
            if self.options.extracts_segments() {
                let file = format!("{}_{}.lua", inner.name, hash);
                let captures = self.extract(&file, &symbol, marker, &inner, &body)?;
                let args = if captures.is_empty() {
                    String::new()
                } else {
                    format!("({})", captures.join(", "))
                };
                out.push_str(&format!(
                    "__lurepl.ref({}, function() return import({}){} end)",
                    quote(&symbol),
                    quote(&format!("./{}", file)),
                    args
                ));
            } else {
                out.push_str(&format!("__lurepl.segment({}, {})", quote(&symbol), body));
            }
            cursor = end;
        }

        out.push_str(&self.code[cursor..byte_end]);
        Ok(out)
    }

    /// Emits the segment module and returns the locals of enclosing
    /// functions it captures. The module then returns a factory taking
    /// those locals, which the parent passes when it loads the segment.
    fn extract(&mut self, file: &str, symbol: &str, marker: Marker, scope: &Scope, body: &str) -> Result<Vec<String>> {
        let kind = marker.kind;
        let (captures, top_level) = self.captures(marker.fn_token, body)?;

        let mut code = String::new();
        if self.options.debug {
            code.push_str(&format!("-- {} ({}) extracted from {}\n", scope.name, symbol, self.path));
        }
        code.push_str("local __lurepl = require(\"@lurepl/core\")\n");
        for line in &self.require_lines {
            code.push_str(line);
            code.push('\n');
        }
        if captures.is_empty() {
            code.push_str("return ");
            code.push_str(body);
        } else {
            code.push_str(&format!("return function({})\nreturn ", captures.join(", ")));
            code.push_str(body);
            code.push_str("\nend");
        }
        code.push('\n');

        for local in top_level {
            self.warnings.push(format!(
                "{}: segment {} captures top-level local \"{}\", which is not available once the segment is split out",
                self.path, scope.name, local
            ));
        }

        let group = match self.options.entry_strategy {
            EntryStrategy::Single => Some(SINGLE_GROUP.to_string()),
            EntryStrategy::Component => Some(scope.root.clone()),
            EntryStrategy::Segment | EntryStrategy::Inline => None,
        };

        self.segments.push(SegmentModule {
            id: format!("{}{}", paths::dirname(self.path), file),
            code,
            meta: SegmentMeta {
                symbol: symbol.to_string(),
                name: scope.name.clone(),
                kind,
                parent: self.path.to_string(),
                group,
            },
        });
        Ok(captures)
    }

    /// Names `body` uses without declaring, split into locals declared
    /// before `fn_token` inside functions of the parent and top-level locals
    /// of the parent. Required modules are re-declared by the segment.
    fn captures(&self, fn_token: usize, body: &str) -> Result<(Vec<String>, Vec<String>)> {
        let free = free_names(self.path, body)?;
        if free.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let in_scope = declared_names(self.code, &self.tokens[..fn_token]);

        let mut captures = Vec::new();
        let mut top_level = Vec::new();
        for name in free {
            if self.top_level_locals.contains(&name) {
                top_level.push(name);
            } else if in_scope.contains(name.as_str()) && !self.required.contains(name.as_str()) {
                captures.push(name);
            }
        }
        Ok((captures, top_level))
    }
}

/// Names read or written by `body` that it does not declare itself.
fn free_names(path: &str, body: &str) -> Result<BTreeSet<String>> {
    let tokens = lexer::significant_tokens(path, body)?;
    let declared = declared_names(body, &tokens);

    let mut free = BTreeSet::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Name {
            continue;
        }
        let name = token.text(body);
        if declared.contains(name) {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        let next = tokens.get(i + 1);
        if prev.is_some_and(|p| p.is_symbol(body, ".") || p.is_symbol(body, ":") || p.is_symbol(body, "::")) {
            continue;
        }
        // Table constructor key
        if next.is_some_and(|n| n.is_symbol(body, "="))
            && prev.is_some_and(|p| p.is_symbol(body, "{") || p.is_symbol(body, ",") || p.is_symbol(body, ";"))
        {
            continue;
        }
        // Labels and goto targets
        if prev.is_some_and(|p| p.is_keyword(body, "goto")) {
            continue;
        }
        free.insert(name.to_string());
    }
    Ok(free)
}

/// Names declared by `local`, function parameters and `for` loops.
fn declared_names<'s>(source: &'s str, tokens: &[Token]) -> HashSet<&'s str> {
    let mut declared = HashSet::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token.is_keyword(source, "local") || token.is_keyword(source, "for") {
            i += 1;
            if tokens.get(i).is_some_and(|t| t.is_keyword(source, "function")) {
                i += 1;
            }
            while let Some(name) = tokens.get(i).filter(|t| t.kind == TokenKind::Name) {
                declared.insert(name.text(source));
                i += 1;
                // Attributes such as <const>
                if tokens.get(i).is_some_and(|t| t.is_symbol(source, "<")) {
                    i += 3;
                }
                if tokens.get(i).is_some_and(|t| t.is_symbol(source, ",")) {
                    i += 1;
                } else {
                    break;
                }
            }
            continue;
        }
        if token.is_symbol(source, "(") && opens_parameters(source, &tokens[..i]) {
            let mut j = i + 1;
            while let Some(param) = tokens.get(j).filter(|t| !t.is_symbol(source, ")")) {
                if param.kind == TokenKind::Name {
                    declared.insert(param.text(source));
                }
                j += 1;
            }
        }
        i += 1;
    }
    declared
}

/// True when a `(` following `before` starts a parameter list, as in
/// `function(` or `function a.b:c(`.
fn opens_parameters(source: &str, before: &[Token]) -> bool {
    for token in before.iter().rev() {
        if token.is_keyword(source, "function") {
            return true;
        }
        if !(token.kind == TokenKind::Name || token.is_symbol(source, ".") || token.is_symbol(source, ":")) {
            return false;
        }
    }
    false
}

/// First 10 hex digits of `sha256(path#name)`.
fn segment_hash(path: &str, name: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(format!("{}#{}", path, name).as_bytes()));
    digest[..10].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Target;

    const APP: &str = r#"local core = require("@lurepl/core")
local App = core.component(function(props)
  return core.h("div", nil, "hi")
end)
return App
"#;

    fn client(strategy: EntryStrategy) -> TransformOptions {
        TransformOptions {
            target: Target::Client,
            entry_strategy: strategy,
            debug: false,
        }
    }

    fn transform(code: &str, options: &TransformOptions) -> Result<TransformOutput> {
        SegmentCompiler::new("0.4.0").transform_module("/app.lua", code, options)
    }

    #[test]
    fn modules_without_markers_are_untouched() {
        let code = "local x = require('./util')\nreturn { x = x }";
        let output = transform(code, &client(EntryStrategy::Single)).unwrap();
        assert_eq!(output.code, code);
        assert!(output.segments.is_empty());
    }

    #[test]
    fn client_extracts_segment_modules() {
        let output = transform(APP, &client(EntryStrategy::Single)).unwrap();

        assert!(output.code.starts_with(CORE_IMPORT));
        assert!(output.code.contains("core.component(__lurepl.ref(\"s_"));
        assert!(output.code.contains("function() return import(\"./app_component_"));
        assert_eq!(output.segments.len(), 1);

        let segment = &output.segments[0];
        assert!(segment.id.starts_with("/app_component_") && segment.id.ends_with(".lua"));
        assert_eq!(segment.meta.name, "app_component");
        assert_eq!(segment.meta.kind, SegmentKind::Component);
        assert_eq!(segment.meta.parent, "/app.lua");
        assert_eq!(segment.meta.group.as_deref(), Some("segments"));
        assert!(segment.meta.symbol.starts_with("s_") && segment.meta.symbol.len() == 12);
        assert!(segment.code.contains("local core = require(\"@lurepl/core\")\n"));
        assert!(segment.code.contains("return function(props)"));
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn server_target_keeps_segments_inline() {
        let options = TransformOptions {
            target: Target::Server,
            ..client(EntryStrategy::Segment)
        };
        let output = transform(APP, &options).unwrap();

        assert!(output.segments.is_empty());
        assert!(output.code.contains("core.component(__lurepl.segment(\"s_"));
        assert!(output.code.contains("function(props)\n  return core.h"));
        assert_eq!(output.code.lines().count(), APP.lines().count());
    }

    #[test]
    fn symbols_are_stable_and_path_dependent() {
        let compiler = SegmentCompiler::new("0.4.0");
        let options = client(EntryStrategy::Segment);
        let a = compiler.transform_module("/app.lua", APP, &options).unwrap();
        let b = compiler.transform_module("/app.lua", APP, &options).unwrap();
        let c = compiler.transform_module("/other/app.lua", APP, &options).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.segments[0].meta.symbol, c.segments[0].meta.symbol);
        assert!(c.segments[0].id.starts_with("/other/app_component_"));
    }

    #[test]
    fn nested_markers_use_parent_names() {
        let code = r#"local core = require("@lurepl/core")
return core.component(function()
  local onclick = core.lazy(function(event) return event end)
  return core.h("button", { on_click = onclick }, "go")
end)
"#;
        let output = transform(code, &client(EntryStrategy::Component)).unwrap();
        let names: Vec<&str> = output.segments.iter().map(|s| s.meta.name.as_str()).collect();
        assert_eq!(names, vec!["app_component_lazy", "app_component"]);
        assert!(output
            .segments
            .iter()
            .all(|s| s.meta.group.as_deref() == Some("app_component")));

        // The outer segment loads the inner one on demand
        assert!(output.segments[1].code.contains("core.lazy(__lurepl.ref(\"s_"));
    }

    #[test]
    fn repeated_markers_get_numbered_names() {
        let code = "local a = component(function() end)\nlocal b = component(function() end)\n";
        let output = transform(code, &client(EntryStrategy::Segment)).unwrap();
        let names: Vec<&str> = output.segments.iter().map(|s| s.meta.name.as_str()).collect();
        assert_eq!(names, vec!["app_component", "app_component_1"]);
        assert!(output.segments.iter().all(|s| s.meta.group.is_none()));
    }

    #[test]
    fn marker_requires_single_function_literal() {
        let err = transform("return component(function() end, 2)", &client(EntryStrategy::Single)).unwrap_err();
        assert!(err.to_string().contains("component() on line 1 takes a single function literal"));
    }

    #[test]
    fn definitions_named_like_markers_are_ignored() {
        let code = "local function component(fn) return fn end\nreturn obj:lazy(function() end)";
        let output = transform(code, &client(EntryStrategy::Single)).unwrap();
        assert_eq!(output.code, code);
    }

    #[test]
    fn captured_top_level_locals_warn() {
        let code = r#"local core = require("@lurepl/core")
local count = 0
return core.component(function(props)
  local label = "n"
  return core.h("p", { count = 1 }, label, count, props.count)
end)
"#;
        let output = transform(code, &client(EntryStrategy::Single)).unwrap();
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("captures top-level local \"count\""));

        let inline = transform(code, &client(EntryStrategy::Inline)).unwrap();
        assert!(inline.warnings.is_empty());
        assert!(inline.segments.is_empty());
    }

    const COUNTER: &str = r#"local core = require("@lurepl/core")
return core.component(function(props)
  local count = core.signal(props.start)
  return core.h("button", {
    on_click = core.lazy(function()
      count:set(count.value + props.step)
      return count.value
    end),
  }, count.value)
end)
"#;

    #[test]
    fn enclosing_locals_are_passed_to_segments() {
        let output = transform(COUNTER, &client(EntryStrategy::Segment)).unwrap();
        assert!(output.warnings.is_empty(), "{:?}", output.warnings);

        let handler = &output.segments[0];
        assert_eq!(handler.meta.kind, SegmentKind::Handler);
        assert!(handler.code.contains("return function(count, props)\nreturn function()"));

        let component = &output.segments[1];
        assert!(component.code.contains(".lua\")(count, props) end)"), "{}", component.code);
        assert!(component.code.contains("return function(props)"));
    }

    #[test]
    fn extracted_handlers_see_captured_state() {
        let output = transform(COUNTER, &client(EntryStrategy::Segment)).unwrap();

        let lua = mlua::Lua::new();
        let core: mlua::Table = lua.load(crate::tools::CORE_SOURCE).eval().unwrap();
        let segments = lua.create_table().unwrap();
        for segment in &output.segments {
            segments
                .set(format!(".{}", segment.id), segment.code.as_str())
                .unwrap();
        }
        let script = r#"
local core, segments, parent = ...
require = function() return core end
import = function(file) return load(segments[file], file)() end
local Counter = load(parent, "parent")()
local node = core.resolve(Counter)({ start = 3, step = 2 })
local handler = core.resolve(node.props.on_click)
handler()
return handler()
"#;
        let count: i64 = lua
            .load(script)
            .call((core, segments, output.code.as_str()))
            .unwrap();
        assert_eq!(count, 7);
    }

    #[test]
    fn lex_errors_become_parse_errors() {
        let err = transform("local s = \"open\nreturn s", &client(EntryStrategy::Single)).unwrap_err();
        assert!(matches!(err, ReplError::Parse { line: 1, .. }));
    }

    #[test]
    fn debug_annotates_segments() {
        let options = TransformOptions {
            debug: true,
            ..client(EntryStrategy::Single)
        };
        let output = transform(APP, &options).unwrap();
        assert!(output.segments[0].code.starts_with("-- app_component (s_"));
    }
}
