// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Output formatting for rendered documents.
//!
//! A [`Printer`] knows no languages by itself; parser plugins register the
//! formats it can print. The built-in [`HtmlPlugin`] re-indents HTML:
//!
//! - block elements get their own lines, children indented by two spaces
//! - elements with only short inline content stay on one line
//! - raw text of `script`, `style`, `pre` and `textarea` is kept verbatim
//!
//! The output is for display only and is never fed back into a build.

use markup5ever_rcdom::{Handle, NodeData};

use crate::dom;
use crate::error::{ReplError, Result};

/// Maximum width of a line joined from inline content.
const PRINT_WIDTH: usize = 80;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "pre", "textarea"];

const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "button", "cite", "code", "data", "dfn", "em", "i", "img", "input",
    "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var",
];

/// Options for [`Printer::format`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    /// Parser name, e.g. `html`.
    pub parser: String,
}

impl PrintOptions {
    /// Options selecting the given parser.
    pub fn parser(parser: impl Into<String>) -> Self {
        Self { parser: parser.into() }
    }
}

/// A language plugin for a [`Printer`].
pub trait PrinterPlugin: Send + Sync {
    /// Parser name this plugin provides.
    fn parser(&self) -> &str;

    /// Pretty-prints `source`.
    fn print(&self, source: &str) -> Result<String>;
}

/// A pretty printer.
pub trait Printer: Send + Sync {
    /// Version tag used for dependency gating.
    fn version(&self) -> &str;

    /// Registers a language plugin.
    fn add_plugin(&mut self, plugin: Box<dyn PrinterPlugin>);

    /// Formats `source` with the plugin named by `options.parser`.
    fn format(&self, source: &str, options: &PrintOptions) -> Result<String>;
}

/// The built-in plugin-driven printer.
pub struct StandalonePrinter {
    version: String,
    plugins: Vec<Box<dyn PrinterPlugin>>,
}

impl StandalonePrinter {
    /// Creates a printer without plugins.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            plugins: Vec::new(),
        }
    }
}

impl Printer for StandalonePrinter {
    fn version(&self) -> &str {
        &self.version
    }

    fn add_plugin(&mut self, plugin: Box<dyn PrinterPlugin>) {
        self.plugins.push(plugin);
    }

    fn format(&self, source: &str, options: &PrintOptions) -> Result<String> {
        let plugin = self
            .plugins
            .iter()
            .find(|p| p.parser() == options.parser)
            .ok_or_else(|| ReplError::Format(format!("Couldn't resolve parser \"{}\"", options.parser)))?;
        plugin.print(source)
    }
}

/// Prints HTML documents.
#[derive(Debug, Clone, Default)]
pub struct HtmlPlugin;

impl PrinterPlugin for HtmlPlugin {
    fn parser(&self) -> &str {
        "html"
    }

    fn print(&self, source: &str) -> Result<String> {
        let dom = dom::parse_document(source)?;
        let mut out = String::with_capacity(source.len() * 2);
        print_node(&dom.document, 0, &mut out);
        Ok(out)
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace runs to one space, keeping a leading or trailing one.
fn squash_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn open_tag(handle: &Handle, tag: &str) -> String {
    let mut open = format!("<{}", tag);
    if let NodeData::Element { ref attrs, .. } = handle.data {
        for attr in attrs.borrow().iter() {
            if attr.value.is_empty() {
                open.push_str(&format!(" {}", attr.name.local));
            } else {
                open.push_str(&format!(" {}=\"{}\"", attr.name.local, escape_attr(&attr.value)));
            }
        }
    }
    open.push('>');
    open
}

/// Renders `handle` on one line when it only holds inline content.
fn inline_markup(handle: &Handle) -> Option<String> {
    match handle.data {
        NodeData::Text { ref contents } => Some(escape_text(&squash_whitespace(&contents.borrow()))),
        NodeData::Comment { .. } => Some(String::new()),
        NodeData::Element { ref name, .. } => {
            let tag: &str = &name.local;
            if !INLINE_ELEMENTS.contains(&tag) {
                return None;
            }
            let mut markup = open_tag(handle, tag);
            if VOID_ELEMENTS.contains(&tag) {
                return Some(markup);
            }
            markup.push_str(&inline_children(handle)?);
            markup.push_str(&format!("</{}>", tag));
            Some(markup)
        }
        _ => None,
    }
}

fn inline_children(handle: &Handle) -> Option<String> {
    let mut markup = String::new();
    for child in handle.children.borrow().iter() {
        let part = inline_markup(child)?;
        let part = if markup.ends_with(' ') {
            part.strip_prefix(' ').unwrap_or(part.as_str())
        } else {
            part.as_str()
        };
        markup.push_str(part);
    }
    Some(markup)
}

fn print_node(handle: &Handle, depth: usize, out: &mut String) {
    match handle.data {
        NodeData::Document => print_children(handle, depth, out),
        NodeData::Doctype { ref name, .. } => {
            out.push_str(&format!("<!DOCTYPE {}>\n", name));
        }
        NodeData::Comment { ref contents } => {
            out.push_str(&format!("{}<!--{}-->\n", indent(depth), contents));
        }
        NodeData::Text { ref contents } => {
            let text = collapse_whitespace(&contents.borrow());
            if !text.is_empty() {
                out.push_str(&format!("{}{}\n", indent(depth), escape_text(&text)));
            }
        }
        NodeData::Element { ref name, .. } => {
            let tag: &str = &name.local;
            print_element(handle, tag, depth, out);
        }
        NodeData::ProcessingInstruction { .. } => {}
    }
}

fn print_element(handle: &Handle, tag: &str, depth: usize, out: &mut String) {
    let pad = indent(depth);
    let open = open_tag(handle, tag);
    let close = format!("</{}>", tag);

    if VOID_ELEMENTS.contains(&tag) {
        out.push_str(&format!("{}{}\n", pad, open));
        return;
    }

    if RAW_TEXT_ELEMENTS.contains(&tag) {
        let text = dom::text_content(handle);
        let text = if tag == "script" || tag == "style" {
            text
        } else {
            escape_text(&text)
        };
        out.push_str(&format!("{}{}{}{}\n", pad, open, text, close));
        return;
    }

    if let Some(content) = inline_children(handle) {
        let content = content.trim();
        let line = format!("{}{}{}{}", pad, open, content, close);
        if line.len() <= PRINT_WIDTH || !content.contains(' ') {
            out.push_str(&line);
            out.push('\n');
            return;
        }
    }

    out.push_str(&format!("{}{}\n", pad, open));
    print_children(handle, depth + 1, out);
    out.push_str(&format!("{}{}\n", pad, close));
}

fn print_children(handle: &Handle, depth: usize, out: &mut String) {
    for child in handle.children.borrow().iter() {
        print_node(child, depth, out);
    }
}
