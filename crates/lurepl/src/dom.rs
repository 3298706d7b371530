// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Small helpers over the html5ever reference-counted DOM.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::ParseOpts;
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use std::io::BufReader;
use std::rc::Rc;

use crate::error::Result;
use crate::types::Attributes;

/// Parses a full HTML document.
pub fn parse_document(html: &str) -> Result<RcDom> {
    let mut bytes = BufReader::new(html.as_bytes());
    let dom = html5ever::parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut bytes)?;
    Ok(dom)
}

/// Local name of an element, `None` for other nodes.
pub fn tag_name(handle: &Handle) -> Option<&str> {
    match handle.data {
        NodeData::Element { ref name, .. } => Some(&*name.local),
        _ => None,
    }
}

/// First element in document order matching `predicate`.
pub fn find(handle: &Handle, predicate: &dyn Fn(&Handle) -> bool) -> Option<Handle> {
    let mut stack = vec![handle.clone()];
    while let Some(node) = stack.pop() {
        if tag_name(&node).is_some() && predicate(&node) {
            return Some(node);
        }
        let children = node.children.borrow();
        stack.extend(children.iter().rev().cloned());
    }
    None
}

/// First element with the given tag name.
pub fn find_by_tag(handle: &Handle, tag: &str) -> Option<Handle> {
    find(handle, &|node| tag_name(node) == Some(tag))
}

/// First element with the given `id` attribute.
pub fn find_by_id(handle: &Handle, id: &str) -> Option<Handle> {
    find(handle, &|node| attributes(node).get("id").map(String::as_str) == Some(id))
}

/// Attributes of an element, keyed by name.
pub fn attributes(handle: &Handle) -> Attributes {
    match handle.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => Attributes::new(),
    }
}

/// Concatenated text of all descendant text nodes.
pub fn text_content(handle: &Handle) -> String {
    let mut text = String::new();
    let mut stack = vec![handle.clone()];
    while let Some(node) = stack.pop() {
        if let NodeData::Text { ref contents } = node.data {
            text.push_str(&contents.borrow());
        }
        let children = node.children.borrow();
        stack.extend(children.iter().rev().cloned());
    }
    text
}

/// Removes a node from its parent.
pub fn detach(handle: &Handle) {
    let parent = handle.parent.take().and_then(|weak| weak.upgrade());
    if let Some(parent) = parent {
        parent.children.borrow_mut().retain(|child| !Rc::ptr_eq(child, handle));
    }
}

fn serialize_with(handle: &Handle, scope: TraversalScope) -> Result<String> {
    let mut out = Vec::new();
    let node: SerializableHandle = handle.clone().into();
    let options = SerializeOpts {
        traversal_scope: scope,
        ..SerializeOpts::default()
    };
    serialize(&mut out, &node, options)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Markup of the children of `handle`. For the document node this is the
/// whole document, doctype included.
pub fn inner_html(handle: &Handle) -> Result<String> {
    serialize_with(handle, TraversalScope::ChildrenOnly(None))
}

/// Markup of an element including its own tags.
pub fn outer_html(handle: &Handle) -> Result<String> {
    serialize_with(handle, TraversalScope::IncludeNode)
}
