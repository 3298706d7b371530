// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Import scanning and dependency ordering.
//!
//! Static imports are `require("x")` calls, dynamic imports are
//! `import("x")` calls. Only string-literal arguments are considered;
//! anything else is left for the runtime to resolve.

use crate::error::Result;
use crate::lexer::{self, TokenKind};
use std::collections::{HashMap, HashSet, VecDeque};

/// One import call found in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSite {
    /// Decoded specifier.
    pub specifier: String,
    /// True for `import(...)`.
    pub dynamic: bool,
    /// Byte span of the string literal argument.
    pub span: (usize, usize),
    /// The argument is wrapped in parentheses.
    pub parenthesized: bool,
    /// Line of the call.
    pub line: usize,
}

/// Finds every `require`/`import` call with a literal argument.
pub fn scan_imports(file: &str, code: &str) -> Result<Vec<ImportSite>> {
    let tokens = lexer::significant_tokens(file, code)?;
    let mut sites = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Name {
            continue;
        }
        let dynamic = match token.text(code) {
            "require" => false,
            "import" => true,
            _ => continue,
        };
        if let Some(prev) = i.checked_sub(1).map(|p| &tokens[p]) {
            // Field access or a definition, not a call of the global
            if prev.is_symbol(code, ".") || prev.is_symbol(code, ":") || prev.is_keyword(code, "function") {
                continue;
            }
        }

        let literal = match tokens.get(i + 1) {
            Some(next) if next.kind == TokenKind::String => Some((next, false)),
            Some(next) if next.is_symbol(code, "(") => match (tokens.get(i + 2), tokens.get(i + 3)) {
                (Some(arg), Some(close)) if arg.kind == TokenKind::String && close.is_symbol(code, ")") => {
                    Some((arg, true))
                }
                _ => None,
            },
            _ => None,
        };

        if let Some((literal, parenthesized)) = literal {
            if let Some(specifier) = lexer::string_value(literal.text(code)) {
                sites.push(ImportSite {
                    specifier,
                    dynamic,
                    span: (literal.start, literal.end),
                    parenthesized,
                    line: token.line,
                });
            }
        }
    }

    Ok(sites)
}

/// Result of ordering a module graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleOrder {
    /// Module ids, dependencies before dependents.
    pub order: Vec<String>,
    /// Each static import cycle, starting and ending with the same id.
    pub cycles: Vec<Vec<String>>,
}

/// Orders modules so dependencies come first and reports import cycles.
///
/// `deps` lists every module with its internal static dependencies, in
/// discovery order. Modules caught in a cycle are appended in discovery
/// order after everything that could be sorted.
pub fn order_modules(deps: &[(String, Vec<String>)]) -> ModuleOrder {
    let known: HashSet<&str> = deps.iter().map(|(id, _)| id.as_str()).collect();

    // Number of unsorted dependencies per module
    let mut pending: HashMap<&str, usize> = HashMap::new();
    // Reverse edges: dependency -> dependents
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for (id, module_deps) in deps {
        let unique: HashSet<&str> = module_deps
            .iter()
            .map(String::as_str)
            .filter(|d| known.contains(d) && *d != id.as_str())
            .collect();
        pending.insert(id.as_str(), unique.len());
        for dep in unique {
            dependents.entry(dep).or_default().push(id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = deps
        .iter()
        .map(|(id, _)| id.as_str())
        .filter(|id| pending.get(id) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(deps.len());
    let mut placed: HashSet<&str> = HashSet::new();

    while let Some(id) = queue.pop_front() {
        if !placed.insert(id) {
            continue;
        }
        order.push(id.to_string());
        for &dependent in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    for (id, _) in deps {
        if !placed.contains(id.as_str()) {
            order.push(id.clone());
        }
    }

    ModuleOrder {
        order,
        cycles: find_cycles(deps),
    }
}

fn find_cycles(deps: &[(String, Vec<String>)]) -> Vec<Vec<String>> {
    let graph: HashMap<&str, &[String]> = deps
        .iter()
        .map(|(id, d)| (id.as_str(), d.as_slice()))
        .collect();

    let mut cycles = Vec::new();
    let mut seen_cycles: HashSet<Vec<String>> = HashSet::new();
    let mut done: HashSet<&str> = HashSet::new();

    for (root, _) in deps {
        if done.contains(root.as_str()) {
            continue;
        }
        // Iterative DFS keeping the current path on a stack
        let mut path: Vec<&str> = vec![root.as_str()];
        let mut cursors: Vec<usize> = vec![0];
        let mut on_path: HashSet<&str> = HashSet::from([root.as_str()]);

        while let Some(node) = path.last().copied() {
            let cursor = cursors.last_mut().map(|c| {
                let current = *c;
                *c += 1;
                current
            });
            let edges = graph.get(node).copied().unwrap_or_default();
            match cursor.and_then(|c| edges.get(c)) {
                Some(next) if graph.contains_key(next.as_str()) => {
                    let next = next.as_str();
                    if on_path.contains(next) {
                        let start = path.iter().position(|n| *n == next).unwrap_or(0);
                        let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                        let mut key = cycle.clone();
                        key.sort();
                        if seen_cycles.insert(key) {
                            cycle.push(next.to_string());
                            cycles.push(cycle);
                        }
                    } else if !done.contains(next) {
                        path.push(next);
                        cursors.push(0);
                        on_path.insert(next);
                    }
                }
                Some(_) => {}
                None => {
                    path.pop();
                    cursors.pop();
                    on_path.remove(node);
                    done.insert(node);
                }
            }
        }
    }

    cycles
}
