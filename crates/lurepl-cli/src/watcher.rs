// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File system watching for rebuilds.
//!
//! Change events are debounced (300ms) and filtered to `.lua` files.

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Watches a source directory for changes to Lua modules.
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Watches `path` recursively. `on_change` receives the changed `.lua`
    /// paths relative to `path`, once per debounced batch.
    pub fn new<F>(path: &Path, on_change: F) -> anyhow::Result<Self>
    where
        F: Fn(Vec<PathBuf>) + Send + 'static,
    {
        let base = path.to_path_buf();
        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| match result {
            Ok(events) => {
                let mut changed: Vec<PathBuf> = events
                    .iter()
                    .flat_map(|e| e.paths.iter())
                    .filter(|p| is_lua(p))
                    .map(|p| p.strip_prefix(&base).unwrap_or(p).to_path_buf())
                    .collect();
                changed.sort();
                changed.dedup();

                if !changed.is_empty() {
                    on_change(changed);
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::warn!("watch error: {}", error);
                }
            }
        })?;

        debouncer.watch(path, RecursiveMode::Recursive)?;

        Ok(Self { _debouncer: debouncer })
    }
}

/// True for `.lua` files.
pub fn is_lua(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("lua")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lua_files_count() {
        assert!(is_lua(Path::new("src/app.lua")));
        assert!(!is_lua(Path::new("src/app.luat")));
        assert!(!is_lua(Path::new("src/lua")));
    }
}
