// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Chunk planning and rendering.
//!
//! Every chunk is a plain Lua chunk. Its prelude installs (or reuses) a
//! process-wide module registry, then each module registers a lazily
//! evaluated definition. Dynamic chunks only register definitions; the
//! entry chunk additionally returns the entry module's exports.

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::output::{OutputChunk, OutputItem, RenderedModule};
use super::plugin::ChunkInfo;
use super::{ImportTarget, ModuleGraph, OutputOptions};
use crate::error::Result;
use crate::lexer::quote;
use crate::paths;

/// Registry prelude shared by every chunk.
const CHUNK_RUNTIME: &str = r#"local __defs = __lurepl_defs or {}
__lurepl_defs = __defs
local __cache = __lurepl_cache or {}
__lurepl_cache = __cache
local __loading = __lurepl_loading or {}
__lurepl_loading = __loading
local __require, __import
function __require(id)
  local cached = __cache[id]
  if cached ~= nil then return cached end
  local def = __defs[id]
  if def == nil then return require(id) end
  if __loading[id] then error("circular require of " .. id, 2) end
  __loading[id] = true
  local value = def(__require, __import, id)
  __loading[id] = nil
  if value == nil then value = true end
  __cache[id] = value
  return value
end
function __import(file, id)
  if __defs[id] == nil and file ~= nil then __lurepl_load_chunk(file) end
  return __require(id)
end
"#;

struct PlannedChunk {
    file_name: String,
    modules: Vec<usize>,
    is_entry: bool,
    is_dynamic_entry: bool,
}

impl ModuleGraph {
    /// Groups the graph into chunks and renders them.
    ///
    /// Input plugins run before `options.plugins` for both `render_chunk`
    /// and `generate_bundle`.
    pub fn generate(&self, options: &OutputOptions) -> Result<Vec<OutputItem>> {
        let chunks = self.plan_chunks(options.inline_dynamic_imports);

        // Chunk that defines each module reached through import(...)
        let mut homes: HashMap<usize, &str> = HashMap::new();
        for chunk in &chunks {
            for &module in &chunk.modules {
                if chunk.is_entry || !homes.contains_key(&module) {
                    homes.insert(module, &chunk.file_name);
                }
            }
        }

        let plugins: Vec<_> = self.plugins.iter().chain(options.plugins.iter()).collect();
        let mut bundle = Vec::with_capacity(chunks.len());

        for chunk in &chunks {
            let mut code = self.render_chunk(chunk, &homes, options.inline_dynamic_imports);
            let info = ChunkInfo {
                file_name: chunk.file_name.clone(),
                is_entry: chunk.is_entry,
                is_dynamic_entry: chunk.is_dynamic_entry,
            };
            for plugin in &plugins {
                if let Some(next) = plugin.render_chunk(&code, &info)? {
                    code = next;
                }
            }

            let modules = chunk
                .modules
                .iter()
                .map(|&index| {
                    let module = &self.modules[index];
                    RenderedModule {
                        id: module.id.clone(),
                        code: module.code.clone(),
                        segment: module.segment.clone(),
                    }
                })
                .collect();

            bundle.push(OutputItem::Chunk(OutputChunk {
                file_name: chunk.file_name.clone(),
                code,
                is_entry: chunk.is_entry,
                is_dynamic_entry: chunk.is_dynamic_entry,
                modules,
            }));
        }

        for plugin in &plugins {
            plugin.generate_bundle(&mut bundle)?;
        }

        tracing::debug!("generated {} output item(s) for {}", bundle.len(), self.entry);
        Ok(bundle)
    }

    /// Static closure of `starts`, skipping modules in `exclude`.
    fn static_closure(&self, starts: &[usize], exclude: &HashSet<usize>) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<usize> = starts.iter().copied().collect();
        while let Some(index) = queue.pop_front() {
            if exclude.contains(&index) || !seen.insert(index) {
                continue;
            }
            for dep in self.modules[index].internal_imports(false) {
                if let Some(&dep) = self.index.get(dep) {
                    queue.push_back(dep);
                }
            }
        }
        seen
    }

    fn sorted(&self, modules: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut modules: Vec<usize> = modules.into_iter().collect();
        modules.sort_by_key(|&index| (self.rank[index], index));
        modules
    }

    fn plan_chunks(&self, inline_dynamic_imports: bool) -> Vec<PlannedChunk> {
        let entry_index = self.index.get(&self.entry).copied().unwrap_or(0);
        let entry_file = paths::basename(&self.entry).to_string();
        let mut used_names: HashSet<String> = HashSet::from([entry_file.clone()]);

        if inline_dynamic_imports {
            return vec![PlannedChunk {
                file_name: entry_file,
                modules: self.sorted(0..self.modules.len()),
                is_entry: true,
                is_dynamic_entry: false,
            }];
        }

        let entry_set: HashSet<usize> = self
            .static_closure(&[entry_index], &HashSet::new())
            .into_iter()
            .collect();

        // Dynamic entries grouped by chunk group, in discovery order
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        let mut group_of: HashMap<String, usize> = HashMap::new();
        let mut assigned: HashSet<usize> = HashSet::new();

        let mut scan: VecDeque<usize> = self.sorted(entry_set.iter().copied()).into();
        let mut scanned: HashSet<usize> = HashSet::new();

        while let Some(index) = scan.pop_front() {
            if !scanned.insert(index) {
                continue;
            }
            for target in self.modules[index].internal_imports(true) {
                let Some(&target) = self.index.get(target) else {
                    continue;
                };
                if entry_set.contains(&target) || !assigned.insert(target) {
                    continue;
                }
                let module = &self.modules[target];
                let key = module
                    .segment
                    .as_ref()
                    .and_then(|s| s.group.clone())
                    .unwrap_or_else(|| module.id.clone());
                let slot = *group_of.entry(key.clone()).or_insert_with(|| {
                    groups.push((key, Vec::new()));
                    groups.len() - 1
                });
                groups[slot].1.push(target);
                scan.extend(self.static_closure(&[target], &entry_set));
            }
        }

        let mut chunks = vec![PlannedChunk {
            file_name: entry_file,
            modules: self.sorted(entry_set.iter().copied()),
            is_entry: true,
            is_dynamic_entry: false,
        }];

        for (_, entries) in groups {
            let members = self.static_closure(&entries, &entry_set);
            let modules = self.sorted(members);
            let file_name = unique_name(&self.chunk_name(&modules), &mut used_names);
            chunks.push(PlannedChunk {
                file_name,
                modules,
                is_entry: false,
                is_dynamic_entry: true,
            });
        }

        chunks
    }

    fn chunk_name(&self, modules: &[usize]) -> String {
        let mut hasher = Sha256::new();
        for &index in modules {
            let module = &self.modules[index];
            hasher.update(module.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(module.code.as_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());
        format!("q-{}.lua", &digest[..8])
    }

    fn render_chunk(&self, chunk: &PlannedChunk, homes: &HashMap<usize, &str>, inline: bool) -> String {
        let mut out = String::new();
        out.push_str(&format!("-- {}\n", chunk.file_name));
        out.push_str(CHUNK_RUNTIME);

        for &index in &chunk.modules {
            let module = &self.modules[index];
            let id = quote(&module.id);
            out.push_str(&format!("\n-- module: {}\n", module.id.replace('\0', "\\0")));
            out.push_str(&format!("__defs[{0}] = __defs[{0}] or function(require, import, ...)\n", id));
            out.push_str(&self.rewrite_imports(index, homes, inline));
            out.push_str("\nend\n");
        }

        if chunk.is_entry {
            out.push_str(&format!("\nreturn __require({})\n", quote(&self.entry)));
        }
        out
    }

    /// Replaces import specifiers of a module with resolved ids.
    fn rewrite_imports(&self, index: usize, homes: &HashMap<usize, &str>, inline: bool) -> String {
        let module = &self.modules[index];
        let mut code = module.code.clone();

        let mut records: Vec<_> = module.imports.iter().collect();
        records.sort_by_key(|record| std::cmp::Reverse(record.site.span.0));

        for record in records {
            let ImportTarget::Internal(target) = &record.target else {
                continue;
            };
            let replacement = if record.site.dynamic {
                let file = self
                    .index
                    .get(target)
                    .and_then(|target| homes.get(target))
                    .filter(|_| !inline)
                    .map(|file| quote(&format!("./{}", file)))
                    .unwrap_or_else(|| "nil".to_string());
                let args = format!("{}, {}", file, quote(target));
                if record.site.parenthesized {
                    args
                } else {
                    format!("({})", args)
                }
            } else {
                quote(target)
            };
            let (start, end) = record.site.span;
            code.replace_range(start..end, &replacement);
        }

        code
    }
}

pub(super) fn unique_name(candidate: &str, used: &mut HashSet<String>) -> String {
    let mut name = candidate.to_string();
    let mut n = 1;
    while used.contains(&name) {
        let stem = candidate.strip_suffix(".lua").unwrap_or(candidate);
        name = format!("{}-{}.lua", stem, n);
        n += 1;
    }
    used.insert(name.clone());
    name
}
