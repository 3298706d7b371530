// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Virtual path helpers. Module paths are absolute and `/`-separated.

/// True for `./x`, `../x` and `/x`.
pub fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

/// Directory part of `path`, always ending with `/`.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..=index],
        None => "/",
    }
}

/// Last path segment.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// File name without its final extension, as an identifier-safe string.
pub fn stem_ident(path: &str) -> String {
    let base = basename(path);
    let stem = base.strip_suffix(".lua").unwrap_or(base);
    let ident: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if ident.is_empty() {
        "module".to_string()
    } else {
        ident
    }
}

/// Collapses `.` and `..` segments of an absolute path.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Resolves `specifier` against the directory of `importer`.
pub fn resolve_relative(importer: &str, specifier: &str) -> String {
    if specifier.starts_with('/') {
        normalize(specifier)
    } else {
        normalize(&format!("{}{}", dirname(importer), specifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_specifiers() {
        assert_eq!(resolve_relative("/app.lua", "./button"), "/button");
        assert_eq!(resolve_relative("/components/card.lua", "../util.lua"), "/util.lua");
        assert_eq!(resolve_relative("/components/card.lua", "/app.lua"), "/app.lua");
        assert_eq!(resolve_relative("/a/b/c.lua", "./../../x"), "/x");
    }

    #[test]
    fn splits_paths() {
        assert_eq!(dirname("/components/card.lua"), "/components/");
        assert_eq!(dirname("/app.lua"), "/");
        assert_eq!(basename("/components/card.lua"), "card.lua");
        assert_eq!(stem_ident("/entry.server.lua"), "entry_server");
        assert!(is_path_like("./x") && is_path_like("/x") && !is_path_like("@lurepl/core"));
    }
}
