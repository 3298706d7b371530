// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! In-memory answers for result-frame module requests.

use lazy_static::lazy_static;
use url::Url;

use crate::error::{ReplError, Result};
use crate::types::ModuleOutput;

/// Location assumed until the host reports one.
pub const DEFAULT_LOCATION: &str = "http://localhost/";

/// Header carrying the framework version of the serving build.
pub const VERSION_HEADER: &str = "X-Lurepl-Playground";

/// A response synthesized from a client module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedAsset {
    /// Bundle-relative path of the module.
    pub path: String,
    /// Response body.
    pub body: String,
    /// Response headers, in order.
    pub headers: Vec<(String, String)>,
}

/// Serves the client modules of the last completed build.
#[derive(Debug, Clone)]
pub struct AssetInterceptor {
    location: Url,
    modules: Vec<ModuleOutput>,
    version: String,
}

impl Default for AssetInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetInterceptor {
    /// Creates an interceptor with no modules at the default location.
    pub fn new() -> Self {
        Self {
            location: default_location(),
            modules: Vec::new(),
            version: String::new(),
        }
    }

    /// Tracked iframe location.
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Updates the tracked iframe location.
    pub fn set_location(&mut self, location: &str) -> Result<()> {
        self.location = Url::parse(location)
            .map_err(|e| ReplError::Protocol(format!("invalid location \"{}\": {}", location, e)))?;
        Ok(())
    }

    /// Replaces the served modules after a completed build.
    pub fn replace_modules(&mut self, modules: Vec<ModuleOutput>, version: impl Into<String>) {
        self.modules = modules;
        self.version = version.into();
    }

    /// Modules currently served.
    pub fn modules(&self) -> &[ModuleOutput] {
        &self.modules
    }

    /// Answers `request_url` from memory, or `None` to fall through.
    ///
    /// Relative request URLs are resolved against the tracked location.
    pub fn intercept(&self, request_url: &str) -> Option<InterceptedAsset> {
        let request = self.location.join(request_url).ok()?;
        let module = self.modules.iter().find(|module| {
            request
                .join(&format!("./{}", module.path))
                .map(|candidate| candidate.path() == request.path())
                .unwrap_or(false)
        })?;

        tracing::trace!("intercepted {} -> {}", request, module.path);
        Some(InterceptedAsset {
            path: module.path.clone(),
            body: module.code.clone(),
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "application/javascript; charset=utf-8".to_string(),
                ),
                ("Cache-Control".to_string(), "no-store".to_string()),
                (VERSION_HEADER.to_string(), self.version.clone()),
            ],
        })
    }
}

lazy_static! {
    static ref DEFAULT_URL: Url = Url::parse(DEFAULT_LOCATION).unwrap();
}

fn default_location() -> Url {
    DEFAULT_URL.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interceptor() -> AssetInterceptor {
        let mut interceptor = AssetInterceptor::new();
        interceptor.replace_modules(
            vec![
                ModuleOutput::new("q-aaaa1111.lua", "return 1", true),
                ModuleOutput::new("q-bbbb2222.lua", "return 2", true),
            ],
            "0.4.0",
        );
        interceptor
    }

    #[test]
    fn serves_modules_with_headers() {
        let asset = interceptor().intercept("http://localhost/build/q-aaaa1111.lua").unwrap();
        assert_eq!(asset.body, "return 1");
        assert_eq!(
            asset.headers,
            vec![
                ("Content-Type".to_string(), "application/javascript; charset=utf-8".to_string()),
                ("Cache-Control".to_string(), "no-store".to_string()),
                ("X-Lurepl-Playground".to_string(), "0.4.0".to_string()),
            ]
        );
    }

    #[test]
    fn relative_requests_resolve_against_location() {
        let mut interceptor = interceptor();
        interceptor.set_location("http://localhost:3000/repl/frame/").unwrap();
        let asset = interceptor.intercept("q-bbbb2222.lua").unwrap();
        assert_eq!(asset.path, "q-bbbb2222.lua");
        assert_eq!(interceptor.location().as_str(), "http://localhost:3000/repl/frame/");
    }

    #[test]
    fn unknown_paths_fall_through() {
        let interceptor = interceptor();
        assert!(interceptor.intercept("http://localhost/build/q-cccc3333.lua").is_none());
        assert!(interceptor.intercept("http://localhost/build/").is_none());
        assert!(AssetInterceptor::new().intercept("http://localhost/q-aaaa1111.lua").is_none());
    }

    #[test]
    fn invalid_location_is_rejected() {
        let mut interceptor = AssetInterceptor::new();
        assert!(interceptor.set_location("not a url").is_err());
        assert_eq!(interceptor.location().as_str(), DEFAULT_LOCATION);
    }
}
