//! Filesystem resolution delegate.
//!
//! Resolves requests to absolute file paths.
//!
//! ## Request Types
//!
//! - Relative: `./utils`, `../lib/foo`
//! - Absolute: `/abs/path/to/module`
//! - Bare: `lodash`, `@scope/pkg`, `css-loader/dist/cjs.js`
//!
//! A `?query` is split off before the lookup and re-attached to the result.
//!
//! ## Options
//!
//! The `resolve` setting is read as:
//!
//! - `extensions`: suffixes to try (`[".wasm", ".mjs", ".js", ".json"]`)
//! - `mainFields`: package.json entry fields (`["browser", "module", "main"]`)
//! - `alias`: `{ "name": "./replacement" | false }`
//! - `aliasFields`: `["browser"]` honors package.json `browser` maps
//!
//! Loaders use `[".js"]` and `["loader", "main"]` and no alias fields.
//!
//! Lookups are blocking filesystem I/O, so the async entry point runs it on
//! tokio's blocking pool. Clones share one memo cache.

use super::{ContextInfo, Resolution, ResolutionDelegate, ResolverKind};
use crate::error::ResolutionError;
use crate::request::split_query;
use async_trait::async_trait;
use modfactory_util::hash::canonical_json;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

const NORMAL_EXTENSIONS: &[&str] = &[".wasm", ".mjs", ".js", ".json"];
const NORMAL_MAIN_FIELDS: &[&str] = &["browser", "module", "main"];
const NORMAL_ALIAS_FIELDS: &[&str] = &["browser"];
const LOADER_EXTENSIONS: &[&str] = &[".js"];
const LOADER_MAIN_FIELDS: &[&str] = &["loader", "main"];

/// Lookup settings derived from resolve options.
#[derive(Debug, Clone)]
struct Lookup {
    extensions: Vec<String>,
    main_fields: Vec<String>,
    alias: Vec<(String, Value)>,
    browser_field: bool,
}

impl Lookup {
    fn new(kind: ResolverKind, options: &Value) -> Self {
        let strings = |key: &str, fallback: &[&str]| -> Vec<String> {
            match options.get(key).and_then(Value::as_array) {
                Some(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                None => fallback.iter().map(|s| (*s).to_string()).collect(),
            }
        };

        let (extensions, main_fields, alias_fields) = match kind {
            ResolverKind::Loader => (LOADER_EXTENSIONS, LOADER_MAIN_FIELDS, &[][..]),
            ResolverKind::Normal => (NORMAL_EXTENSIONS, NORMAL_MAIN_FIELDS, NORMAL_ALIAS_FIELDS),
        };

        let alias = options
            .get("alias")
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Self {
            extensions: strings("extensions", extensions),
            main_fields: strings("mainFields", main_fields),
            alias,
            browser_field: strings("aliasFields", alias_fields)
                .iter()
                .any(|f| f == "browser"),
        }
    }
}

/// A resolved file, before the query is re-attached.
#[derive(Debug, Clone)]
enum Found {
    File(PathBuf),
    Ignored,
}

type CacheKey = (ResolverKind, String, String, String);

/// Filesystem-backed [`ResolutionDelegate`].
#[derive(Debug, Default, Clone)]
pub struct FsResolver {
    /// Cached resolutions for performance.
    cache: Arc<RwLock<HashMap<CacheKey, Resolution>>>,
}

impl FsResolver {
    /// Create a new resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoized resolutions.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Resolve synchronously. Failures are not cached.
    pub fn resolve_sync(
        &self,
        kind: ResolverKind,
        context: &str,
        request: &str,
        options: &Value,
    ) -> Result<Resolution, ResolutionError> {
        let key = (
            kind,
            context.to_string(),
            request.to_string(),
            canonical_json(options),
        );
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(cached.clone());
        }

        let (path, query) = split_query(request);
        let lookup = Lookup::new(kind, options);
        let found = self
            .resolve_request(Path::new(context), path, &lookup)
            .map_err(|message| ResolutionError::new(request, context, message))?;

        let resolution = match found {
            Found::Ignored => Resolution::Ignored,
            Found::File(file) => {
                let file = file.display().to_string();
                let mut data = json!({ "path": file, "query": query });
                if let Some(pkg) = Path::new(&file).parent().and_then(find_description_file) {
                    data["descriptionFilePath"] = json!(pkg.display().to_string());
                }
                Resolution::Resolved {
                    path: format!("{file}{query}"),
                    data: Some(data),
                }
            }
        };

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, resolution.clone());

        Ok(resolution)
    }

    fn resolve_request(&self, context: &Path, request: &str, lookup: &Lookup) -> Result<Found, String> {
        if let Some(target) = apply_alias(&lookup.alias, request) {
            return match target {
                Some(aliased) => self.resolve_target(context, &aliased, lookup),
                None => Ok(Found::Ignored),
            };
        }

        if lookup.browser_field && is_bare(request) {
            if let Some(pkg) = find_description_file(context) {
                if browser_map_ignores(&pkg, request) {
                    return Ok(Found::Ignored);
                }
            }
        }

        self.resolve_target(context, request, lookup)
    }

    fn resolve_target(&self, context: &Path, request: &str, lookup: &Lookup) -> Result<Found, String> {
        // Handle relative requests
        if request.starts_with("./") || request.starts_with("../") || request == "." || request == ".." {
            return self.resolve_path(&context.join(request), lookup);
        }

        // Handle absolute requests
        if Path::new(request).is_absolute() {
            return self.resolve_path(Path::new(request), lookup);
        }

        // Handle bare requests (node_modules)
        self.resolve_bare(context, request, lookup)
    }

    /// Resolve a bare request by walking up looking for `node_modules`.
    fn resolve_bare(&self, context: &Path, request: &str, lookup: &Lookup) -> Result<Found, String> {
        let (name, subpath) = parse_bare_specifier(request);

        let mut current = Some(context);
        while let Some(dir) = current {
            let pkg_dir = dir.join("node_modules").join(&name);

            if pkg_dir.is_dir() {
                if let Some(exports) =
                    read_package(&pkg_dir.join("package.json")).and_then(|p| p.get("exports").cloned())
                {
                    let key = subpath
                        .as_ref()
                        .map_or_else(|| ".".to_string(), |sub| format!("./{sub}"));
                    if let Some(entry) = resolve_exports(&exports, &key) {
                        let target = pkg_dir.join(entry);
                        if target.is_file() {
                            return self.found(&target, lookup);
                        }
                    }
                }

                let target = match &subpath {
                    Some(sub) => pkg_dir.join(sub),
                    None => pkg_dir.clone(),
                };
                if let Ok(found) = self.resolve_path(&target, lookup) {
                    return Ok(found);
                }
            }

            current = dir.parent();
        }

        Err(format!("Cannot find package '{name}' in node_modules"))
    }

    /// Resolve a path that might be a file or directory.
    fn resolve_path(&self, target: &Path, lookup: &Lookup) -> Result<Found, String> {
        if let Some(file) = find_file(target, lookup) {
            return self.found(&file, lookup);
        }

        if target.is_dir() {
            if let Some(pkg) = read_package(&target.join("package.json")) {
                for field in &lookup.main_fields {
                    let Some(entry) = pkg.get(field).and_then(Value::as_str) else {
                        continue;
                    };
                    let entry = target.join(entry);
                    if let Some(file) =
                        find_file(&entry, lookup).or_else(|| find_file(&entry.join("index"), lookup))
                    {
                        return self.found(&file, lookup);
                    }
                }
            }

            if let Some(file) = find_file(&target.join("index"), lookup) {
                return self.found(&file, lookup);
            }
        }

        Err("File not found".to_string())
    }

    fn found(&self, file: &Path, lookup: &Lookup) -> Result<Found, String> {
        let file = dunce::canonicalize(file).map_err(|e| e.to_string())?;

        if lookup.browser_field {
            if let Some(pkg) = file.parent().and_then(find_description_file) {
                if browser_map_ignores_file(&pkg, &file) {
                    return Ok(Found::Ignored);
                }
            }
        }

        trace!(path = %file.display(), "resolved");
        Ok(Found::File(file))
    }
}

#[async_trait]
impl ResolutionDelegate for FsResolver {
    async fn resolve(
        &self,
        kind: ResolverKind,
        _info: &ContextInfo,
        context: &str,
        request: &str,
        options: &Value,
    ) -> Result<Resolution, ResolutionError> {
        let this = self.clone();
        let (owned_context, owned_request, options) =
            (context.to_string(), request.to_string(), options.clone());
        tokio::task::spawn_blocking(move || {
            this.resolve_sync(kind, &owned_context, &owned_request, &options)
        })
        .await
        .map_err(|e| ResolutionError::new(request, context, e.to_string()))?
    }
}

fn find_file(target: &Path, lookup: &Lookup) -> Option<PathBuf> {
    if target.is_file() {
        return Some(target.to_path_buf());
    }
    lookup
        .extensions
        .iter()
        .map(|ext| PathBuf::from(format!("{}{}", target.display(), ext)))
        .find(|candidate| candidate.is_file())
}

fn is_bare(request: &str) -> bool {
    !request.starts_with('.') && !Path::new(request).is_absolute()
}

/// `Some(Some(target))` to rewrite, `Some(None)` to ignore, `None` when no
/// alias applies.
fn apply_alias(alias: &[(String, Value)], request: &str) -> Option<Option<String>> {
    for (name, target) in alias {
        let rest = if request == name {
            ""
        } else if let Some(rest) = request
            .strip_prefix(name.as_str())
            .filter(|rest| rest.starts_with('/'))
        {
            rest
        } else {
            continue;
        };

        return match target {
            Value::String(target) => Some(Some(format!("{target}{rest}"))),
            Value::Bool(false) => Some(None),
            _ => None,
        };
    }
    None
}

/// Parse a bare specifier into package name and subpath.
fn parse_bare_specifier(specifier: &str) -> (String, Option<String>) {
    let split = if specifier.starts_with('@') { 3 } else { 2 };
    let parts: Vec<&str> = specifier.splitn(split, '/').collect();

    if split == 3 && parts.len() >= 2 {
        let subpath = parts.get(2).map(|s| (*s).to_string());
        (format!("{}/{}", parts[0], parts[1]), subpath)
    } else if split == 2 {
        (parts[0].to_string(), parts.get(1).map(|s| (*s).to_string()))
    } else {
        (specifier.to_string(), None)
    }
}

fn read_package(path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Nearest `package.json` at or above `dir`.
fn find_description_file(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|d| d.join("package.json"))
        .find(|p| p.is_file())
}

/// Whether the package's `browser` map sends a module name to `false`.
fn browser_map_ignores(pkg: &Path, request: &str) -> bool {
    read_package(pkg)
        .and_then(|p| p.get("browser").and_then(|b| b.get(request)).cloned())
        .is_some_and(|v| v == Value::Bool(false))
}

/// Whether the package's `browser` map sends one of its own files to `false`.
fn browser_map_ignores_file(pkg: &Path, file: &Path) -> bool {
    let Some(root) = pkg.parent() else {
        return false;
    };
    let Some(Value::Object(map)) = read_package(pkg).and_then(|p| p.get("browser").cloned()) else {
        return false;
    };

    map.iter()
        .filter(|(key, value)| key.starts_with('.') && **value == Value::Bool(false))
        .any(|(key, _)| {
            let mapped = root.join(key);
            mapped == file || dunce::canonicalize(&mapped).is_ok_and(|p| p == file)
        })
}

/// Resolve exports field (simplified).
fn resolve_exports(exports: &Value, subpath: &str) -> Option<String> {
    match exports {
        Value::String(s) if subpath == "." => Some(s.clone()),
        Value::Object(map) => {
            // Check for exact subpath match
            if let Some(value) = map.get(subpath) {
                return resolve_export_value(value);
            }
            // Check for conditional exports at root
            if subpath == "." && !map.keys().any(|k| k.starts_with('.')) {
                return resolve_export_value(exports);
            }
            None
        }
        _ => None,
    }
}

/// Resolve a single export value (handles conditions).
fn resolve_export_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["browser", "import", "default", "require"]
            .iter()
            .find_map(|condition| map.get(*condition).and_then(resolve_export_value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn root(dir: &tempfile::TempDir) -> PathBuf {
        dunce::canonicalize(dir.path()).unwrap()
    }

    fn resolve(resolver: &FsResolver, kind: ResolverKind, context: &Path, request: &str) -> Resolution {
        resolver
            .resolve_sync(kind, &context.display().to_string(), request, &json!({}))
            .unwrap()
    }

    fn path_of(resolution: Resolution) -> String {
        match resolution {
            Resolution::Resolved { path, .. } => path,
            Resolution::Ignored => panic!("expected a resolved path"),
        }
    }

    #[tokio::test]
    async fn test_async_resolve_shares_cache_with_clones() {
        let dir = tempdir().unwrap();
        let base = root(&dir);
        fs::write(base.join("a.js"), "").unwrap();
        let context = base.display().to_string();

        let resolver = FsResolver::new();
        let handle = resolver.clone();
        let resolution = handle
            .resolve(ResolverKind::Normal, &ContextInfo::default(), &context, "./a.js", &json!({}))
            .await
            .unwrap();
        assert_eq!(path_of(resolution), base.join("a.js").display().to_string());
        assert_eq!(resolver.cached(), 1);

        let err = resolver
            .resolve(ResolverKind::Normal, &ContextInfo::default(), &context, "./b.js", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.request, "./b.js");
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_parse_bare_specifier() {
        assert_eq!(parse_bare_specifier("lodash"), ("lodash".to_string(), None));
        assert_eq!(
            parse_bare_specifier("lodash/get"),
            ("lodash".to_string(), Some("get".to_string()))
        );
        assert_eq!(parse_bare_specifier("@types/node"), ("@types/node".to_string(), None));
        assert_eq!(
            parse_bare_specifier("@babel/core/lib/parse"),
            ("@babel/core".to_string(), Some("lib/parse".to_string()))
        );
    }

    #[test]
    fn test_resolve_relative_with_extension_and_query() {
        let dir = tempdir().unwrap();
        let src = root(&dir).join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("utils.js"), "export const x = 1;").unwrap();

        let resolver = FsResolver::new();
        let resolution = resolve(&resolver, ResolverKind::Normal, &src, "./utils?raw");
        match resolution {
            Resolution::Resolved { path, data } => {
                assert_eq!(path, format!("{}?raw", src.join("utils.js").display()));
                assert_eq!(data.unwrap()["query"], json!("?raw"));
            }
            Resolution::Ignored => panic!("unexpected ignore"),
        }
    }

    #[test]
    fn test_resolve_directory_index() {
        let dir = tempdir().unwrap();
        let lib = root(&dir).join("lib");
        fs::create_dir(&lib).unwrap();
        fs::write(lib.join("index.js"), "").unwrap();

        let resolver = FsResolver::new();
        let path = path_of(resolve(&resolver, ResolverKind::Normal, &root(&dir), "./lib"));
        assert!(path.ends_with("index.js"));
    }

    #[test]
    fn test_resolve_bare_package_main_and_exports() {
        let dir = tempdir().unwrap();
        let base = root(&dir);
        let nested = base.join("src/deep");
        fs::create_dir_all(&nested).unwrap();

        let main_pkg = base.join("node_modules/plain");
        fs::create_dir_all(main_pkg.join("lib")).unwrap();
        fs::write(main_pkg.join("package.json"), r#"{"main": "lib/entry.js"}"#).unwrap();
        fs::write(main_pkg.join("lib/entry.js"), "").unwrap();

        let exports_pkg = base.join("node_modules/@scope/exp");
        fs::create_dir_all(exports_pkg.join("dist")).unwrap();
        fs::write(
            exports_pkg.join("package.json"),
            r#"{"exports": {".": {"import": "./dist/index.mjs"}, "./util": "./dist/util.js"}}"#,
        )
        .unwrap();
        fs::write(exports_pkg.join("dist/index.mjs"), "").unwrap();
        fs::write(exports_pkg.join("dist/util.js"), "").unwrap();

        let resolver = FsResolver::new();
        assert!(path_of(resolve(&resolver, ResolverKind::Normal, &nested, "plain")).ends_with("lib/entry.js"));
        assert!(path_of(resolve(&resolver, ResolverKind::Normal, &nested, "@scope/exp")).ends_with("dist/index.mjs"));
        assert!(path_of(resolve(&resolver, ResolverKind::Normal, &nested, "@scope/exp/util")).ends_with("dist/util.js"));
    }

    #[test]
    fn test_resolve_loader() {
        let dir = tempdir().unwrap();
        let base = root(&dir);
        let pkg = base.join("node_modules/css-loader");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("package.json"), r#"{"main": "index.js"}"#).unwrap();
        fs::write(pkg.join("index.js"), "").unwrap();

        let resolver = FsResolver::new();
        let path = path_of(resolve(&resolver, ResolverKind::Loader, &base, "css-loader"));
        assert_eq!(path, pkg.join("index.js").display().to_string());

        let err = resolver
            .resolve_sync(ResolverKind::Loader, &base.display().to_string(), "css", &json!({}))
            .unwrap_err();
        assert_eq!(err.message, "Cannot find package 'css' in node_modules");
    }

    #[test]
    fn test_browser_false_is_ignored() {
        let dir = tempdir().unwrap();
        let base = root(&dir);
        fs::write(base.join("package.json"), r#"{"browser": {"fs": false, "./server.js": false}}"#).unwrap();
        fs::write(base.join("server.js"), "").unwrap();

        let resolver = FsResolver::new();
        assert_eq!(resolve(&resolver, ResolverKind::Normal, &base, "fs"), Resolution::Ignored);
        assert_eq!(resolve(&resolver, ResolverKind::Normal, &base, "./server"), Resolution::Ignored);

        // Loaders do not honor browser maps.
        let err = resolver
            .resolve_sync(ResolverKind::Loader, &base.display().to_string(), "fs", &json!({}))
            .unwrap_err();
        assert!(err.message.contains("Cannot find package"));
    }

    #[test]
    fn test_alias_and_extensions_options() {
        let dir = tempdir().unwrap();
        let base = root(&dir);
        fs::create_dir(base.join("shims")).unwrap();
        fs::write(base.join("shims/path.ts"), "").unwrap();

        let resolver = FsResolver::new();
        let options = json!({
            "alias": {"path": "./shims/path", "crypto": false},
            "extensions": [".ts"]
        });
        let context = base.display().to_string();
        let path = path_of(resolver.resolve_sync(ResolverKind::Normal, &context, "path", &options).unwrap());
        assert!(path.ends_with("shims/path.ts"));
        assert_eq!(
            resolver.resolve_sync(ResolverKind::Normal, &context, "crypto", &options).unwrap(),
            Resolution::Ignored
        );
    }

    #[test]
    fn test_missing_file_is_not_cached() {
        let dir = tempdir().unwrap();
        let base = root(&dir);
        let context = base.display().to_string();

        let resolver = FsResolver::new();
        let err = resolver
            .resolve_sync(ResolverKind::Normal, &context, "./later", &json!({}))
            .unwrap_err();
        assert_eq!(err.to_string(), format!("Can't resolve './later' in '{context}': File not found"));
        assert_eq!(resolver.cached(), 0);

        fs::write(base.join("later.js"), "").unwrap();
        resolve(&resolver, ResolverKind::Normal, &base, "./later");
        assert_eq!(resolver.cached(), 1);
    }
}
