//! Loader resolution.
//!
//! Resolves a list of [`LoaderSpec`]s to absolute loader paths. All loaders of
//! a list are resolved concurrently; the output keeps input order no matter
//! which delegate call finishes first.

use crate::error::{FactoryError, ResolutionError};
use crate::request::{split_query, LoaderOptions, LoaderSpec, ResolvedLoader};
use crate::resolve::{ContextInfo, Resolution, ResolutionDelegate, ResolverKind};
use crate::rules::RuleSet;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, trace};

const LOADER_SUFFIX: &str = "-loader";

/// Resolve `specs` from `context`, preserving order.
///
/// Options referenced by identity (`loader??ident`) are looked up in `rules`
/// before any delegate call. Every delegate call runs to completion; when
/// several fail, the error of the earliest loader in `specs` is returned.
pub async fn resolve_loaders(
    delegate: &dyn ResolutionDelegate,
    rules: &RuleSet,
    info: &ContextInfo,
    context: &str,
    specs: &[LoaderSpec],
    options: &Value,
) -> Result<Vec<ResolvedLoader>, FactoryError> {
    if specs.is_empty() {
        return Ok(Vec::new());
    }

    let specs = specs
        .iter()
        .map(|spec| with_referenced_options(rules, spec))
        .collect::<Result<Vec<_>, _>>()?;

    let results = join_all(
        specs
            .iter()
            .map(|spec| resolve_loader(delegate, info, context, spec, options)),
    )
    .await;

    let loaders = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    debug!(context, count = loaders.len(), "resolved loaders");
    Ok(loaders)
}

fn with_referenced_options(rules: &RuleSet, spec: &LoaderSpec) -> Result<LoaderSpec, FactoryError> {
    match &spec.ident {
        Some(ident) if spec.needs_options_lookup() => {
            let options = rules.find_options_by_ident(ident)?;
            Ok(spec
                .clone()
                .with_options(LoaderOptions::Structured(options.clone())))
        }
        _ => Ok(spec.clone()),
    }
}

async fn resolve_loader(
    delegate: &dyn ResolutionDelegate,
    info: &ContextInfo,
    context: &str,
    spec: &LoaderSpec,
    options: &Value,
) -> Result<ResolvedLoader, ResolutionError> {
    trace!(loader = %spec.identifier, "resolving loader");
    let resolution = delegate
        .resolve(ResolverKind::Loader, info, context, &spec.identifier, options)
        .await;

    let path = match resolution {
        Ok(Resolution::Resolved { path, .. }) => path,
        Ok(Resolution::Ignored) => {
            return Err(ResolutionError::new(
                &spec.identifier,
                context,
                "Loader resolved to an ignored module",
            ));
        }
        Err(err) => return Err(with_suffix_hint(delegate, info, context, spec, options, err).await),
    };

    // The delegate may hand back `path?query`; the loader's own options win.
    let (loader, query) = split_query(&path);
    let options = if spec.options.is_some() {
        spec.options.clone()
    } else {
        match query.strip_prefix('?') {
            Some(query) if !query.is_empty() => LoaderOptions::Inline(query.to_string()),
            _ => LoaderOptions::None,
        }
    };

    Ok(ResolvedLoader {
        loader: loader.to_string(),
        options,
        ident: spec.ident.clone(),
    })
}

/// Retry `name` as `name-loader`; when that resolves, explain the failure.
async fn with_suffix_hint(
    delegate: &dyn ResolutionDelegate,
    info: &ContextInfo,
    context: &str,
    spec: &LoaderSpec,
    options: &Value,
    mut err: ResolutionError,
) -> ResolutionError {
    let name = spec.identifier.as_str();
    if name.contains('/') || name.ends_with(LOADER_SUFFIX) {
        return err;
    }

    let suffixed = format!("{name}{LOADER_SUFFIX}");
    if let Ok(Resolution::Resolved { .. }) = delegate
        .resolve(ResolverKind::Loader, info, context, &suffixed, options)
        .await
    {
        err.message.push('\n');
        err.message.push_str(&suffix_hint(name));
    }
    err
}

fn suffix_hint(name: &str) -> String {
    format!(
        "BREAKING CHANGE: It's no longer allowed to omit the '-loader' suffix when using loaders.\n                 You need to specify '{name}-loader' instead of '{name}',\n                 see https://webpack.js.org/migrate/3/#automatic-loader-module-name-extension-removed"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RawRule;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Resolves known loader names after a per-name delay.
    struct Loaders {
        known: HashMap<&'static str, (&'static str, u64)>,
    }

    impl Loaders {
        fn new(known: &[(&'static str, &'static str, u64)]) -> Self {
            Self {
                known: known.iter().map(|(n, p, d)| (*n, (*p, *d))).collect(),
            }
        }
    }

    #[async_trait]
    impl ResolutionDelegate for Loaders {
        async fn resolve(
            &self,
            kind: ResolverKind,
            _info: &ContextInfo,
            context: &str,
            request: &str,
            _options: &Value,
        ) -> Result<Resolution, ResolutionError> {
            assert_eq!(kind, ResolverKind::Loader);
            match self.known.get(request) {
                Some((path, delay)) => {
                    tokio::time::sleep(Duration::from_millis(*delay)).await;
                    Ok(Resolution::resolved(*path))
                }
                None => Err(ResolutionError::new(request, context, "Module not found")),
            }
        }
    }

    async fn run(delegate: &Loaders, rules: &RuleSet, specs: &[LoaderSpec]) -> Result<Vec<ResolvedLoader>, FactoryError> {
        resolve_loaders(delegate, rules, &ContextInfo::default(), "/app", specs, &json!({})).await
    }

    #[tokio::test]
    async fn test_order_is_input_order() {
        let delegate = Loaders::new(&[("a", "/l/a.js", 30), ("b", "/l/b.js", 0), ("c", "/l/c.js", 15)]);
        let specs = [LoaderSpec::new("a"), LoaderSpec::new("b"), LoaderSpec::new("c")];

        let loaders = run(&delegate, &RuleSet::default(), &specs).await.unwrap();
        let paths: Vec<_> = loaders.iter().map(|l| l.loader.as_str()).collect();
        assert_eq!(paths, vec!["/l/a.js", "/l/b.js", "/l/c.js"]);
    }

    #[tokio::test]
    async fn test_first_error_in_request_order() {
        let delegate = Loaders::new(&[("ok", "/l/ok.js", 0)]);
        let specs = [LoaderSpec::new("ok"), LoaderSpec::new("x/first"), LoaderSpec::new("x/second")];

        let err = run(&delegate, &RuleSet::default(), &specs).await.unwrap_err();
        match err {
            FactoryError::Resolution(err) => assert_eq!(err.request, "x/first"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_from_delegate_becomes_options() {
        let delegate = Loaders::new(&[("q", "/l/q.js?mode=fast", 0)]);

        let loaders = run(&delegate, &RuleSet::default(), &[LoaderSpec::new("q")]).await.unwrap();
        assert_eq!(loaders[0].loader, "/l/q.js");
        assert_eq!(loaders[0].options, LoaderOptions::Inline("mode=fast".into()));

        let own = LoaderSpec::new("q").with_options(LoaderOptions::Inline("mine".into()));
        let loaders = run(&delegate, &RuleSet::default(), &[own]).await.unwrap();
        assert_eq!(loaders[0].options, LoaderOptions::Inline("mine".into()));
    }

    #[tokio::test]
    async fn test_missing_suffix_hint() {
        let delegate = Loaders::new(&[("css-loader", "/l/css.js", 0)]);

        let err = run(&delegate, &RuleSet::default(), &[LoaderSpec::new("css")]).await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Can't resolve 'css' in '/app': Module not found\n"));
        assert!(message.contains(
            "BREAKING CHANGE: It's no longer allowed to omit the '-loader' suffix when using loaders.\n                 You need to specify 'css-loader' instead of 'css',\n                 see https://webpack.js.org/migrate/3/#automatic-loader-module-name-extension-removed"
        ));
    }

    #[tokio::test]
    async fn test_no_hint_when_retry_fails_or_not_applicable() {
        let delegate = Loaders::new(&[("./x-loader", "/l/x.js", 0)]);
        for name in ["style", "./x", "style-loader"] {
            let err = run(&delegate, &RuleSet::default(), &[LoaderSpec::new(name)]).await.unwrap_err();
            assert!(!err.to_string().contains("BREAKING CHANGE"), "{name}");
        }
    }

    #[tokio::test]
    async fn test_options_reference_lookup() {
        let raw: Vec<RawRule> =
            serde_json::from_str(r#"[{"use": [{"loader": "babel-loader", "options": {"presets": ["env"]}}]}]"#).unwrap();
        let rules = RuleSet::new(&raw).unwrap();
        let delegate = Loaders::new(&[("babel-loader", "/l/babel.js", 0)]);

        let spec = LoaderSpec::new("babel-loader").with_ident("ref--0-0");
        let loaders = run(&delegate, &rules, &[spec]).await.unwrap();
        assert_eq!(loaders[0].ident.as_deref(), Some("ref--0-0"));
        assert_eq!(loaders[0].options.to_value(), json!({"presets": ["env"]}));
        assert_eq!(loaders[0].to_ident(), "/l/babel.js??ref--0-0");

        let missing = LoaderSpec::new("babel-loader").with_ident("ref--7");
        let err = run(&delegate, &rules, &[missing]).await.unwrap_err();
        assert_eq!(err.to_string(), "Can't find options with ident 'ref--7'");
    }
}
