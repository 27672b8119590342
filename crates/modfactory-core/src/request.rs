//! Request specifier parsing.
//!
//! A raw request carries an optional match-resource override, inline loaders,
//! and the resource itself:
//!
//! ```text
//! ./virtual.css!=!-!style-loader!css-loader?modules!./button.js?raw
//! └ match-resource ┘└┤└──── inline loaders ───────┘ └─ resource ─┘
//!                    suppression prefix
//! ```
//!
//! | prefix | pre    | normal | post   |
//! |--------|--------|--------|--------|
//! | none   | kept   | kept   | kept   |
//! | `!`    | dropped| dropped| kept   |
//! | `-!`   | dropped| dropped| kept   |
//! | `!!`   | dropped| dropped| dropped|

use modfactory_util::hash::canonical_json;
use modfactory_util::path;
use serde::Serialize;
use serde_json::{Map, Value};

/// Options attached to a loader.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum LoaderOptions {
    /// No options.
    #[default]
    None,
    /// Query-string options written inline (`loader?foo=bar`).
    Inline(String),
    /// Structured options from configuration.
    Structured(Map<String, Value>),
}

impl LoaderOptions {
    /// Whether any options are present.
    #[must_use]
    pub fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Options as a JSON value (`null` when absent).
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Inline(s) => Value::String(s.clone()),
            Self::Structured(map) => Value::Object(map.clone()),
        }
    }
}

/// A loader as written in a request or a rule, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoaderSpec {
    /// Loader name or path.
    pub identifier: String,
    /// Options carried literally.
    pub options: LoaderOptions,
    /// Identity of structured options registered by a rule.
    ///
    /// Set alone (with `options` empty) when a request references options by
    /// identity (`loader??ident`) and they still need to be looked up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
}

impl LoaderSpec {
    /// A loader without options.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            options: LoaderOptions::None,
            ident: None,
        }
    }

    /// Attach options.
    #[must_use]
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach an options identity.
    #[must_use]
    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    /// Whether the options still have to be looked up by identity.
    #[must_use]
    pub fn needs_options_lookup(&self) -> bool {
        self.ident.is_some() && !self.options.is_some()
    }

    /// Request form of this loader (`loader`, `loader?query`, `loader??ident`).
    #[must_use]
    pub fn to_ident(&self) -> String {
        if self.needs_options_lookup() {
            if let Some(ident) = &self.ident {
                return format!("{}??{}", self.identifier, ident);
            }
        }
        loader_ident(&self.identifier, &self.options, self.ident.as_deref())
    }
}

/// A loader after the delegate resolved it to an absolute path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLoader {
    /// Absolute loader path.
    pub loader: String,
    /// Options the loader runs with.
    pub options: LoaderOptions,
    /// Identity of structured options, if they have one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
}

impl ResolvedLoader {
    /// Request form of this loader, used in compound requests.
    #[must_use]
    pub fn to_ident(&self) -> String {
        loader_ident(&self.loader, &self.options, self.ident.as_deref())
    }
}

/// Format a loader and its options as a request segment.
///
/// Structured options with an identity are referenced (`??ident`) rather than
/// serialized, so the segment stays short and stable.
#[must_use]
pub fn loader_ident(loader: &str, options: &LoaderOptions, ident: Option<&str>) -> String {
    match (options, ident) {
        (LoaderOptions::None, _) => loader.to_string(),
        (LoaderOptions::Inline(query), _) => format!("{loader}?{query}"),
        (LoaderOptions::Structured(_), Some(ident)) => format!("{loader}??{ident}"),
        (LoaderOptions::Structured(map), None) => {
            format!("{loader}?{}", canonical_json(&Value::Object(map.clone())))
        }
    }
}

/// Split `loader?options` at the first `?`.
///
/// An empty options segment counts as no options. Options starting with a
/// second `?` are an identity reference.
#[must_use]
pub fn ident_to_loader_request(segment: &str) -> LoaderSpec {
    let Some((identifier, options)) = segment.split_once('?') else {
        return LoaderSpec::new(segment);
    };

    let spec = LoaderSpec::new(identifier);
    if let Some(ident) = options.strip_prefix('?') {
        spec.with_ident(ident)
    } else if options.is_empty() {
        spec
    } else {
        spec.with_options(LoaderOptions::Inline(options.to_string()))
    }
}

/// A raw request broken into its parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRequest {
    /// Path used for rule matching in place of the resource.
    pub match_resource: Option<String>,
    /// Inline loaders in request order.
    pub inline_loaders: Vec<LoaderSpec>,
    /// The resource request (may carry a query).
    pub resource: String,
    /// Drop `enforce: "pre"` rule loaders.
    pub suppress_pre: bool,
    /// Drop rule loaders without `enforce`.
    pub suppress_normal: bool,
    /// Drop `enforce: "post"` rule loaders.
    pub suppress_post: bool,
}

impl ParsedRequest {
    /// Re-serialize into request syntax.
    ///
    /// Parsing the result yields an equivalent request. A relative
    /// match-resource comes back joined with the context it was parsed in.
    #[must_use]
    pub fn to_request(&self) -> String {
        let mut out = String::new();
        if let Some(match_resource) = &self.match_resource {
            out.push_str(match_resource);
            out.push_str("!=!");
        }
        if self.suppress_post {
            out.push_str("!!");
        } else if self.suppress_pre || self.suppress_normal {
            out.push('!');
        }
        for loader in &self.inline_loaders {
            out.push_str(&loader.to_ident());
            out.push('!');
        }
        out.push_str(&self.resource);
        out
    }
}

/// Parse a raw request issued from `context`.
///
/// Never fails: every string is a valid request, possibly with an empty
/// resource.
#[must_use]
pub fn parse(context: &str, raw: &str) -> ParsedRequest {
    let (match_resource, rest) = match split_match_resource(raw) {
        Some((prefix, rest)) => {
            let resolved = if path::is_relative(prefix) {
                path::join(context, prefix)
            } else {
                prefix.to_string()
            };
            (Some(resolved), rest)
        }
        None => (None, raw),
    };

    let suppress_all = rest.starts_with("!!");
    let suppress_auto = rest.starts_with('!') || rest.starts_with("-!");

    let stripped = rest
        .strip_prefix('-')
        .filter(|r| r.starts_with('!'))
        .unwrap_or(rest)
        .trim_start_matches('!');

    // `a!!b` behaves like `a!b`; only a trailing empty resource survives.
    let mut segments: Vec<&str> = stripped.split('!').collect();
    let resource = segments.pop().unwrap_or_default().to_string();
    segments.retain(|s| !s.is_empty());

    ParsedRequest {
        match_resource,
        inline_loaders: segments.into_iter().map(ident_to_loader_request).collect(),
        resource,
        suppress_pre: suppress_auto,
        suppress_normal: suppress_auto,
        suppress_post: suppress_all,
    }
}

/// Match `^([^!]+)!=!` and return the prefix and the remainder.
fn split_match_resource(raw: &str) -> Option<(&str, &str)> {
    let bang = raw.find('!')?;
    if bang == 0 {
        return None;
    }
    let rest = raw[bang..].strip_prefix("!=!")?;
    Some((&raw[..bang], rest))
}

/// Split a resource at its first `?` into path and query (query keeps the `?`).
#[must_use]
pub fn split_query(resource: &str) -> (&str, &str) {
    match resource.find('?') {
        Some(idx) => (&resource[..idx], &resource[idx..]),
        None => (resource, ""),
    }
}
