//! Configuration rules.
//!
//! A [`RuleSet`] is compiled once from raw rules and then matched against the
//! static facts of every resource. Matching yields an ordered list of
//! [`RuleEffect`]s: loaders tagged with their [`Enforce`] position, and
//! settings such as `type` or `parser`.
//!
//! ## Rule shape
//!
//! ```json
//! {
//!   "test": { "regex": "\\.css$" },
//!   "exclude": "/app/node_modules",
//!   "use": ["style-loader", { "loader": "css-loader", "options": { "modules": true } }],
//!   "enforce": "post",
//!   "parser": { "url": false }
//! }
//! ```
//!
//! Structured loader options are registered under an identity so requests can
//! reference them as `loader??ident` (see [`RuleSet::find_options_by_ident`]).
//! Options of any other JSON type do not stop the rule set from compiling; a
//! matching resource gets a [`RuleEffect::MalformedUse`] instead, which fails
//! only that resolution.

mod condition;
mod settings;

pub use condition::{check, Condition, RawCondition};
pub use settings::{merge_objects, Settings};

use crate::error::{Error, FactoryError};
use crate::request::{ident_to_loader_request, LoaderOptions, LoaderSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Loader position relative to inline loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforce {
    /// Runs before normal loaders (last in the chain).
    Pre,
    /// Default ordering (no enforcement).
    #[default]
    Normal,
    /// Runs after everything else (first in the chain).
    Post,
}

/// A single `use` entry as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawUseItem {
    /// `"loader?query"`, possibly several joined by `!`.
    Request(String),
    /// `{ "loader": .., "options": .., "ident": .. }`.
    Loader {
        loader: String,
        #[serde(default)]
        options: Option<Value>,
        #[serde(default)]
        ident: Option<String>,
    },
}

/// The `use` key: one entry or a list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawUse {
    One(RawUseItem),
    Many(Vec<RawUseItem>),
}

/// A rule as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRule {
    // Conditions
    pub test: Option<RawCondition>,
    pub include: Option<RawCondition>,
    pub exclude: Option<RawCondition>,
    pub resource: Option<RawCondition>,
    pub real_resource: Option<RawCondition>,
    pub resource_query: Option<RawCondition>,
    pub issuer: Option<RawCondition>,
    pub compiler: Option<RawCondition>,

    // Loaders
    pub loader: Option<String>,
    pub options: Option<Value>,
    #[serde(rename = "use")]
    pub uses: Option<RawUse>,
    pub enforce: Option<Enforce>,

    // Nesting
    pub rules: Vec<RawRule>,
    pub one_of: Vec<RawRule>,

    // Settings
    #[serde(rename = "type")]
    pub module_type: Option<String>,
    pub parser: Option<Value>,
    pub generator: Option<Value>,
    pub resolve: Option<Value>,
    pub side_effects: Option<Value>,
}

/// One outcome of a matching rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RuleEffect {
    /// Add a loader to the chain.
    Use { value: LoaderSpec, enforce: Enforce },
    /// Set (or merge into) a setting.
    Setting { key: String, value: Value },
    /// A loader whose options are neither a string nor an object.
    MalformedUse {
        loader: String,
        found: String,
        enforce: Enforce,
    },
}

/// Static facts a resource is matched on.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleFacts<'a> {
    /// Resource path (the match-resource when one was given).
    pub resource: &'a str,
    /// The actual resource path, without query.
    pub real_resource: &'a str,
    /// Resource query including the leading `?`.
    pub resource_query: &'a str,
    /// Path of the importing module.
    pub issuer: Option<&'a str>,
    /// Name of the compiler doing the import.
    pub compiler: Option<&'a str>,
}

#[derive(Debug, Clone)]
enum CompiledUse {
    Loader(LoaderSpec),
    Malformed { loader: String, found: &'static str },
}

#[derive(Debug, Clone)]
struct CompiledRule {
    resource: Option<Condition>,
    real_resource: Option<Condition>,
    resource_query: Option<Condition>,
    issuer: Option<Condition>,
    compiler: Option<Condition>,
    settings: Vec<(&'static str, Value)>,
    uses: Vec<CompiledUse>,
    enforce: Enforce,
    rules: Vec<CompiledRule>,
    one_of: Vec<CompiledRule>,
}

/// A compiled rule list.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    references: HashMap<String, Map<String, Value>>,
}

impl RuleSet {
    /// Compile raw rules in configuration order.
    pub fn new(rules: &[RawRule]) -> Result<Self, Error> {
        let mut references = HashMap::new();
        let rules = compile_rules(rules, "ref-", &mut references)?;
        Ok(Self { rules, references })
    }

    /// Match a resource, returning effects in configuration order.
    #[must_use]
    pub fn exec(&self, facts: &RuleFacts<'_>) -> Vec<RuleEffect> {
        let mut effects = Vec::new();
        for rule in &self.rules {
            run_rule(rule, facts, &mut effects);
        }
        effects
    }

    /// Structured options registered under `ident`.
    pub fn find_options_by_ident(&self, ident: &str) -> Result<&Map<String, Value>, FactoryError> {
        self.references
            .get(ident)
            .ok_or_else(|| FactoryError::OptionLookup {
                ident: ident.to_string(),
            })
    }

    /// Number of top-level rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Rules every configuration starts from.
///
/// Everything is `javascript/auto` unless the extension says otherwise.
#[must_use]
pub fn default_rules() -> Vec<RawRule> {
    vec![
        RawRule {
            module_type: Some("javascript/auto".to_string()),
            resolve: Some(json!({})),
            ..RawRule::default()
        },
        RawRule {
            test: Some(RawCondition::regex(r"(?i)\.mjs$")),
            module_type: Some("javascript/esm".to_string()),
            resolve: Some(json!({ "mainFields": ["browser", "main"] })),
            ..RawRule::default()
        },
        RawRule {
            test: Some(RawCondition::regex(r"(?i)\.json$")),
            module_type: Some("json".to_string()),
            ..RawRule::default()
        },
        RawRule {
            test: Some(RawCondition::regex(r"(?i)\.wasm$")),
            module_type: Some("webassembly/experimental".to_string()),
            ..RawRule::default()
        },
    ]
}

fn compile_rules(
    rules: &[RawRule],
    ident: &str,
    references: &mut HashMap<String, Map<String, Value>>,
) -> Result<Vec<CompiledRule>, Error> {
    rules
        .iter()
        .enumerate()
        .map(|(idx, rule)| compile_rule(rule, &format!("{ident}-{idx}"), references))
        .collect()
}

fn compile_rule(
    raw: &RawRule,
    ident: &str,
    references: &mut HashMap<String, Map<String, Value>>,
) -> Result<CompiledRule, Error> {
    let compile = |c: &Option<RawCondition>| c.as_ref().map(Condition::compile).transpose();

    // `test`, `include`, `exclude` and `resource` all constrain the resource.
    let mut resource = Vec::new();
    for cond in [&raw.test, &raw.include, &raw.resource] {
        if let Some(cond) = compile(cond)? {
            resource.push(cond);
        }
    }
    if let Some(cond) = compile(&raw.exclude)? {
        resource.push(Condition::Not(Box::new(cond)));
    }
    let resource = match resource.len() {
        0 => None,
        1 => resource.pop(),
        _ => Some(Condition::All(resource)),
    };

    let mut settings = Vec::new();
    if let Some(module_type) = &raw.module_type {
        settings.push(("type", Value::String(module_type.clone())));
    }
    for (key, value) in [
        ("parser", &raw.parser),
        ("generator", &raw.generator),
        ("resolve", &raw.resolve),
        ("sideEffects", &raw.side_effects),
    ] {
        if let Some(value) = value {
            settings.push((key, value.clone()));
        }
    }

    let uses = match (&raw.loader, &raw.uses) {
        (Some(_), Some(_)) => {
            return Err(Error::InvalidRule {
                ident: ident.to_string(),
                message: "`loader` and `use` cannot be combined".to_string(),
            });
        }
        (None, _) if raw.options.is_some() => {
            return Err(Error::InvalidRule {
                ident: ident.to_string(),
                message: "`options` requires `loader`".to_string(),
            });
        }
        (Some(loader), None) => {
            let item = RawUseItem::Loader {
                loader: loader.clone(),
                options: raw.options.clone(),
                ident: None,
            };
            compile_use_item(&item, ident)
        }
        (None, Some(RawUse::One(item))) => compile_use_item(item, ident),
        (None, Some(RawUse::Many(items))) => items
            .iter()
            .enumerate()
            .flat_map(|(idx, item)| compile_use_item(item, &format!("{ident}-{idx}")))
            .collect(),
        (None, None) => Vec::new(),
    };

    for spec in &uses {
        if let CompiledUse::Loader(LoaderSpec {
            options: LoaderOptions::Structured(options),
            ident: Some(ident),
            ..
        }) = spec
        {
            references.insert(ident.clone(), options.clone());
        }
    }

    Ok(CompiledRule {
        resource,
        real_resource: compile(&raw.real_resource)?,
        resource_query: compile(&raw.resource_query)?,
        issuer: compile(&raw.issuer)?,
        compiler: compile(&raw.compiler)?,
        settings,
        uses,
        enforce: raw.enforce.unwrap_or_default(),
        rules: compile_rules(&raw.rules, &format!("{ident}-rules"), references)?,
        one_of: compile_rules(&raw.one_of, &format!("{ident}-oneOf"), references)?,
    })
}

fn compile_use_item(item: &RawUseItem, ident: &str) -> Vec<CompiledUse> {
    match item {
        RawUseItem::Request(request) => request
            .split('!')
            .filter(|s| !s.is_empty())
            .map(|segment| CompiledUse::Loader(ident_to_loader_request(segment)))
            .collect(),
        RawUseItem::Loader {
            loader,
            options,
            ident: explicit,
        } => {
            let options = match loader_options(options.as_ref()) {
                Ok(options) => options,
                Err(found) => {
                    return vec![CompiledUse::Malformed {
                        loader: loader.clone(),
                        found,
                    }];
                }
            };
            let mut spec = LoaderSpec::new(loader.clone());
            if let LoaderOptions::Structured(map) = &options {
                let own = map.get("ident").and_then(Value::as_str).map(str::to_string);
                spec.ident = Some(explicit.clone().or(own).unwrap_or_else(|| ident.to_string()));
            }
            spec.options = options;
            vec![CompiledUse::Loader(spec)]
        }
    }
}

/// Options as written, or the JSON kind that made them unusable.
fn loader_options(options: Option<&Value>) -> Result<LoaderOptions, &'static str> {
    match options {
        None | Some(Value::Null) => Ok(LoaderOptions::None),
        Some(Value::String(s)) if s.is_empty() => Ok(LoaderOptions::None),
        Some(Value::String(s)) => Ok(LoaderOptions::Inline(s.clone())),
        Some(Value::Object(map)) => Ok(LoaderOptions::Structured(map.clone())),
        Some(other) => Err(json_kind(other)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn run_rule(rule: &CompiledRule, facts: &RuleFacts<'_>, effects: &mut Vec<RuleEffect>) -> bool {
    let passes = check(rule.resource.as_ref(), Some(facts.resource))
        && check(rule.real_resource.as_ref(), Some(facts.real_resource))
        && check(rule.resource_query.as_ref(), Some(facts.resource_query))
        && check(rule.compiler.as_ref(), facts.compiler)
        && check(rule.issuer.as_ref(), facts.issuer);
    if !passes {
        return false;
    }

    for (key, value) in &rule.settings {
        effects.push(RuleEffect::Setting {
            key: (*key).to_string(),
            value: value.clone(),
        });
    }

    for compiled in &rule.uses {
        effects.push(match compiled {
            CompiledUse::Loader(spec) => RuleEffect::Use {
                value: spec.clone(),
                enforce: rule.enforce,
            },
            CompiledUse::Malformed { loader, found } => RuleEffect::MalformedUse {
                loader: loader.clone(),
                found: (*found).to_string(),
                enforce: rule.enforce,
            },
        });
    }

    for nested in &rule.rules {
        run_rule(nested, facts, effects);
    }

    for branch in &rule.one_of {
        if run_rule(branch, facts, effects) {
            break;
        }
    }

    true
}
