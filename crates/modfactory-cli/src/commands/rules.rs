use super::{absolute, fail, print_json, w};
use miette::Result;
use modfactory_core::request::split_query;
use modfactory_core::rules::{Enforce, Settings};
use modfactory_core::{load_config, RuleEffect, RuleFacts, OUTPUT_SCHEMA_VERSION};
use std::io;
use std::path::Path;

/// Run the rules command.
///
/// Matches `path` (with an optional `?query`) against the configured rules
/// and prints the effects in the order the rules produced them. An explicit
/// `query` replaces the one on the path.
pub fn run(
    cwd: &Path,
    path: &str,
    query: Option<&str>,
    issuer: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = match load_config(cwd, config) {
        Ok(config) => config,
        Err(e) => return fail(e.code(), &e.to_string(), json),
    };
    let rules = match config.rule_set() {
        Ok(rules) => rules,
        Err(e) => return fail(e.code(), &e.to_string(), json),
    };

    let (resource, path_query) = split_query(path);
    let query = match query {
        Some(q) if q.is_empty() || q.starts_with('?') => q.to_string(),
        Some(q) => format!("?{q}"),
        None => path_query.to_string(),
    };
    let resource = absolute(cwd, Path::new(resource));
    let issuer = issuer.map(|issuer| absolute(cwd, issuer));
    let effects = rules.exec(&RuleFacts {
        resource: &resource,
        real_resource: &resource,
        resource_query: &query,
        issuer: issuer.as_deref(),
        compiler: None,
    });

    if json {
        print_json(&serde_json::json!({
            "ok": true,
            "schemaVersion": OUTPUT_SCHEMA_VERSION,
            "resource": resource,
            "resourceQuery": query,
            "effects": effects,
        }))
    } else {
        print_human(&resource, &effects)
    }
}

fn print_human(resource: &str, effects: &[RuleEffect]) -> Result<()> {
    let mut out = io::stdout().lock();
    w(&mut out, &format!("  Resource:       {resource}\n"))?;

    let mut settings = Settings::new();
    let mut loaders = Vec::new();
    for effect in effects {
        match effect {
            RuleEffect::Setting { key, value } => settings.apply(key, value.clone()),
            RuleEffect::Use { value, enforce } => loaders.push((*enforce, value.to_ident())),
            RuleEffect::MalformedUse {
                loader,
                found,
                enforce,
            } => loaders.push((*enforce, format!("{loader} (malformed options: {found})"))),
        }
    }

    if settings.is_empty() {
        w(&mut out, "  Settings:       (none)\n")?;
    } else {
        w(&mut out, "  Settings:\n")?;
        for (key, value) in settings.iter() {
            w(&mut out, &format!("    {key} = {value}\n"))?;
        }
    }

    if loaders.is_empty() {
        w(&mut out, "  Loaders:        (none)\n")?;
    } else {
        w(&mut out, "  Loaders:\n")?;
        for (enforce, ident) in loaders {
            let tag = match enforce {
                Enforce::Pre => "pre",
                Enforce::Normal => "normal",
                Enforce::Post => "post",
            };
            w(&mut out, &format!("    [{tag}] {ident}\n"))?;
        }
    }
    Ok(())
}
