use super::{absolute, fail, print_json, w};
use miette::{IntoDiagnostic, Result};
use modfactory_core::{
    load_config, ContextInfo, FsResolver, Module, NormalModuleFactory, ResolveRequest,
    OUTPUT_SCHEMA_VERSION,
};
use serde_json::{json, Value};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Run the resolve command.
///
/// Builds a factory from the config in `cwd` (or `config`), resolves against
/// the file system and prints the created module.
pub fn run(
    cwd: &Path,
    request: &str,
    issuer: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = match load_config(cwd, config) {
        Ok(config) => config,
        Err(e) => return fail(e.code(), &e.to_string(), json),
    };
    let factory = match NormalModuleFactory::from_config(&config, Arc::new(FsResolver::new())) {
        Ok(factory) => factory,
        Err(e) => return fail(e.code(), &e.to_string(), json),
    };

    let mut info = ContextInfo::default();
    if let Some(issuer) = issuer {
        info = info.with_issuer(absolute(cwd, issuer));
    }
    let request = ResolveRequest::single(request)
        .with_context(config.context.clone())
        .with_context_info(info)
        .with_resolve_options(config.resolve.clone());

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    match runtime.block_on(factory.create(request)) {
        Ok(module) if json => print_json(&json!({
            "ok": true,
            "schemaVersion": OUTPUT_SCHEMA_VERSION,
            "module": module.as_ref().map(module_json).transpose()?,
        })),
        Ok(module) => print_human(module.as_ref()),
        Err(e) => fail(e.code(), &e.to_string(), json),
    }
}

/// The module serialized with a `kind` tag: `normal` or `ignored`.
fn module_json(module: &Module) -> Result<Value> {
    let (kind, value) = match module {
        Module::Normal(descriptor) => ("normal", serde_json::to_value(descriptor.as_ref())),
        Module::Raw(raw) => ("ignored", serde_json::to_value(raw.as_ref())),
    };
    let mut value = value.into_diagnostic()?;
    if let Value::Object(map) = &mut value {
        map.insert("kind".to_string(), Value::from(kind));
    }
    Ok(value)
}

fn print_human(module: Option<&Module>) -> Result<()> {
    let mut out = io::stdout().lock();

    let Some(module) = module else {
        return w(&mut out, "Request ignored\n");
    };

    match module {
        Module::Raw(raw) => {
            w(&mut out, &format!("  Ignored:        {}\n", raw.readable_identifier))?;
            w(&mut out, &format!("  Identifier:     {}\n", raw.identifier))?;
        }
        Module::Normal(descriptor) => {
            w(&mut out, &format!("  Request:        {}\n", descriptor.request))?;
            w(&mut out, &format!("  User request:   {}\n", descriptor.user_request))?;
            w(&mut out, &format!("  Resource:       {}\n", descriptor.resource))?;
            if let Some(match_resource) = &descriptor.match_resource {
                w(&mut out, &format!("  Match resource: {match_resource}\n"))?;
            }
            w(&mut out, &format!("  Type:           {}\n", descriptor.module_type))?;
            if descriptor.loaders.is_empty() {
                w(&mut out, "  Loaders:        (none)\n")?;
            } else {
                w(&mut out, "  Loaders:\n")?;
                for (i, loader) in descriptor.loaders.iter().enumerate() {
                    w(&mut out, &format!("    {}. {}\n", i + 1, loader.to_ident()))?;
                }
            }
        }
    }
    Ok(())
}
