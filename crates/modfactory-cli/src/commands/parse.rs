use super::{print_json, w};
use miette::Result;
use modfactory_core::{parse, ParsedRequest, OUTPUT_SCHEMA_VERSION};
use std::io;
use std::path::Path;

/// Run the parse command.
///
/// Parsing never fails; relative match-resources are joined with `cwd`.
pub fn run(cwd: &Path, request: &str, json: bool) -> Result<()> {
    let parsed = parse(&cwd.display().to_string(), request);

    if json {
        print_json(&serde_json::json!({
            "ok": true,
            "schemaVersion": OUTPUT_SCHEMA_VERSION,
            "parsed": parsed,
        }))
    } else {
        print_human(&parsed)
    }
}

fn print_human(parsed: &ParsedRequest) -> Result<()> {
    let mut out = io::stdout().lock();

    w(&mut out, &format!("  Resource:       {}\n", parsed.resource))?;
    if let Some(match_resource) = &parsed.match_resource {
        w(&mut out, &format!("  Match resource: {match_resource}\n"))?;
    }

    let mut suppressed = Vec::new();
    if parsed.suppress_pre {
        suppressed.push("pre");
    }
    if parsed.suppress_normal {
        suppressed.push("normal");
    }
    if parsed.suppress_post {
        suppressed.push("post");
    }
    if !suppressed.is_empty() {
        w(&mut out, &format!("  Suppressed:     {}\n", suppressed.join(", ")))?;
    }

    if parsed.inline_loaders.is_empty() {
        w(&mut out, "  Loaders:        (none)\n")?;
    } else {
        w(&mut out, "  Loaders:\n")?;
        for (i, loader) in parsed.inline_loaders.iter().enumerate() {
            w(&mut out, &format!("    {}. {}\n", i + 1, loader.to_ident()))?;
        }
    }
    Ok(())
}
