pub mod parse;
pub mod resolve;
pub mod rules;
pub mod version;

use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Exit code for failures reported as JSON.
const EXIT_FAILURE: i32 = 1;

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

/// Report a failure with its stable code.
///
/// In JSON mode the error object goes to stdout and the process exits;
/// otherwise it becomes a diagnostic.
fn fail(code: &str, message: &str, json: bool) -> Result<()> {
    if json {
        print_json(&serde_json::json!({
            "ok": false,
            "error": {
                "code": code,
                "message": message,
            }
        }))?;
        std::process::exit(EXIT_FAILURE);
    }
    Err(miette::miette!(code = code.to_string(), "{message}"))
}

/// Normalized absolute form of a user-supplied path.
fn absolute(cwd: &Path, path: &Path) -> String {
    modfactory_util::path::join(&cwd.display().to_string(), &path.display().to_string())
}

fn w(out: &mut impl Write, s: &str) -> Result<()> {
    out.write_all(s.as_bytes()).into_diagnostic()
}
