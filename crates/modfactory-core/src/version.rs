use std::fmt::Write;

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version of the JSON output emitted by the CLI.
/// Bump this when changing the descriptor or error shape.
pub const OUTPUT_SCHEMA_VERSION: u32 = 1;

/// Returns a formatted version string including build metadata if available.
#[must_use]
pub fn version_string() -> String {
    let mut s = format!("modfactory {VERSION}");

    if let Some(hash) = option_env!("MODFACTORY_BUILD_GIT_HASH") {
        let _ = write!(s, " ({hash})");
    }

    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_contains_version() {
        let vs = version_string();
        assert!(vs.contains(VERSION));
        assert!(vs.starts_with("modfactory "));
    }

    #[test]
    fn test_schema_version() {
        assert_eq!(OUTPUT_SCHEMA_VERSION, 1);
    }
}
