use crate::error::Error;
use crate::rules::{default_rules, RawRule, RuleSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory.
pub const CONFIG_FILE: &str = "modfactory.config.json";

/// Factory configuration, read from `modfactory.config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Directory requests resolve from when they carry no context.
    pub context: String,

    /// Rules, matched after the default rules.
    pub rules: Vec<RawRule>,

    /// Prepend the default `type` rules.
    pub default_rules: bool,

    /// Cache created modules per dependency.
    pub unsafe_cache: bool,

    /// Resolve options handed to the delegate for resources.
    pub resolve: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context: String::new(),
            rules: Vec::new(),
            default_rules: true,
            unsafe_cache: true,
            resolve: Value::Object(serde_json::Map::new()),
        }
    }
}

impl Config {
    /// Create a config resolving from `context`.
    #[must_use]
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..Default::default()
        }
    }

    /// Add a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: RawRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Toggle the default rules.
    #[must_use]
    pub fn with_default_rules(mut self, enabled: bool) -> Self {
        self.default_rules = enabled;
        self
    }

    /// Toggle the dependency cache.
    #[must_use]
    pub fn with_unsafe_cache(mut self, enabled: bool) -> Self {
        self.unsafe_cache = enabled;
        self
    }

    /// Compile the default rules (when enabled) followed by the configured ones.
    pub fn rule_set(&self) -> Result<RuleSet, Error> {
        let mut raw = if self.default_rules {
            default_rules()
        } else {
            Vec::new()
        };
        raw.extend(self.rules.iter().cloned());
        RuleSet::new(&raw)
    }
}

/// Load the config for `cwd`.
///
/// `explicit` wins over `cwd/modfactory.config.json`; with neither present the
/// defaults apply. A relative or empty `context` is taken relative to the
/// config file's directory.
pub fn load_config(cwd: &Path, explicit: Option<&Path>) -> Result<Config, Error> {
    let path = match explicit {
        Some(path) => cwd.join(path),
        None => {
            let candidate = cwd.join(CONFIG_FILE);
            if !candidate.is_file() {
                return Ok(Config::new(cwd.display().to_string()));
            }
            candidate
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
        path: path.clone(),
        source,
    })?;
    let mut config: Config = serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.clone(),
        source,
    })?;

    let base = path.parent().map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
    config.context = base.join(&config.context).display().to_string();
    let context = PathBuf::from(&config.context);
    config.context = dunce::canonicalize(&context)
        .unwrap_or(context)
        .display()
        .to_string();

    tracing::debug!(path = %path.display(), rules = config.rules.len(), "loaded config");
    Ok(config)
}
