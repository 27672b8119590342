//! Rule conditions.
//!
//! Raw conditions come straight from configuration JSON:
//!
//! - `"/abs/src"`: the value starts with this prefix
//! - `{ "regex": "\\.css$" }`: regular expression search
//! - `[a, b]`: any of
//! - `{ "and": [a, b] }`, `{ "or": [a, b] }`, `{ "not": a }`

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// A condition as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawCondition {
    Prefix(String),
    Regex { regex: String },
    And { and: Vec<RawCondition> },
    Or { or: Vec<RawCondition> },
    Not { not: Box<RawCondition> },
    List(Vec<RawCondition>),
}

impl RawCondition {
    /// Shorthand for a regex condition.
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::Regex {
            regex: pattern.into(),
        }
    }

    /// Shorthand for a prefix condition.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }
}

/// A compiled condition.
#[derive(Debug, Clone)]
pub enum Condition {
    Prefix(String),
    Regex(regex_lite::Regex),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Compile a raw condition.
    pub fn compile(raw: &RawCondition) -> Result<Self, Error> {
        Ok(match raw {
            RawCondition::Prefix(prefix) => Self::Prefix(prefix.clone()),
            RawCondition::Regex { regex } => {
                let compiled =
                    regex_lite::Regex::new(regex).map_err(|e| Error::InvalidCondition {
                        pattern: regex.clone(),
                        message: e.to_string(),
                    })?;
                Self::Regex(compiled)
            }
            RawCondition::And { and } => Self::All(compile_all(and)?),
            RawCondition::Or { or } | RawCondition::List(or) => Self::Any(compile_all(or)?),
            RawCondition::Not { not } => Self::Not(Box::new(Self::compile(not)?)),
        })
    }

    /// Whether `value` satisfies the condition.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Prefix(prefix) => value.starts_with(prefix.as_str()),
            Self::Regex(regex) => regex.is_match(value),
            Self::All(conditions) => conditions.iter().all(|c| c.matches(value)),
            Self::Any(conditions) => conditions.iter().any(|c| c.matches(value)),
            Self::Not(condition) => !condition.matches(value),
        }
    }
}

fn compile_all(raw: &[RawCondition]) -> Result<Vec<Condition>, Error> {
    raw.iter().map(Condition::compile).collect()
}

/// Check an optional condition against an optional fact.
///
/// A missing condition always passes. A condition on a missing or empty fact
/// never does.
#[must_use]
pub fn check(condition: Option<&Condition>, fact: Option<&str>) -> bool {
    match condition {
        None => true,
        Some(condition) => match fact {
            Some(value) if !value.is_empty() => condition.matches(value),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(json: &str) -> Condition {
        let raw: RawCondition = serde_json::from_str(json).unwrap();
        Condition::compile(&raw).unwrap()
    }

    #[test]
    fn test_prefix() {
        let cond = compile(r#""/app/src""#);
        assert!(cond.matches("/app/src/a.js"));
        assert!(!cond.matches("/app/lib/a.js"));
    }

    #[test]
    fn test_regex() {
        let cond = compile(r#"{"regex": "\\.css$"}"#);
        assert!(cond.matches("/a/b.css"));
        assert!(!cond.matches("/a/b.css.js"));
    }

    #[test]
    fn test_list_is_any_of() {
        let cond = compile(r#"[{"regex": "\\.ts$"}, "/vendor"]"#);
        assert!(cond.matches("/app/a.ts"));
        assert!(cond.matches("/vendor/x.js"));
        assert!(!cond.matches("/app/a.js"));
    }

    #[test]
    fn test_and_or_not() {
        let cond = compile(
            r#"{"and": [{"regex": "\\.js$"}, {"not": {"or": ["/app/node_modules", {"regex": "\\.min\\."}]}}]}"#,
        );
        assert!(cond.matches("/app/src/a.js"));
        assert!(!cond.matches("/app/node_modules/x/a.js"));
        assert!(!cond.matches("/app/src/a.min.js"));
        assert!(!cond.matches("/app/src/a.ts"));
    }

    #[test]
    fn test_invalid_regex() {
        let err = Condition::compile(&RawCondition::regex("(")).unwrap_err();
        assert!(matches!(err, Error::InvalidCondition { .. }));
    }

    #[test]
    fn test_check_absent_fact() {
        let cond = compile(r#"{"regex": ".*"}"#);
        assert!(check(None, None));
        assert!(!check(Some(&cond), None));
        assert!(!check(Some(&cond), Some("")));
        assert!(check(Some(&cond), Some("?x")));
    }
}
