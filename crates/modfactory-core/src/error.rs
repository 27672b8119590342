use crate::hooks::HookError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes surfaced by the module factory.
///
/// All codes are SCREAMING_SNAKE_CASE and stable across versions.
pub mod codes {
    /// The resolution delegate could not resolve a loader or resource.
    pub const MODULE_RESOLUTION_FAILED: &str = "MODULE_RESOLUTION_FAILED";
    /// A `??ident` options reference names options no rule registered.
    pub const MODULE_OPTIONS_NOT_FOUND: &str = "MODULE_OPTIONS_NOT_FOUND";
    /// Resolution finished without a usable request.
    pub const MODULE_EMPTY_DEPENDENCY: &str = "MODULE_EMPTY_DEPENDENCY";
    /// No parser or generator is registered for a module type.
    pub const MODULE_CAPABILITY_UNREGISTERED: &str = "MODULE_CAPABILITY_UNREGISTERED";
    /// Loader options were neither a string nor an object.
    pub const MODULE_OPTIONS_MALFORMED: &str = "MODULE_OPTIONS_MALFORMED";
    /// An extension point tap failed.
    pub const MODULE_HOOK_FAILED: &str = "MODULE_HOOK_FAILED";

    /// The config file could not be read.
    pub const CONFIG_READ_FAILED: &str = "CONFIG_READ_FAILED";
    /// The config file is not valid JSON or has the wrong shape.
    pub const CONFIG_PARSE_FAILED: &str = "CONFIG_PARSE_FAILED";
    /// A rule condition failed to compile.
    pub const RULE_CONDITION_INVALID: &str = "RULE_CONDITION_INVALID";
    /// A rule combines keys that cannot be used together.
    pub const RULE_INVALID: &str = "RULE_INVALID";
    /// I/O failure outside config loading.
    pub const IO_ERROR: &str = "IO_ERROR";
    /// Anything else.
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Core error type for modfactory operations outside a single resolution.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid rule condition '{pattern}': {message}")]
    InvalidCondition { pattern: String, message: String },

    #[error("Invalid rule '{ident}': {message}")]
    InvalidRule { ident: String, message: String },

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Stable error code for machine-readable output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => codes::IO_ERROR,
            Self::ConfigRead { .. } => codes::CONFIG_READ_FAILED,
            Self::ConfigParse { .. } => codes::CONFIG_PARSE_FAILED,
            Self::InvalidCondition { .. } => codes::RULE_CONDITION_INVALID,
            Self::InvalidRule { .. } => codes::RULE_INVALID,
            Self::Factory(err) => err.code(),
            Self::Other(_) => codes::INTERNAL_ERROR,
        }
    }
}

/// The delegate could not resolve a loader or resource request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Can't resolve '{request}' in '{context}': {message}")]
pub struct ResolutionError {
    /// The request handed to the delegate.
    pub request: String,
    /// Directory the request was resolved from.
    pub context: String,
    /// Delegate message, possibly decorated with hints.
    pub message: String,
}

impl ResolutionError {
    pub fn new(
        request: impl Into<String>,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request: request.into(),
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Which instance registry a capability lookup went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Parser,
    Generator,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parser => f.write_str("parser"),
            Self::Generator => f.write_str("generator"),
        }
    }
}

/// Failure of a single `create` call.
///
/// None of these is process-fatal: each is reported to the caller of the
/// resolution that produced it. An extension point ignoring a module is not
/// an error and never shows up here.
#[derive(Error, Debug)]
pub enum FactoryError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Can't find options with ident '{ident}'")]
    OptionLookup { ident: String },

    #[error("Empty dependency (no request)")]
    EmptyDependency,

    #[error("No {capability} registered for {module_type}")]
    UnregisteredCapability {
        capability: Capability,
        module_type: String,
    },

    #[error("Loader options must be string or object (loader '{loader}' got {found})")]
    MalformedOptions { loader: String, found: String },

    #[error(transparent)]
    Hook(#[from] HookError),
}

impl FactoryError {
    /// Stable error code for machine-readable output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolution(_) => codes::MODULE_RESOLUTION_FAILED,
            Self::OptionLookup { .. } => codes::MODULE_OPTIONS_NOT_FOUND,
            Self::EmptyDependency => codes::MODULE_EMPTY_DEPENDENCY,
            Self::UnregisteredCapability { .. } => codes::MODULE_CAPABILITY_UNREGISTERED,
            Self::MalformedOptions { .. } => codes::MODULE_OPTIONS_MALFORMED,
            Self::Hook(_) => codes::MODULE_HOOK_FAILED,
        }
    }

    /// Whether the caller may reasonably report this per module and carry on.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }
}
