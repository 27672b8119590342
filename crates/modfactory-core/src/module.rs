//! Module values produced by the factory.

use crate::request::ResolvedLoader;
use crate::resolve::ContextInfo;
use crate::rules::Settings;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Default module type when no rule sets `type`.
pub const DEFAULT_MODULE_TYPE: &str = "javascript/auto";

/// An import edge as seen by the factory.
///
/// Dependencies are shared as `Arc<Dependency>`; two handles denote the same
/// dependency only if they point to the same allocation.
#[derive(Debug, PartialEq, Eq)]
pub struct Dependency {
    request: String,
}

impl Dependency {
    pub fn new(request: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            request: request.into(),
        })
    }

    #[must_use]
    pub fn request(&self) -> &str {
        &self.request
    }
}

/// A parser instance, opaque to the factory.
pub trait Parser: Send + Sync + fmt::Debug {
    /// Module type this parser was created for.
    fn module_type(&self) -> &str;
}

/// A generator instance, opaque to the factory.
pub trait Generator: Send + Sync + fmt::Debug {
    /// Module type this generator was created for.
    fn module_type(&self) -> &str;
}

pub type ParserHandle = Arc<dyn Parser>;
pub type GeneratorHandle = Arc<dyn Generator>;

/// Input of [`NormalModuleFactory::create`](crate::factory::NormalModuleFactory::create).
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Directory the request is issued from. Empty means the factory context.
    pub context: String,
    /// The raw request; taken from the first dependency.
    pub request: String,
    pub context_info: ContextInfo,
    /// Options handed to the delegate for the resource.
    pub resolve_options: Value,
    /// Dependencies sharing this request. The first one is the cache key.
    pub dependencies: Vec<Arc<Dependency>>,
}

impl ResolveRequest {
    #[must_use]
    pub fn new(dependencies: Vec<Arc<Dependency>>) -> Self {
        let request = dependencies
            .first()
            .map(|d| d.request().to_string())
            .unwrap_or_default();
        Self {
            context: String::new(),
            request,
            context_info: ContextInfo::default(),
            resolve_options: Value::Object(serde_json::Map::new()),
            dependencies,
        }
    }

    /// Single-dependency shorthand.
    pub fn single(request: impl Into<String>) -> Self {
        Self::new(vec![Dependency::new(request)])
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    #[must_use]
    pub fn with_context_info(mut self, info: ContextInfo) -> Self {
        self.context_info = info;
        self
    }

    #[must_use]
    pub fn with_resolve_options(mut self, options: Value) -> Self {
        self.resolve_options = options;
        self
    }
}

/// Everything a module is built from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub context: String,
    /// Every loader ident and the resource, joined by `!`.
    pub request: String,
    /// What the user wrote, with resolved inline loaders.
    pub user_request: String,
    pub raw_request: String,
    pub loaders: Vec<ResolvedLoader>,
    /// Resolved resource including its query.
    pub resource: String,
    pub resource_path: String,
    pub resource_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_resolve_data: Option<Value>,
    pub settings: Settings,
    #[serde(rename = "type")]
    pub module_type: String,
    pub resolve_options: Value,
    #[serde(skip)]
    pub parser: ParserHandle,
    #[serde(skip)]
    pub generator: GeneratorHandle,
}

/// Intermediate data between resolution and module creation.
///
/// This is what `after_resolve`, `create_module` and `module` taps see.
#[derive(Debug, Clone)]
pub struct ResolveData {
    pub descriptor: ModuleDescriptor,
    pub context_info: ContextInfo,
    pub dependencies: Vec<Arc<Dependency>>,
}

/// Stand-in for a resource the delegate chose to ignore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawModule {
    pub source: String,
    pub identifier: String,
    pub readable_identifier: String,
}

impl RawModule {
    #[must_use]
    pub fn ignored(context: &str, request: &str) -> Self {
        Self {
            source: "/* (ignored) */".to_string(),
            identifier: format!("ignored {context} {request}"),
            readable_identifier: format!("{request} (ignored)"),
        }
    }
}

/// What a successful `create` yields.
#[derive(Debug, Clone)]
pub enum Module {
    Normal(Arc<ModuleDescriptor>),
    Raw(Arc<RawModule>),
}

impl Module {
    /// Unique identifier: the compound request or the ignored identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Normal(descriptor) => &descriptor.request,
            Self::Raw(raw) => &raw.identifier,
        }
    }

    #[must_use]
    pub fn as_normal(&self) -> Option<&Arc<ModuleDescriptor>> {
        match self {
            Self::Normal(descriptor) => Some(descriptor),
            Self::Raw(_) => None,
        }
    }

    #[must_use]
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    /// Whether both values share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Normal(a), Self::Normal(b)) => Arc::ptr_eq(a, b),
            (Self::Raw(a), Self::Raw(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<ModuleDescriptor> for Module {
    fn from(descriptor: ModuleDescriptor) -> Self {
        Self::Normal(Arc::new(descriptor))
    }
}

impl From<RawModule> for Module {
    fn from(raw: RawModule) -> Self {
        Self::Raw(Arc::new(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_module_strings() {
        let raw = RawModule::ignored("/app/src", "fs");
        assert_eq!(raw.source, "/* (ignored) */");
        assert_eq!(raw.identifier, "ignored /app/src fs");
        assert_eq!(raw.readable_identifier, "fs (ignored)");

        let module = Module::from(raw);
        assert!(module.is_ignored());
        assert_eq!(module.identifier(), "ignored /app/src fs");
        assert!(module.as_normal().is_none());
    }

    #[test]
    fn test_resolve_request_takes_first_dependency() {
        let req = ResolveRequest::new(vec![Dependency::new("./a"), Dependency::new("./b")]);
        assert_eq!(req.request, "./a");
        assert!(req.context.is_empty());

        let empty = ResolveRequest::new(Vec::new());
        assert!(empty.request.is_empty());
    }

    #[test]
    fn test_dependency_identity_is_allocation() {
        let a = Dependency::new("./x");
        let b = Dependency::new("./x");
        assert_eq!(a, b);
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
