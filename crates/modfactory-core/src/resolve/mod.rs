//! Resolution delegate contract.
//!
//! The factory never touches the filesystem itself. Turning a loader name or a
//! resource request into an absolute path is delegated to a
//! [`ResolutionDelegate`], which the embedding bundler provides.
//! [`FsResolver`] is the delegate the CLI uses.

mod fs;

pub use fs::FsResolver;

use crate::error::ResolutionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::trace;

/// Which resolver a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// Loader names (`css-loader`, `./my-loader.js`).
    Loader,
    /// Resources (`./button.js`, `lodash/get`).
    Normal,
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loader => f.write_str("loader"),
            Self::Normal => f.write_str("normal"),
        }
    }
}

/// Who is asking. Opaque to the factory apart from rule matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    /// Path of the importing module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Name of the (child) compiler doing the import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,
}

impl ContextInfo {
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn with_compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = Some(compiler.into());
        self
    }
}

/// Outcome of a successful delegate call.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// An absolute path, possibly followed by a `?query`.
    Resolved {
        path: String,
        /// Delegate metadata carried into the descriptor.
        data: Option<Value>,
    },
    /// The resource is deliberately ignored (e.g. `"browser": { "fs": false }`).
    Ignored,
}

impl Resolution {
    pub fn resolved(path: impl Into<String>) -> Self {
        Self::Resolved {
            path: path.into(),
            data: None,
        }
    }
}

/// External path resolution.
///
/// Implementations may be called concurrently for many requests and must not
/// assume any completion order.
#[async_trait]
pub trait ResolutionDelegate: Send + Sync {
    async fn resolve(
        &self,
        kind: ResolverKind,
        info: &ContextInfo,
        context: &str,
        request: &str,
        options: &Value,
    ) -> Result<Resolution, ResolutionError>;
}

/// Resolve the resource part of a request.
///
/// An empty resource or a bare query (`?inline`) is virtual: it resolves to
/// itself without consulting the delegate.
pub async fn resolve_resource(
    delegate: &dyn ResolutionDelegate,
    info: &ContextInfo,
    context: &str,
    resource: &str,
    options: &Value,
) -> Result<Resolution, ResolutionError> {
    if resource.is_empty() || resource.starts_with('?') {
        trace!(resource, "virtual resource");
        return Ok(Resolution::resolved(resource));
    }

    trace!(context, resource, "resolving resource");
    delegate
        .resolve(ResolverKind::Normal, info, context, resource, options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Unreachable;

    #[async_trait]
    impl ResolutionDelegate for Unreachable {
        async fn resolve(
            &self,
            _kind: ResolverKind,
            _info: &ContextInfo,
            context: &str,
            request: &str,
            _options: &Value,
        ) -> Result<Resolution, ResolutionError> {
            Err(ResolutionError::new(request, context, "delegate called"))
        }
    }

    #[tokio::test]
    async fn test_virtual_resources_skip_delegate() {
        let info = ContextInfo::default();
        for resource in ["", "?inline"] {
            let resolution = resolve_resource(&Unreachable, &info, "/app", resource, &json!({}))
                .await
                .unwrap();
            assert_eq!(resolution, Resolution::resolved(resource));
        }
    }

    #[tokio::test]
    async fn test_real_resources_reach_delegate() {
        let info = ContextInfo::default();
        let err = resolve_resource(&Unreachable, &info, "/app", "./a.js", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.request, "./a.js");
    }

    #[test]
    fn test_context_info_serializes_camel_case() {
        let info = ContextInfo::default()
            .with_issuer("/app/a.js")
            .with_compiler("child");
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"issuer": "/app/a.js", "compiler": "child"})
        );
        assert_eq!(serde_json::to_value(ContextInfo::default()).unwrap(), json!({}));
    }
}
