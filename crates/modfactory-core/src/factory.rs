//! The normal module factory.
//!
//! [`NormalModuleFactory::create`] turns a [`ResolveRequest`] into a
//! [`Module`]:
//!
//! 1. Dependency cache lookup (first dependency).
//! 2. `before_resolve` may rewrite or ignore the request.
//! 3. The `factory` hook yields the function that does the rest; the default
//!    one asks the `resolver` hook for a resolver function and runs it.
//! 4. The default resolver parses the request and resolves inline loaders and
//!    the resource concurrently.
//! 5. Rules are matched against the resource, their loaders resolved, and the
//!    chain assembled as `post ++ inline ++ normal ++ pre`.
//! 6. Parser and generator instances are fetched from their caches.
//! 7. `after_resolve`, `create_module` and `module` shape the final module.
//! 8. The module is cached for every dependency when the cache predicate
//!    accepts it.
//!
//! A resolver may also hand back a finished [`Module`], which skips step 7.
//! The default resolver does this for an ignored resource, as a [`RawModule`].

use crate::builtin::register_builtin_capabilities;
use crate::cache::{instance_key, DependencyCache, InstanceCache};
use crate::config::Config;
use crate::error::{Capability, Error, FactoryError};
use crate::hooks::{AsyncWaterfallHook, HookMap, SyncBailHook, SyncHook, SyncWaterfallHook};
use crate::loaders::resolve_loaders;
use crate::module::{
    GeneratorHandle, Module, ModuleDescriptor, ParserHandle, RawModule, ResolveData,
    ResolveRequest, DEFAULT_MODULE_TYPE,
};
use crate::request::{parse, split_query, LoaderSpec, ResolvedLoader};
use crate::resolve::{resolve_resource, Resolution, ResolutionDelegate};
use crate::rules::{Enforce, RuleEffect, RuleFacts, RuleSet, Settings};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type PredicateFn = dyn Fn(&Module) -> bool + Send + Sync;

/// Decides whether a created module goes into the dependency cache.
#[derive(Clone)]
pub enum CachePredicate {
    /// Cache always (`true`) or never (`false`).
    Flag(bool),
    /// Cache when the function says so.
    Custom(Arc<PredicateFn>),
}

impl CachePredicate {
    fn accepts(&self, module: &Module) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Custom(predicate) => predicate(module),
        }
    }
}

impl fmt::Debug for CachePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Outcome of a resolver function.
pub enum Resolved {
    /// Data for the default module creation path.
    Data(ResolveData),
    /// A finished module. `after_resolve` and module creation are skipped.
    Module(Module),
}

/// What a resolver function produces; `Ok(None)` ignores the request.
pub type ResolverResult = Result<Option<Resolved>, FactoryError>;

/// What a factory function produces; `Ok(None)` ignores the request.
pub type FactoryResult = Result<Option<Module>, FactoryError>;

/// Turns a request into resolved data. Supplied by the `resolver` hook.
pub type ResolverFn = Arc<
    dyn for<'a> Fn(&'a NormalModuleFactory, ResolveRequest) -> BoxFuture<'a, ResolverResult>
        + Send
        + Sync,
>;

/// Turns a request into a module. Supplied by the `factory` hook.
pub type FactoryFn = Arc<
    dyn for<'a> Fn(&'a NormalModuleFactory, ResolveRequest) -> BoxFuture<'a, FactoryResult>
        + Send
        + Sync,
>;

/// Wrap a closure as a [`ResolverFn`].
pub fn resolver_fn<F>(f: F) -> ResolverFn
where
    F: for<'a> Fn(&'a NormalModuleFactory, ResolveRequest) -> BoxFuture<'a, ResolverResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`FactoryFn`].
pub fn factory_fn<F>(f: F) -> FactoryFn
where
    F: for<'a> Fn(&'a NormalModuleFactory, ResolveRequest) -> BoxFuture<'a, FactoryResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn default_resolver(factory: &NormalModuleFactory, request: ResolveRequest) -> BoxFuture<'_, ResolverResult> {
    Box::pin(async move { factory.resolve(request).await.map(Some) })
}

fn default_factory(factory: &NormalModuleFactory, request: ResolveRequest) -> BoxFuture<'_, FactoryResult> {
    Box::pin(factory.build(request))
}

/// Extension points of the factory.
pub struct FactoryHooks {
    /// Rewrite the request before anything is resolved; `None` ignores it.
    pub before_resolve: AsyncWaterfallHook<Option<ResolveRequest>>,
    /// Replace or wrap the function that turns a request into a module.
    /// Seeded with the default pipeline; `None` ignores every request.
    pub factory: SyncWaterfallHook<Option<FactoryFn>>,
    /// Replace or wrap the resolver used by the default factory function.
    /// Seeded with the default resolver; `None` ignores every request.
    pub resolver: SyncWaterfallHook<Option<ResolverFn>>,
    /// Rewrite resolved data; `None` ignores the module.
    pub after_resolve: AsyncWaterfallHook<Option<ResolveData>>,
    /// Supply a custom module instead of the default descriptor.
    pub create_module: SyncBailHook<ResolveData, Module>,
    /// Wrap or replace the created module.
    pub module: SyncWaterfallHook<Module, ResolveData>,
    /// Build a parser for a module type from its options.
    pub create_parser: HookMap<SyncBailHook<Value, ParserHandle>>,
    /// Observe freshly built parsers.
    pub parser: HookMap<SyncHook<(ParserHandle, Value)>>,
    /// Build a generator for a module type from its options.
    pub create_generator: HookMap<SyncBailHook<Value, GeneratorHandle>>,
    /// Observe freshly built generators.
    pub generator: HookMap<SyncHook<(GeneratorHandle, Value)>>,
}

impl Default for FactoryHooks {
    fn default() -> Self {
        Self {
            before_resolve: AsyncWaterfallHook::new("beforeResolve"),
            factory: SyncWaterfallHook::new("factory"),
            resolver: SyncWaterfallHook::new("resolver"),
            after_resolve: AsyncWaterfallHook::new("afterResolve"),
            create_module: SyncBailHook::new("createModule"),
            module: SyncWaterfallHook::new("module"),
            create_parser: HookMap::new("createParser"),
            parser: HookMap::new("parser"),
            create_generator: HookMap::new("createGenerator"),
            generator: HookMap::new("generator"),
        }
    }
}

/// Creates modules from import requests.
pub struct NormalModuleFactory {
    context: String,
    rules: RuleSet,
    delegate: Arc<dyn ResolutionDelegate>,
    cache_predicate: CachePredicate,
    /// Extension points. Tap them before the first `create`.
    pub hooks: FactoryHooks,
    dependency_cache: DependencyCache,
    parser_cache: InstanceCache<ParserHandle>,
    generator_cache: InstanceCache<GeneratorHandle>,
}

impl NormalModuleFactory {
    /// A factory with no capabilities registered.
    pub fn new(
        context: impl Into<String>,
        rules: RuleSet,
        delegate: Arc<dyn ResolutionDelegate>,
    ) -> Self {
        Self {
            context: context.into(),
            rules,
            delegate,
            cache_predicate: CachePredicate::Flag(true),
            hooks: FactoryHooks::default(),
            dependency_cache: DependencyCache::new(),
            parser_cache: InstanceCache::new(),
            generator_cache: InstanceCache::new(),
        }
    }

    /// A factory configured from `config`, with the built-in parsers and
    /// generators registered.
    pub fn from_config(config: &Config, delegate: Arc<dyn ResolutionDelegate>) -> Result<Self, Error> {
        let factory = Self::new(config.context.clone(), config.rule_set()?, delegate)
            .with_unsafe_cache(config.unsafe_cache);
        register_builtin_capabilities(&factory.hooks);
        Ok(factory)
    }

    /// Cache every module (`true`) or none (`false`).
    #[must_use]
    pub fn with_unsafe_cache(mut self, enabled: bool) -> Self {
        self.cache_predicate = CachePredicate::Flag(enabled);
        self
    }

    /// Cache the modules `predicate` accepts.
    #[must_use]
    pub fn with_cache_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Module) -> bool + Send + Sync + 'static,
    {
        self.cache_predicate = CachePredicate::Custom(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Create the module for `request`.
    ///
    /// `Ok(None)` means an extension point chose to ignore the request.
    pub async fn create(&self, request: ResolveRequest) -> Result<Option<Module>, FactoryError> {
        let Some(first) = request.dependencies.first() else {
            return Err(FactoryError::EmptyDependency);
        };
        if let Some(cached) = self.dependency_cache.get(first) {
            debug!(request = %first.request(), "dependency cache hit");
            return Ok(Some(cached));
        }

        let dependencies = request.dependencies.clone();
        let mut request = request;
        if request.context.is_empty() {
            request.context.clone_from(&self.context);
        }

        let Some(request) = self.hooks.before_resolve.call(Some(request)).await? else {
            debug!("request ignored before resolve");
            return Ok(None);
        };

        let Some(factory) = self.hooks.factory.call(Some(factory_fn(default_factory)), &())? else {
            debug!("request ignored by factory hook");
            return Ok(None);
        };
        let Some(module) = factory(self, request).await? else {
            return Ok(None);
        };

        if self.cache_predicate.accepts(&module) {
            for dependency in &dependencies {
                self.dependency_cache.insert(dependency, module.clone());
            }
        }

        debug!(identifier = %module.identifier(), "module created");
        Ok(Some(module))
    }

    /// The default factory function: resolve, then run the module hooks.
    async fn build(&self, request: ResolveRequest) -> FactoryResult {
        let Some(resolver) = self.hooks.resolver.call(Some(resolver_fn(default_resolver)), &())? else {
            debug!("request ignored by resolver hook");
            return Ok(None);
        };
        let data = match resolver(self, request).await? {
            None => return Ok(None),
            Some(Resolved::Module(module)) => return Ok(Some(module)),
            Some(Resolved::Data(data)) => data,
        };

        let Some(data) = self.hooks.after_resolve.call(Some(data)).await? else {
            debug!("module ignored after resolve");
            return Ok(None);
        };

        let created = match self.hooks.create_module.call(&data)? {
            Some(module) => module,
            None if data.descriptor.request.is_empty() => {
                return Err(FactoryError::EmptyDependency);
            }
            None => Module::from(data.descriptor.clone()),
        };
        Ok(Some(self.hooks.module.call(created, &data)?))
    }

    async fn resolve(&self, request: ResolveRequest) -> Result<Resolved, FactoryError> {
        let ResolveRequest {
            context,
            request: raw_request,
            context_info,
            resolve_options,
            dependencies,
        } = request;
        let delegate = self.delegate.as_ref();
        let loader_options = json!({});

        let parsed = parse(&context, &raw_request);
        debug!(
            request = %raw_request,
            inline = parsed.inline_loaders.len(),
            resource = %parsed.resource,
            "parsed request"
        );

        let (inline, resource) = futures::join!(
            resolve_loaders(
                delegate,
                &self.rules,
                &context_info,
                &context,
                &parsed.inline_loaders,
                &loader_options,
            ),
            resolve_resource(delegate, &context_info, &context, &parsed.resource, &resolve_options),
        );
        let inline = inline?;
        let (resource, resource_resolve_data) = match resource? {
            Resolution::Resolved { path, data } => (path, data),
            Resolution::Ignored => {
                let raw = RawModule::ignored(&context, &raw_request);
                debug!(identifier = %raw.identifier, "resource ignored");
                return Ok(Resolved::Module(Module::from(raw)));
            }
        };

        let mut user_request = parsed
            .match_resource
            .as_ref()
            .map(|m| format!("{m}!=!"))
            .unwrap_or_default();
        user_request.push_str(&compound_request(&inline, &resource));

        let (resource_path, resource_query) =
            split_query(parsed.match_resource.as_deref().unwrap_or(&resource));
        let real_resource = if parsed.match_resource.is_some() {
            split_query(&resource).0
        } else {
            resource_path
        };

        let facts = RuleFacts {
            resource: resource_path,
            real_resource,
            resource_query,
            issuer: context_info.issuer.as_deref(),
            compiler: context_info.compiler.as_deref(),
        };

        let mut settings = Settings::new();
        let mut post: Vec<LoaderSpec> = Vec::new();
        let mut normal: Vec<LoaderSpec> = Vec::new();
        let mut pre: Vec<LoaderSpec> = Vec::new();
        let suppressed = |enforce: Enforce| match enforce {
            Enforce::Post => parsed.suppress_post,
            Enforce::Normal => parsed.suppress_normal,
            Enforce::Pre => parsed.suppress_pre,
        };
        for effect in self.rules.exec(&facts) {
            match effect {
                RuleEffect::Use { enforce, .. } | RuleEffect::MalformedUse { enforce, .. }
                    if suppressed(enforce) => {}
                RuleEffect::Use { value, enforce } => match enforce {
                    Enforce::Post => post.push(value),
                    Enforce::Normal => normal.push(value),
                    Enforce::Pre => pre.push(value),
                },
                RuleEffect::MalformedUse { loader, found, .. } => {
                    return Err(FactoryError::MalformedOptions { loader, found });
                }
                RuleEffect::Setting { key, value } => settings.apply(&key, value),
            }
        }

        let (post, normal, pre) = futures::join!(
            resolve_loaders(delegate, &self.rules, &context_info, &self.context, &post, &loader_options),
            resolve_loaders(delegate, &self.rules, &context_info, &self.context, &normal, &loader_options),
            resolve_loaders(delegate, &self.rules, &context_info, &self.context, &pre, &loader_options),
        );
        let mut loaders = post?;
        loaders.extend(inline);
        loaders.extend(normal?);
        loaders.extend(pre?);

        let module_type = settings
            .get_str("type")
            .unwrap_or(DEFAULT_MODULE_TYPE)
            .to_string();
        let parser = self.get_parser(&module_type, settings.get("parser"))?;
        let generator = self.get_generator(&module_type, settings.get("generator"))?;
        let resolve_options = settings.get("resolve").cloned().unwrap_or_else(|| json!({}));

        debug!(
            request = %raw_request,
            loaders = loaders.len(),
            module_type = %module_type,
            "resolved module"
        );

        let descriptor = ModuleDescriptor {
            request: compound_request(&loaders, &resource),
            user_request,
            raw_request,
            resource_path: resource_path.to_string(),
            resource_query: resource_query.to_string(),
            match_resource: parsed.match_resource.clone(),
            context,
            loaders,
            resource,
            resource_resolve_data,
            settings,
            module_type,
            resolve_options,
            parser,
            generator,
        };

        Ok(Resolved::Data(ResolveData {
            descriptor,
            context_info,
            dependencies,
        }))
    }

    /// The parser for `module_type` with `options`, built on first use.
    pub fn get_parser(&self, module_type: &str, options: Option<&Value>) -> Result<ParserHandle, FactoryError> {
        let key = instance_key(module_type, options);
        self.parser_cache.get_or_try_insert_with(&key, || {
            let options = options.cloned().unwrap_or_else(|| json!({}));
            let parser = self
                .hooks
                .create_parser
                .for_key(module_type)
                .call(&options)?
                .ok_or_else(|| unregistered(Capability::Parser, module_type))?;
            debug!(module_type, key = %key, "created parser");
            self.hooks
                .parser
                .for_key(module_type)
                .call(&(Arc::clone(&parser), options));
            Ok(parser)
        })
    }

    /// The generator for `module_type` with `options`, built on first use.
    pub fn get_generator(
        &self,
        module_type: &str,
        options: Option<&Value>,
    ) -> Result<GeneratorHandle, FactoryError> {
        let key = instance_key(module_type, options);
        self.generator_cache.get_or_try_insert_with(&key, || {
            let options = options.cloned().unwrap_or_else(|| json!({}));
            let generator = self
                .hooks
                .create_generator
                .for_key(module_type)
                .call(&options)?
                .ok_or_else(|| unregistered(Capability::Generator, module_type))?;
            debug!(module_type, key = %key, "created generator");
            self.hooks
                .generator
                .for_key(module_type)
                .call(&(Arc::clone(&generator), options));
            Ok(generator)
        })
    }
}

impl fmt::Debug for NormalModuleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalModuleFactory")
            .field("context", &self.context)
            .field("rules", &self.rules.len())
            .field("cache_predicate", &self.cache_predicate)
            .finish_non_exhaustive()
    }
}

fn unregistered(capability: Capability, module_type: &str) -> FactoryError {
    FactoryError::UnregisteredCapability {
        capability,
        module_type: module_type.to_string(),
    }
}

/// Loader idents followed by the resource, joined by `!`.
fn compound_request(loaders: &[ResolvedLoader], resource: &str) -> String {
    loaders
        .iter()
        .map(ResolvedLoader::to_ident)
        .chain(std::iter::once(resource.to_string()))
        .collect::<Vec<_>>()
        .join("!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::LoaderOptions;

    #[test]
    fn test_compound_request() {
        let loaders = vec![
            ResolvedLoader {
                loader: "/l/a.js".into(),
                options: LoaderOptions::None,
                ident: None,
            },
            ResolvedLoader {
                loader: "/l/b.js".into(),
                options: LoaderOptions::Inline("x".into()),
                ident: None,
            },
        ];
        assert_eq!(compound_request(&loaders, "/r.js?q"), "/l/a.js!/l/b.js?x!/r.js?q");
        assert_eq!(compound_request(&[], ""), "");
    }

    #[test]
    fn test_cache_predicate_flag() {
        let module = Module::from(RawModule::ignored("/", "x"));
        assert!(CachePredicate::Flag(true).accepts(&module));
        assert!(!CachePredicate::Flag(false).accepts(&module));
        let custom = CachePredicate::Custom(Arc::new(|m: &Module| !m.is_ignored()));
        assert!(!custom.accepts(&module));
    }
}
