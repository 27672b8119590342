//! Extension points for the module factory.
//!
//! Collaborators tap named hooks to observe or rewrite intermediate results.
//! Three disciplines are supported:
//!
//! - **Waterfall** ([`SyncWaterfallHook`], [`AsyncWaterfallHook`]): taps run in
//!   registration order, each seeing the previous tap's value, and answer
//!   [`Waterfall::Replace`] or [`Waterfall::Unchanged`].
//! - **Bail** ([`SyncBailHook`]): the first tap answering `Some` wins.
//! - **Multicast** ([`SyncHook`]): every tap runs, nothing is returned.
//!
//! [`HookMap`] keys hooks by a free-form string (a module type) and creates
//! them on first access.
//!
//! ## Example
//!
//! ```ignore
//! use modfactory_core::hooks::{SyncWaterfallHook, Waterfall};
//!
//! let hook: SyncWaterfallHook<String> = SyncWaterfallHook::new("rename");
//! hook.tap("upper", |value, _| Ok(Waterfall::Replace(value.to_uppercase())));
//! assert_eq!(hook.call("a".to_string(), &())?, "A");
//! ```

#![allow(clippy::type_complexity)]

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Result type for hook taps.
pub type HookResult<T> = Result<T, HookError>;

/// Error from a hook tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookError {
    /// Hook that was being called.
    pub hook: &'static str,
    /// Name of the tap that failed.
    pub tap: String,
    /// Error message.
    pub message: String,
}

impl HookError {
    /// Create an error from inside a tap. The hook fills in where it happened.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            hook: "",
            tap: String::new(),
            message: message.into(),
        }
    }

    fn at(mut self, hook: &'static str, tap: &str) -> Self {
        if self.hook.is_empty() {
            self.hook = hook;
        }
        if self.tap.is_empty() {
            self.tap = tap.to_string();
        }
        self
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.tap, self.hook, self.message)
    }
}

impl std::error::Error for HookError {}

/// Answer of a waterfall tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Waterfall<T> {
    /// Pass the current value on untouched.
    Unchanged,
    /// Replace the current value.
    Replace(T),
}

/// Hooks that can be created from just a diagnostic name (for [`HookMap`]).
pub trait NamedHook {
    fn named(name: &'static str) -> Self;
}

struct Tap<F: ?Sized> {
    name: String,
    f: Arc<F>,
}

impl<F: ?Sized> Clone for Tap<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            f: Arc::clone(&self.f),
        }
    }
}

/// Tap list behind a lock; calls work on a snapshot so no tap runs under it.
struct Taps<F: ?Sized> {
    inner: RwLock<Vec<Tap<F>>>,
}

impl<F: ?Sized> Taps<F> {
    fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }

    fn push(&self, name: String, f: Arc<F>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Tap { name, f });
    }

    fn snapshot(&self) -> Vec<Tap<F>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn names(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|t| t.name).collect()
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// ============================================================================
// Waterfall
// ============================================================================

type SyncWaterfallFn<T, A> = dyn Fn(&T, &A) -> HookResult<Waterfall<T>> + Send + Sync;

/// Synchronous waterfall: threads a value through every tap.
pub struct SyncWaterfallHook<T, A = ()> {
    name: &'static str,
    taps: Taps<SyncWaterfallFn<T, A>>,
}

impl<T, A> SyncWaterfallHook<T, A> {
    /// Create an empty hook.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: Taps::new(),
        }
    }

    /// Register a tap.
    pub fn tap<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&T, &A) -> HookResult<Waterfall<T>> + Send + Sync + 'static,
    {
        self.taps.push(name.into(), Arc::new(f));
    }

    /// Run every tap in order, starting from `seed`.
    pub fn call(&self, seed: T, args: &A) -> HookResult<T> {
        let mut current = seed;
        for tap in self.taps.snapshot() {
            match (tap.f)(&current, args).map_err(|e| e.at(self.name, &tap.name))? {
                Waterfall::Replace(next) => current = next,
                Waterfall::Unchanged => {}
            }
        }
        Ok(current)
    }

    /// Whether any tap is registered.
    pub fn is_used(&self) -> bool {
        self.taps.len() > 0
    }

    /// Tap names in registration order.
    pub fn tap_names(&self) -> Vec<String> {
        self.taps.names()
    }
}

impl<T, A> NamedHook for SyncWaterfallHook<T, A> {
    fn named(name: &'static str) -> Self {
        Self::new(name)
    }
}

type AsyncWaterfallFn<T> =
    dyn Fn(T) -> BoxFuture<'static, HookResult<Waterfall<T>>> + Send + Sync;

/// Asynchronous waterfall: like [`SyncWaterfallHook`] but taps may suspend.
///
/// Each tap receives its own clone of the current value.
pub struct AsyncWaterfallHook<T> {
    name: &'static str,
    taps: Taps<AsyncWaterfallFn<T>>,
}

impl<T> AsyncWaterfallHook<T>
where
    T: Clone + Send + 'static,
{
    /// Create an empty hook.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: Taps::new(),
        }
    }

    /// Register an asynchronous tap.
    pub fn tap_async<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult<Waterfall<T>>> + Send + 'static,
    {
        let f: Arc<AsyncWaterfallFn<T>> =
            Arc::new(move |value: T| -> BoxFuture<'static, HookResult<Waterfall<T>>> {
                Box::pin(f(value))
            });
        self.taps.push(name.into(), f);
    }

    /// Register a tap that answers without suspending.
    pub fn tap<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&T) -> HookResult<Waterfall<T>> + Send + Sync + 'static,
    {
        self.tap_async(name, move |value: T| {
            let answer = f(&value);
            async move { answer }
        });
    }

    /// Run every tap in order, starting from `seed`.
    pub async fn call(&self, seed: T) -> HookResult<T> {
        let mut current = seed;
        for tap in self.taps.snapshot() {
            let answer = (tap.f)(current.clone())
                .await
                .map_err(|e| e.at(self.name, &tap.name))?;
            if let Waterfall::Replace(next) = answer {
                current = next;
            }
        }
        Ok(current)
    }

    /// Whether any tap is registered.
    pub fn is_used(&self) -> bool {
        self.taps.len() > 0
    }
}

impl<T: Clone + Send + 'static> NamedHook for AsyncWaterfallHook<T> {
    fn named(name: &'static str) -> Self {
        Self::new(name)
    }
}

// ============================================================================
// Bail
// ============================================================================

type BailFn<A, R> = dyn Fn(&A) -> HookResult<Option<R>> + Send + Sync;

/// Bail hook: the first tap producing a result stops the chain.
pub struct SyncBailHook<A, R> {
    name: &'static str,
    taps: Taps<BailFn<A, R>>,
}

impl<A, R> SyncBailHook<A, R> {
    /// Create an empty hook.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: Taps::new(),
        }
    }

    /// Register a tap.
    pub fn tap<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&A) -> HookResult<Option<R>> + Send + Sync + 'static,
    {
        self.taps.push(name.into(), Arc::new(f));
    }

    /// Return the first `Some` any tap produces, or `None` if none did.
    pub fn call(&self, args: &A) -> HookResult<Option<R>> {
        for tap in self.taps.snapshot() {
            if let Some(result) = (tap.f)(args).map_err(|e| e.at(self.name, &tap.name))? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Whether any tap is registered.
    pub fn is_used(&self) -> bool {
        self.taps.len() > 0
    }
}

impl<A, R> NamedHook for SyncBailHook<A, R> {
    fn named(name: &'static str) -> Self {
        Self::new(name)
    }
}

// ============================================================================
// Multicast
// ============================================================================

type ObserveFn<A> = dyn Fn(&A) + Send + Sync;

/// Multicast hook for pure observation.
pub struct SyncHook<A> {
    taps: Taps<ObserveFn<A>>,
}

impl<A> SyncHook<A> {
    /// Create an empty hook.
    #[must_use]
    pub fn new() -> Self {
        Self { taps: Taps::new() }
    }

    /// Register a tap.
    pub fn tap<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.taps.push(name.into(), Arc::new(f));
    }

    /// Run every tap.
    pub fn call(&self, args: &A) {
        for tap in self.taps.snapshot() {
            (tap.f)(args);
        }
    }

    /// Whether any tap is registered.
    pub fn is_used(&self) -> bool {
        self.taps.len() > 0
    }
}

impl<A> Default for SyncHook<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> NamedHook for SyncHook<A> {
    fn named(_name: &'static str) -> Self {
        Self::new()
    }
}

// ============================================================================
// HookMap
// ============================================================================

/// Hooks keyed by a string, created lazily on first access.
pub struct HookMap<H> {
    name: &'static str,
    hooks: RwLock<HashMap<String, Arc<H>>>,
}

impl<H: NamedHook> HookMap<H> {
    /// Create an empty map whose hooks share `name` for diagnostics.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// The hook for `key`, created if this is the first access.
    pub fn for_key(&self, key: &str) -> Arc<H> {
        if let Some(hook) = self.get(key) {
            return hook;
        }
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            hooks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(H::named(self.name))),
        )
    }

    /// The hook for `key`, if it was ever accessed.
    pub fn get(&self, key: &str) -> Option<Arc<H>> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Keys accessed so far, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl<H> fmt::Debug for HookMap<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookMap").field("name", &self.name).finish_non_exhaustive()
    }
}
