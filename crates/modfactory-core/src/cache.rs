//! Factory caches.
//!
//! - [`DependencyCache`]: dependency identity to created module. Holds only
//!   weak references to dependencies, so dropping the last handle to a
//!   dependency makes its entry unreachable. Unreachable entries are swept
//!   whenever the map has doubled since the previous sweep, which keeps
//!   inserts amortized O(1).
//! - [`InstanceCache`]: parser and generator instances keyed by
//!   [`instance_key`]. Entries live as long as the factory.

use crate::module::{Dependency, Module};
use modfactory_util::hash::json_digest;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Map size below which dead entries are never swept.
const MIN_SWEEP_LEN: usize = 64;

#[derive(Debug)]
struct Entries {
    map: HashMap<usize, (Weak<Dependency>, Module)>,
    /// Sweep dead entries once `map` reaches this size.
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: MIN_SWEEP_LEN,
        }
    }
}

/// Created modules keyed by the identity of their dependency.
#[derive(Debug, Default)]
pub struct DependencyCache {
    entries: RwLock<Entries>,
}

fn identity(dependency: &Arc<Dependency>) -> usize {
    Arc::as_ptr(dependency) as usize
}

impl DependencyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The module cached for exactly this dependency handle.
    pub fn get(&self, dependency: &Arc<Dependency>) -> Option<Module> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let (weak, module) = entries.map.get(&identity(dependency))?;
        let alive = weak.upgrade()?;
        Arc::ptr_eq(&alive, dependency).then(|| module.clone())
    }

    /// Cache `module` for `dependency`.
    pub fn insert(&self, dependency: &Arc<Dependency>, module: Module) {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entries = &mut *guard;
        if entries.map.len() >= entries.sweep_at {
            entries.map.retain(|_, (weak, _)| weak.strong_count() > 0);
            entries.sweep_at = (entries.map.len() * 2).max(MIN_SWEEP_LEN);
        }
        entries
            .map
            .insert(identity(dependency), (Arc::downgrade(dependency), module));
    }

    /// Number of entries whose dependency is still alive.
    #[must_use]
    pub fn live_entries(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .map
            .values()
            .filter(|(weak, _)| weak.strong_count() > 0)
            .count()
    }
}

/// Cache key for a parser or generator instance.
///
/// `type` without options, `type|ident` when the options carry a string
/// `ident`, otherwise `type#<digest of the canonical options>`.
#[must_use]
pub fn instance_key(module_type: &str, options: Option<&Value>) -> String {
    match options {
        None | Some(Value::Null) => module_type.to_string(),
        Some(options) => match options.get("ident").and_then(Value::as_str) {
            Some(ident) => format!("{module_type}|{ident}"),
            None => format!("{module_type}#{}", json_digest(options)),
        },
    }
}

/// Process-lifetime map from [`instance_key`] to an instance.
pub struct InstanceCache<T> {
    entries: RwLock<HashMap<String, T>>,
}

impl<T: Clone> InstanceCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The cached instance for `key`, building one with `create` on a miss.
    ///
    /// `create` runs without the lock held. If two callers race on the same
    /// key, both build and the later insert wins.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(hit.clone());
        }

        let created = create()?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), created.clone());
        Ok(created)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for InstanceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for InstanceCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::RawModule;
    use serde_json::json;

    fn module(name: &str) -> Module {
        Module::from(RawModule::ignored("/", name))
    }

    #[test]
    fn test_dependency_cache_uses_identity() {
        let cache = DependencyCache::new();
        let a = Dependency::new("./x");
        let twin = Dependency::new("./x");

        cache.insert(&a, module("x"));
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&twin).is_none());
        assert!(cache.get(&Arc::clone(&a)).is_some());
    }

    #[test]
    fn test_dependency_cache_is_weak() {
        let cache = DependencyCache::new();
        let a = Dependency::new("./a");
        cache.insert(&a, module("a"));
        assert_eq!(cache.live_entries(), 1);

        drop(a);
        assert_eq!(cache.live_entries(), 0);
        assert!(cache.get(&Dependency::new("./a")).is_none());
    }

    #[test]
    fn test_dependency_cache_sweeps_dead_entries_when_doubled() {
        let cache = DependencyCache::new();
        let doomed: Vec<_> = (0..MIN_SWEEP_LEN)
            .map(|i| Dependency::new(format!("./dead{i}")))
            .collect();
        for dep in &doomed {
            cache.insert(dep, module("dead"));
        }
        drop(doomed);
        assert_eq!(cache.entries.read().unwrap().map.len(), MIN_SWEEP_LEN);
        assert_eq!(cache.live_entries(), 0);

        let live = Dependency::new("./live");
        cache.insert(&live, module("live"));
        assert_eq!(cache.entries.read().unwrap().map.len(), 1);
        assert_eq!(cache.live_entries(), 1);
        assert!(cache.get(&live).is_some());
    }

    #[test]
    fn test_dependency_cache_keeps_live_entries_across_sweeps() {
        let cache = DependencyCache::new();
        let live: Vec<_> = (0..1_000)
            .map(|i| Dependency::new(format!("./m{i}")))
            .collect();
        for dep in &live {
            cache.insert(dep, module("m"));
        }

        assert_eq!(cache.live_entries(), live.len());
        assert!(live.iter().all(|dep| cache.get(dep).is_some()));
        // Thresholds only grow while nothing dies, so sweeps stay rare.
        assert!(cache.entries.read().unwrap().sweep_at >= live.len());
    }

    #[test]
    fn test_instance_key_forms() {
        assert_eq!(instance_key("json", None), "json");
        assert_eq!(instance_key("json", Some(&Value::Null)), "json");
        assert_eq!(instance_key("css", Some(&json!({"ident": "x", "a": 1}))), "css|x");

        let a = instance_key("css", Some(&json!({"a": 1, "b": [1, 2]})));
        let b = instance_key("css", Some(&json!({"b": [1, 2], "a": 1})));
        assert_eq!(a, b);
        assert!(a.starts_with("css#"));
        assert_ne!(a, instance_key("css", Some(&json!({"a": 2}))));
    }

    #[test]
    fn test_instance_cache_builds_once() {
        let cache: InstanceCache<Arc<String>> = InstanceCache::new();
        let first = cache
            .get_or_try_insert_with("k", || Ok::<_, ()>(Arc::new("a".to_string())))
            .unwrap();
        let second = cache
            .get_or_try_insert_with("k", || -> Result<Arc<String>, ()> { panic!("rebuilt") })
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_instance_cache_does_not_store_failures() {
        let cache: InstanceCache<u32> = InstanceCache::new();
        assert_eq!(cache.get_or_try_insert_with("k", || Err("boom")), Err("boom"));
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_try_insert_with("k", || Ok::<_, &str>(7)), Ok(7));
    }
}
