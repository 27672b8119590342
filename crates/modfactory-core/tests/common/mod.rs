//! Scripted in-memory resolution delegate for factory tests.

#![allow(dead_code)]

use async_trait::async_trait;
use modfactory_core::rules::RawRule;
use modfactory_core::{
    Config, ContextInfo, NormalModuleFactory, Resolution, ResolutionDelegate, ResolutionError,
    ResolverKind,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Outcome {
    Path(String),
    Ignore,
}

/// Answers from a fixed table after a per-entry delay; unknown requests fail.
#[derive(Debug, Default)]
pub struct Scripted {
    entries: HashMap<(ResolverKind, String), (Outcome, u64)>,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loader(mut self, name: &str, path: &str, delay_ms: u64) -> Self {
        self.entries.insert(
            (ResolverKind::Loader, name.to_string()),
            (Outcome::Path(path.to_string()), delay_ms),
        );
        self
    }

    pub fn resource(mut self, request: &str, path: &str, delay_ms: u64) -> Self {
        self.entries.insert(
            (ResolverKind::Normal, request.to_string()),
            (Outcome::Path(path.to_string()), delay_ms),
        );
        self
    }

    pub fn ignore(mut self, request: &str) -> Self {
        self.entries
            .insert((ResolverKind::Normal, request.to_string()), (Outcome::Ignore, 0));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResolutionDelegate for Scripted {
    async fn resolve(
        &self,
        kind: ResolverKind,
        _info: &ContextInfo,
        context: &str,
        request: &str,
        _options: &Value,
    ) -> Result<Resolution, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some((outcome, delay)) = self.entries.get(&(kind, request.to_string())).cloned() else {
            return Err(ResolutionError::new(request, context, "Module not found"));
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(match outcome {
            Outcome::Path(path) => Resolution::resolved(path),
            Outcome::Ignore => Resolution::Ignored,
        })
    }
}

/// Rules from JSON.
pub fn rules(json: Value) -> Vec<RawRule> {
    serde_json::from_value(json).unwrap()
}

/// A factory at `/app` with default rules, built-in capabilities and `rules`.
pub fn factory(delegate: Arc<Scripted>, rules: Vec<RawRule>) -> NormalModuleFactory {
    let mut config = Config::new("/app");
    config.rules = rules;
    NormalModuleFactory::from_config(&config, delegate).unwrap()
}
