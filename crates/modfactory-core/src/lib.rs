#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod builtin;
pub mod cache;
pub mod config;
pub mod error;
pub mod factory;
pub mod hooks;
pub mod loaders;
pub mod module;
pub mod request;
pub mod resolve;
pub mod rules;
pub mod version;

pub use config::{load_config, Config, CONFIG_FILE};
pub use error::{Error, FactoryError, ResolutionError};
pub use factory::{FactoryHooks, NormalModuleFactory, Resolved};
pub use module::{Dependency, Module, ModuleDescriptor, RawModule, ResolveData, ResolveRequest};
pub use request::{parse, LoaderOptions, LoaderSpec, ParsedRequest, ResolvedLoader};
pub use resolve::{ContextInfo, FsResolver, Resolution, ResolutionDelegate, ResolverKind};
pub use rules::{RawRule, RuleEffect, RuleFacts, RuleSet};
pub use version::{version_string, OUTPUT_SCHEMA_VERSION, VERSION};
