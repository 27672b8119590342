//! Built-in parser and generator capabilities.
//!
//! The real parsers live outside the factory; these placeholders record the
//! module type and options they were created with so every default module
//! type has a capability registered.

use crate::factory::FactoryHooks;
use crate::module::{Generator, GeneratorHandle, Parser, ParserHandle};
use serde_json::Value;
use std::sync::Arc;

/// Module types the default rules can produce.
pub const BUILTIN_MODULE_TYPES: &[&str] = &[
    "javascript/auto",
    "javascript/dynamic",
    "javascript/esm",
    "json",
    "webassembly/experimental",
];

const TAP_NAME: &str = "BuiltinCapabilities";

#[derive(Debug, Clone, PartialEq)]
pub struct BasicParser {
    pub module_type: String,
    pub options: Value,
}

impl Parser for BasicParser {
    fn module_type(&self) -> &str {
        &self.module_type
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicGenerator {
    pub module_type: String,
    pub options: Value,
}

impl Generator for BasicGenerator {
    fn module_type(&self) -> &str {
        &self.module_type
    }
}

/// Tap `create_parser` and `create_generator` for every built-in type.
pub fn register_builtin_capabilities(hooks: &FactoryHooks) {
    for module_type in BUILTIN_MODULE_TYPES {
        hooks
            .create_parser
            .for_key(module_type)
            .tap(TAP_NAME, move |options: &Value| {
                let parser: ParserHandle = Arc::new(BasicParser {
                    module_type: (*module_type).to_string(),
                    options: options.clone(),
                });
                Ok(Some(parser))
            });

        hooks
            .create_generator
            .for_key(module_type)
            .tap(TAP_NAME, move |options: &Value| {
                let generator: GeneratorHandle = Arc::new(BasicGenerator {
                    module_type: (*module_type).to_string(),
                    options: options.clone(),
                });
                Ok(Some(generator))
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_builtin_type_has_capabilities() {
        let hooks = FactoryHooks::default();
        register_builtin_capabilities(&hooks);

        for module_type in BUILTIN_MODULE_TYPES {
            let parser = hooks
                .create_parser
                .for_key(module_type)
                .call(&json!({"a": 1}))
                .unwrap()
                .unwrap();
            assert_eq!(parser.module_type(), *module_type);

            let generator = hooks
                .create_generator
                .for_key(module_type)
                .call(&json!({}))
                .unwrap()
                .unwrap();
            assert_eq!(generator.module_type(), *module_type);
        }

        assert!(hooks.create_parser.for_key("css").call(&json!({})).unwrap().is_none());
    }
}
