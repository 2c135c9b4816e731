//! Processor registry - name-keyed factories
//!
//! The registry maps processor names to factory functions so configuration
//! can pick processors by name. It is a value built once at startup
//! ([`ProcessorRegistry::builtin`]) and immutable afterwards.

use std::collections::HashMap;

use crate::count::CountFactory;
use crate::rate::RateFactory;
use crate::{Processor, ProcessorError};

/// Options table for one processor (`[processor_opts.<name>]`)
pub type ProcessorOpts = toml::Table;

/// Factory trait for creating processors
pub trait ProcessorFactory: Send + Sync {
    /// The name used in configuration and `proc` tags
    fn name(&self) -> &'static str;

    /// Create a processor instance from its options table
    fn create(&self, opts: &ProcessorOpts) -> Result<Box<dyn Processor>, ProcessorError>;
}

/// Registry of processor factories.
pub struct ProcessorRegistry {
    factories: HashMap<&'static str, Box<dyn ProcessorFactory>>,
}

impl ProcessorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in processors (`count`, `rate`)
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CountFactory));
        registry.register(Box::new(RateFactory));
        registry
    }

    /// Register a factory under its own name
    pub fn register(&mut self, factory: Box<dyn ProcessorFactory>) {
        self.factories.insert(factory.name(), factory);
    }

    /// Check if a processor name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Create a processor by name
    pub fn create(
        &self,
        name: &str,
        opts: &ProcessorOpts,
    ) -> Result<Box<dyn Processor>, ProcessorError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ProcessorError::Unknown {
                name: name.into(),
                available: self.names().join(", "),
            })?;
        factory.create(opts)
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Read an integer option as usize, tolerating absence.
pub(crate) fn opt_usize(opts: &ProcessorOpts, key: &str) -> Result<Option<usize>, ProcessorError> {
    match opts.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .filter(|v| *v >= 0)
            .map(|v| Some(v as usize))
            .ok_or_else(|| {
                ProcessorError::config(format!("`{key}` must be a non-negative integer"))
            }),
    }
}
