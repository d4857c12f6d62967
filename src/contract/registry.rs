//! Name -> handler registry.

use crate::error::{LedgerError, Result};
use crate::record::{check_arity, RecordSchema};
use crate::service::{
    RecordService, CREATE_ASSET, GET_ASSET_HISTORY, QUERY_ASSET, UPDATE_ASSET,
};
use std::collections::HashMap;

/// Names every registry must serve, and nothing else.
pub const FUNCTION_NAMES: [&str; 4] = [CREATE_ASSET, UPDATE_ASSET, QUERY_ASSET, GET_ASSET_HISTORY];

/// A named operation callable with positional string arguments.
pub trait Function: Send + Sync {
    /// Exact number of arguments accepted.
    fn arity(&self) -> usize;

    fn call(&self, args: &[String]) -> Result<Vec<u8>>;
}

struct CreateHandler<R: RecordSchema>(RecordService<R>);

impl<R: RecordSchema> Function for CreateHandler<R> {
    fn arity(&self) -> usize {
        R::ARITY
    }

    fn call(&self, args: &[String]) -> Result<Vec<u8>> {
        self.0.create(args)?;
        Ok(Vec::new())
    }
}

struct UpdateHandler<R: RecordSchema>(RecordService<R>);

impl<R: RecordSchema> Function for UpdateHandler<R> {
    fn arity(&self) -> usize {
        R::ARITY
    }

    fn call(&self, args: &[String]) -> Result<Vec<u8>> {
        self.0.update(args)?;
        Ok(Vec::new())
    }
}

struct QueryHandler<R: RecordSchema>(RecordService<R>);

impl<R: RecordSchema> Function for QueryHandler<R> {
    fn arity(&self) -> usize {
        1
    }

    fn call(&self, args: &[String]) -> Result<Vec<u8>> {
        check_arity(args, 1)?;
        self.0.query(&args[0])
    }
}

struct HistoryHandler<R: RecordSchema>(RecordService<R>);

impl<R: RecordSchema> Function for HistoryHandler<R> {
    fn arity(&self) -> usize {
        1
    }

    fn call(&self, args: &[String]) -> Result<Vec<u8>> {
        check_arity(args, 1)?;
        self.0.history(&args[0])
    }
}

/// Handlers keyed by invocation name.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Box<dyn Function>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four record handlers over `service`.
    pub fn for_service<R: RecordSchema>(service: RecordService<R>) -> Self {
        let mut registry = Self::new();
        registry.register(CREATE_ASSET, CreateHandler(service.clone()));
        registry.register(UPDATE_ASSET, UpdateHandler(service.clone()));
        registry.register(QUERY_ASSET, QueryHandler(service.clone()));
        registry.register(GET_ASSET_HISTORY, HistoryHandler(service));
        registry
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn register<F: Function + 'static>(&mut self, name: &str, handler: F) {
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Function> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Fail unless exactly the names in [`FUNCTION_NAMES`] are registered.
    pub fn validate(&self) -> Result<()> {
        let mut missing: Vec<&str> = FUNCTION_NAMES
            .iter()
            .copied()
            .filter(|name| !self.handlers.contains_key(*name))
            .collect();
        missing.sort_unstable();
        if !missing.is_empty() {
            return Err(LedgerError::Config(format!(
                "Missing handlers: {}",
                missing.join(", ")
            )));
        }

        let mut extra: Vec<&str> = self
            .handlers
            .keys()
            .map(String::as_str)
            .filter(|name| !FUNCTION_NAMES.contains(name))
            .collect();
        extra.sort_unstable();
        if !extra.is_empty() {
            return Err(LedgerError::Config(format!(
                "Unrecognized handlers: {}",
                extra.join(", ")
            )));
        }

        Ok(())
    }
}
