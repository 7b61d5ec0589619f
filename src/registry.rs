//! Packet Registry: the in-memory mapping of packet keys to Handler
//! Records. Leaf component for both the Execution Engine and the Router.
//!
//! Grounded on the teacher's `AgentRegistry` (`agent.rs`) and
//! `AgentRegistryImpl` (`message_router/implementations/agent_registry.rs`):
//! a `DashMap` gives lock-free concurrent lookups and serializes only the
//! individual key's insert/remove, matching the "readers-many,
//! writers-few" policy.

use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::handler::{Handler, HandlerMetadata, HandlerRecord};
use crate::domain::PacketKey;

/// `Registry::register` outcome when a key is already occupied and the
/// caller did not pass `replace`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("packet key {0} is already registered")]
pub struct DuplicateKeyError(pub String);

/// The live set of Handler Records, keyed by canonical packet key.
#[derive(Default)]
pub struct Registry {
    handlers: DashMap<PacketKey, Arc<HandlerRecord>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Registry {
            handlers: DashMap::new(),
        }
    }

    /// Register `handler` under `key`. Rejects an occupied key unless
    /// `replace` is set, in which case the old record is dropped and the
    /// new one installed atomically.
    pub fn register(
        &self,
        key: PacketKey,
        handler: Arc<dyn Handler>,
        replace: bool,
    ) -> Result<(), DuplicateKeyError> {
        if !replace && self.handlers.contains_key(&key) {
            return Err(DuplicateKeyError(key.to_string()));
        }
        self.handlers
            .insert(key, Arc::new(HandlerRecord::new(handler)));
        Ok(())
    }

    /// Constant-time retrieval of the record registered under `key`.
    #[must_use]
    pub fn lookup(&self, key: &PacketKey) -> Option<Arc<HandlerRecord>> {
        self.handlers.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// All registered keys and their metadata, for introspection
    /// endpoints. Order is unspecified.
    #[must_use]
    pub fn list(&self) -> Vec<(PacketKey, HandlerMetadata)> {
        self.handlers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metadata().clone()))
            .collect()
    }

    /// Remove the record registered under `key`, if any.
    pub fn deregister(&self, key: &PacketKey) -> Option<Arc<HandlerRecord>> {
        self.handlers.remove(key).map(|(_, record)| record)
    }

    /// Number of currently registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;
    use crate::engine::ExecutionContext;
    use crate::error::PacketFlowError;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn invoke(&self, payload: &Value, _ctx: &ExecutionContext) -> Result<Value, PacketFlowError> {
            Ok(payload.clone())
        }

        fn describe(&self) -> HandlerMetadata {
            HandlerMetadata::new("echoes its input")
        }
    }

    fn key(element: &str) -> PacketKey {
        PacketKey::new("cf", element, None).unwrap()
    }

    #[test]
    fn register_then_lookup_then_deregister_then_missing() {
        let registry = Registry::new();
        let k = key("ping");
        registry.register(k.clone(), Arc::new(Echo), false).unwrap();
        assert!(registry.lookup(&k).is_some());
        registry.deregister(&k);
        assert!(registry.lookup(&k).is_none());
    }

    #[test]
    fn duplicate_registration_rejected_without_replace() {
        let registry = Registry::new();
        let k = key("ping");
        registry.register(k.clone(), Arc::new(Echo), false).unwrap();
        let result = registry.register(k.clone(), Arc::new(Echo), false);
        assert!(result.is_err());
    }

    #[test]
    fn replace_flag_overwrites_existing_entry() {
        let registry = Registry::new();
        let k = key("ping");
        registry.register(k.clone(), Arc::new(Echo), false).unwrap();
        registry.register(k.clone(), Arc::new(Echo), true).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn list_reflects_registered_keys() {
        let registry = Registry::new();
        registry.register(key("ping"), Arc::new(Echo), false).unwrap();
        registry.register(key("pong"), Arc::new(Echo), false).unwrap();
        assert_eq!(registry.list().len(), 2);
    }
}
