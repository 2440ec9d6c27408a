use std::collections::HashMap;
use std::sync::Arc;

use super::CryptoBackend;
use crate::keys::Protocol;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub protocol: Protocol,
    pub name: String,
}

/// Explicit replacement for a process-wide backend singleton: tasks receive
/// an `Arc<BackendFactory>` at construction.
#[derive(Default)]
pub struct BackendFactory {
    backends: HashMap<Protocol, Arc<dyn CryptoBackend>>,
}

impl BackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend for its protocol, replacing any previous one.
    pub fn register(&mut self, backend: Arc<dyn CryptoBackend>) {
        let protocol = backend.protocol();
        if let Some(previous) = self.backends.insert(protocol, backend) {
            tracing::debug!(
                "Replaced {} backend '{}'",
                protocol.display_name(),
                previous.name()
            );
        }
    }

    /// Builder-style [`BackendFactory::register`].
    pub fn with(mut self, backend: Arc<dyn CryptoBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn protocol(&self, protocol: Protocol) -> Option<Arc<dyn CryptoBackend>> {
        self.backends.get(&protocol).cloned()
    }

    pub fn list(&self) -> Vec<BackendInfo> {
        let mut list: Vec<_> = self
            .backends
            .values()
            .map(|backend| BackendInfo {
                protocol: backend.protocol(),
                name: backend.name().to_string(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }
}
