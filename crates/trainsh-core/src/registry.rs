//! Scheme to transport resolution.

use std::{collections::BTreeMap, sync::Arc};

use crate::{Connection, TargetDescriptor, Transport, TransportError};

/// Explicit table of available transports, keyed by URL scheme.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: BTreeMap<&'static str, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport, replacing any previous one for the same scheme.
    pub fn register<T: Transport + 'static>(&mut self, transport: T) {
        self.transports.insert(transport.scheme(), Arc::new(transport));
    }

    /// Builder-style `register`.
    #[must_use]
    pub fn with<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.register(transport);
        self
    }

    /// Find the transport for a scheme.
    ///
    /// # Errors
    /// Returns `PluginNotFound` if no transport handles the scheme.
    pub fn resolve(&self, scheme: &str) -> Result<Arc<dyn Transport>, TransportError> {
        self.transports
            .get(scheme)
            .cloned()
            .ok_or_else(|| TransportError::PluginNotFound(scheme.to_string()))
    }

    /// Open a connection to the target through the matching transport.
    ///
    /// # Errors
    /// Returns `PluginNotFound` or the transport's own connect error.
    pub async fn connect(
        &self,
        target: &TargetDescriptor,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let transport = self.resolve(target.scheme())?;
        tracing::debug!(url = %target, "Opening connection");
        transport.connect(target).await
    }

    /// Registered schemes, sorted.
    #[must_use]
    pub fn schemes(&self) -> Vec<&'static str> {
        self.transports.keys().copied().collect()
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeTransport;

    #[tokio::test]
    async fn test_unknown_scheme_is_plugin_not_found() {
        let registry = TransportRegistry::new().with(FakeTransport::posix());
        let target = TargetDescriptor::parse("telnet://127.0.0.1").unwrap();
        let err = registry.connect(&target).await.err().unwrap();
        assert!(matches!(err, TransportError::PluginNotFound(ref s) if s == "telnet"));
    }

    #[tokio::test]
    async fn test_connects_through_matching_scheme() {
        let fake = FakeTransport::posix();
        let handle = fake.handle();
        let registry = TransportRegistry::new().with(fake);
        let target = TargetDescriptor::parse("fake://box").unwrap();

        let conn = registry.connect(&target).await.unwrap();
        assert!(!conn.platform().is_windows_like());
        assert_eq!(handle.connects(), 1);
        assert_eq!(registry.schemes(), vec!["fake"]);
    }
}
