//! Capability registry
//!
//! Named browser capabilities and the selection rules for them: a run is
//! configured with either a concrete capability name or "random", which
//! resolves to a uniform choice among the registered set.

use std::sync::Arc;
use async_trait::async_trait;
use rand::Rng;

use super::{EngineError, EngineSession, LaunchOptions};

/// Launches session instances for one capability.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// Capability name this launcher serves.
    fn name(&self) -> &str;

    /// Launch a fresh, isolated session instance.
    async fn launch(&self, opts: LaunchOptions) -> Result<Arc<dyn EngineSession>, EngineError>;
}

/// A selectable browser capability.
#[derive(Clone)]
pub struct Capability {
    name: String,
    launcher: Arc<dyn EngineLauncher>,
}

impl Capability {
    pub fn new(name: impl Into<String>, launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            name: name.into(),
            launcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn launch(&self, opts: LaunchOptions) -> Result<Arc<dyn EngineSession>, EngineError> {
        self.launcher.launch(opts).await
    }
}

/// Registry of the supported capabilities.
pub struct CapabilityRegistry {
    capabilities: Vec<Capability>,
}

impl CapabilityRegistry {
    pub fn new(capabilities: Vec<Capability>) -> Self {
        Self { capabilities }
    }

    /// Default registry: Chromium-family capabilities backed by the CDP launcher,
    /// differing only in which binaries they search for.
    pub fn cdp_default() -> Self {
        Self::new(vec![
            Capability::new("chromium", Arc::new(super::CdpLauncher::chromium())),
            Capability::new("chrome", Arc::new(super::CdpLauncher::chrome())),
            Capability::new("edge", Arc::new(super::CdpLauncher::edge())),
        ])
    }

    /// Registered capability names.
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    /// Look up a capability by exact name.
    pub fn resolve_by_name(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name() == name)
    }

    /// Pick a capability uniformly at random.
    pub fn resolve_random(&self) -> Option<&Capability> {
        if self.capabilities.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.capabilities.len());
        self.capabilities.get(index)
    }

    /// Resolve a selector: "random" picks uniformly, anything else is an exact name.
    pub fn resolve(&self, selector: &str) -> Option<&Capability> {
        if selector == "random" {
            self.resolve_random()
        } else {
            self.resolve_by_name(selector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockLauncher;

    fn test_registry() -> CapabilityRegistry {
        CapabilityRegistry::new(vec![
            Capability::new("chromium", Arc::new(MockLauncher::new("chromium"))),
            Capability::new("chrome", Arc::new(MockLauncher::new("chrome"))),
        ])
    }

    #[test]
    fn test_resolve_by_name() {
        let registry = test_registry();
        assert_eq!(registry.resolve_by_name("chrome").map(|c| c.name()), Some("chrome"));
        assert!(registry.resolve_by_name("webkit").is_none());
    }

    #[test]
    fn test_resolve_random_always_succeeds() {
        let registry = test_registry();
        for _ in 0..20 {
            let cap = registry.resolve("random").unwrap();
            assert!(registry.names().contains(&cap.name()));
        }
    }

    #[test]
    fn test_resolve_unknown_selector() {
        let registry = test_registry();
        assert!(registry.resolve("netscape").is_none());
    }

    #[test]
    fn test_empty_registry_has_no_random() {
        let registry = CapabilityRegistry::new(vec![]);
        assert!(registry.resolve("random").is_none());
    }
}
