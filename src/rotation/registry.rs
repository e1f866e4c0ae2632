//! Process-wide strategy registry
//!
//! Maps names to strategy factories so callers can discover and instantiate
//! strategies at runtime, including user-registered ones. The registry is a
//! singleton guarded by a read-write lock; re-registering a name replaces the
//! entry.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use super::{create_strategy, RotationStrategy, StrategyKind};
use crate::error::{CarouselError, Result};

/// Constructor for a strategy; instantiation is the caller's responsibility
/// via [`StrategyRegistry::create`]
pub type StrategyFactory = Arc<dyn Fn() -> Arc<dyn RotationStrategy> + Send + Sync>;

static REGISTRY: OnceLock<StrategyRegistry> = OnceLock::new();

/// Name -> factory map for rotation strategies
pub struct StrategyRegistry {
    entries: RwLock<HashMap<String, StrategyFactory>>,
}

impl StrategyRegistry {
    /// The process-wide registry, with built-ins pre-registered
    pub fn global() -> &'static StrategyRegistry {
        REGISTRY.get_or_init(|| {
            let registry = StrategyRegistry {
                entries: RwLock::new(HashMap::new()),
            };
            registry.register_builtins();
            registry
        })
    }

    fn register_builtins(&self) {
        for kind in [
            StrategyKind::RoundRobin,
            StrategyKind::Random,
            StrategyKind::Weighted,
            StrategyKind::LeastUsed,
            StrategyKind::PerformanceBased,
            StrategyKind::Session,
            StrategyKind::Geo,
            StrategyKind::Composite,
        ] {
            self.register(kind.as_str(), Arc::new(move || create_strategy(kind)));
        }
    }

    /// Register a strategy factory under a name, replacing any existing entry
    pub fn register(&self, name: impl Into<String>, factory: StrategyFactory) {
        let name = name.into();
        debug!(strategy = %name, "Registering rotation strategy");
        self.entries.write().insert(name, factory);
    }

    /// Look up a factory by name
    pub fn get(&self, name: &str) -> Option<StrategyFactory> {
        self.entries.read().get(name).cloned()
    }

    /// Instantiate a registered strategy
    pub fn create(&self, name: &str) -> Result<Arc<dyn RotationStrategy>> {
        let factory = self
            .get(name)
            .ok_or_else(|| CarouselError::UnknownStrategy(name.to_string()))?;
        Ok(factory())
    }

    /// Remove an entry; returns whether it existed
    pub fn unregister(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every entry and restore the built-ins
    pub fn reset(&self) {
        self.entries.write().clear();
        self.register_builtins();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::RoundRobinStrategy;

    #[test]
    fn test_builtins_registered() {
        let registry = StrategyRegistry::global();
        for name in [
            "round_robin",
            "random",
            "weighted",
            "least_used",
            "performance",
            "session",
            "geo",
            "composite",
        ] {
            assert!(registry.get(name).is_some(), "missing builtin {}", name);
        }
    }

    #[test]
    fn test_create_by_name() {
        let registry = StrategyRegistry::global();
        let strategy = registry.create("round_robin").unwrap();
        assert_eq!(strategy.name(), "round_robin");

        assert!(matches!(
            registry.create("does_not_exist"),
            Err(CarouselError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_register_custom_and_unregister() {
        let registry = StrategyRegistry::global();

        registry.register(
            "custom_rr_a",
            Arc::new(|| Arc::new(RoundRobinStrategy::new()) as Arc<dyn RotationStrategy>),
        );
        assert!(registry.get("custom_rr_a").is_some());
        assert!(registry.list().contains(&"custom_rr_a".to_string()));

        assert!(registry.unregister("custom_rr_a"));
        assert!(!registry.unregister("custom_rr_a"));
        assert!(registry.get("custom_rr_a").is_none());
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = StrategyRegistry::global();

        registry.register(
            "custom_rr_b",
            Arc::new(|| Arc::new(RoundRobinStrategy::new()) as Arc<dyn RotationStrategy>),
        );
        registry.register(
            "custom_rr_b",
            Arc::new(|| {
                Arc::new(crate::rotation::RandomStrategy::new()) as Arc<dyn RotationStrategy>
            }),
        );

        let strategy = registry.create("custom_rr_b").unwrap();
        assert_eq!(strategy.name(), "random");
        registry.unregister("custom_rr_b");
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = StrategyRegistry::global();
        let mut handles = Vec::new();

        for i in 0..8 {
            handles.push(std::thread::spawn(move || {
                let name = format!("concurrent_strategy_{}", i);
                StrategyRegistry::global().register(
                    name.clone(),
                    Arc::new(|| Arc::new(RoundRobinStrategy::new()) as Arc<dyn RotationStrategy>),
                );
                assert!(StrategyRegistry::global().get(&name).is_some());
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..8 {
            assert!(registry.unregister(&format!("concurrent_strategy_{}", i)));
        }
    }
}
