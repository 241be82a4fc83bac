//! Capability Registry
//!
//! Immutable snapshots of every reachable capability, republished atomically after each
//! reconciliation that changed the loaded module set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::modules::record::{fold_case, CapabilityInstance};
use crate::modules::ModuleMap;

/// One published view of the registry. Never mutated after construction.
#[derive(Debug, Default)]
pub struct RegistryState {
    generation: u64,
    capabilities: Vec<CapabilityInstance>,
}

impl RegistryState {
    /// Capabilities of every module, ordered by module path and then export order.
    pub fn from_modules(generation: u64, modules: &ModuleMap) -> Self {
        let capabilities = modules
            .values()
            .flat_map(|record| record.capabilities().iter().cloned())
            .collect();
        Self {
            generation,
            capabilities,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityInstance> {
        self.capabilities.iter()
    }

    /// Capabilities whose prefix case-insensitively prefixes `line`, in snapshot order.
    pub fn matching<'a>(&'a self, line: &str) -> impl Iterator<Item = &'a CapabilityInstance> {
        let folded = fold_case(line);
        self.capabilities
            .iter()
            .filter(move |capability| capability.matches_folded(&folded))
    }

    pub fn prefixes(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.prefix()).collect()
    }
}

/// Holder of the current [`RegistryState`].
///
/// Readers take a snapshot with [`CapabilityRegistry::snapshot`] and keep using it as long as they
/// like; publishing a new state never disturbs them.
pub struct CapabilityRegistry {
    current: ArcSwap<RegistryState>,
    generation: AtomicU64,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistryState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<RegistryState> {
        self.current.load_full()
    }

    /// Builds a fresh state from `modules` and swaps it in.
    pub fn publish(&self, modules: &ModuleMap) -> Arc<RegistryState> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let state = Arc::new(RegistryState::from_modules(generation, modules));
        self.current.store(Arc::clone(&state));

        info!(
            "Published registry generation {}: {} capabilities from {} modules",
            generation,
            state.len(),
            modules.len()
        );
        state
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::fingerprint::fingerprint;
    use crate::modules::record::{ModuleRecord, ModuleUnit};
    use crate::modules::testing::capability;

    fn module(map: &mut ModuleMap, path: &str, prefixes: &[&str]) {
        let capabilities = prefixes.iter().map(|p| capability(p)).collect();
        let unit = ModuleUnit::new(path, capabilities, None);
        map.insert(
            path.into(),
            ModuleRecord::new(path, fingerprint(path.as_bytes()), unit),
        );
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = CapabilityRegistry::new();
        let snapshot = registry.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.generation(), 0);
    }

    #[test]
    fn test_publish_orders_by_module_path() {
        let mut modules = ModuleMap::new();
        module(&mut modules, "b.so", &["beta"]);
        module(&mut modules, "a.so", &["alpha", "foo"]);

        let registry = CapabilityRegistry::new();
        let state = registry.publish(&modules);

        assert_eq!(state.prefixes(), ["alpha", "foo", "beta"]);
        assert_eq!(state.generation(), 1);
        assert!(Arc::ptr_eq(&state, &registry.snapshot()));
    }

    #[test]
    fn test_matching_is_case_insensitive_prefix() {
        let mut modules = ModuleMap::new();
        module(&mut modules, "a.so", &["foo", "Food", "bar"]);
        let state = RegistryState::from_modules(1, &modules);

        let hits: Vec<_> = state.matching("FOOD please").map(|c| c.prefix()).collect();
        assert_eq!(hits, ["foo", "Food"]);
        assert_eq!(state.matching("fo").count(), 0);
    }

    #[test]
    fn test_old_snapshot_survives_publish() {
        let mut modules = ModuleMap::new();
        module(&mut modules, "a.so", &["alpha"]);
        let registry = CapabilityRegistry::new();
        let before = registry.publish(&modules);

        module(&mut modules, "b.so", &["beta"]);
        let after = registry.publish(&modules);

        assert_eq!(before.prefixes(), ["alpha"]);
        assert_eq!(after.prefixes(), ["alpha", "beta"]);
        assert!(before.generation() < after.generation());
    }
}
