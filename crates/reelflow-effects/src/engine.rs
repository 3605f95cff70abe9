//! Registry of named effects.
//!
//! Layouts and callers refer to effects by name. The engine maps each name
//! to a factory so every placement gets its own instance.

use parking_lot::RwLock;
use reelflow_core::{ReelflowError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::filter::SharedFilter;
use crate::filters::{Brightness, Grayscale, Invert};
use crate::mixer::SharedMixer;
use crate::mixers::{CrossDissolve, DipToBlack};

type FilterFactory = Arc<dyn Fn() -> SharedFilter + Send + Sync>;
type MixerFactory = Arc<dyn Fn() -> SharedMixer + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Filter,
    Mixer,
}

#[derive(Default)]
struct Registry {
    filters: HashMap<String, FilterFactory>,
    mixers: HashMap<String, MixerFactory>,
}

/// Named filter and mixer factories.
#[derive(Default)]
pub struct EffectsEngine {
    registry: RwLock<Registry>,
}

impl EffectsEngine {
    /// An empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with every built-in effect registered.
    pub fn with_builtins() -> Self {
        let engine = Self::new();
        engine.register_filter("invert", || Arc::new(Invert));
        engine.register_filter("grayscale", || Arc::new(Grayscale));
        engine.register_filter("brightness", || Arc::new(Brightness::new(1.25)));
        engine.register_filter("darken", || Arc::new(Brightness::new(0.5)));
        engine.register_mixer("cross_dissolve", || Arc::new(CrossDissolve));
        engine.register_mixer("dip_to_black", || Arc::new(DipToBlack));
        engine
    }

    /// Register a filter. An existing effect with the same name is replaced.
    pub fn register_filter(&self, name: &str, factory: impl Fn() -> SharedFilter + Send + Sync + 'static) {
        let mut registry = self.registry.write();
        if registry.mixers.remove(name).is_some() || registry.filters.contains_key(name) {
            warn!(effect = name, "replacing registered effect");
        }
        registry.filters.insert(name.to_owned(), Arc::new(factory));
        debug!(effect = name, "filter registered");
    }

    /// Register a mixer. An existing effect with the same name is replaced.
    pub fn register_mixer(&self, name: &str, factory: impl Fn() -> SharedMixer + Send + Sync + 'static) {
        let mut registry = self.registry.write();
        if registry.filters.remove(name).is_some() || registry.mixers.contains_key(name) {
            warn!(effect = name, "replacing registered effect");
        }
        registry.mixers.insert(name.to_owned(), Arc::new(factory));
        debug!(effect = name, "mixer registered");
    }

    pub fn kind(&self, name: &str) -> Option<EffectKind> {
        let registry = self.registry.read();
        if registry.filters.contains_key(name) {
            Some(EffectKind::Filter)
        } else if registry.mixers.contains_key(name) {
            Some(EffectKind::Mixer)
        } else {
            None
        }
    }

    /// Sorted names of every registered effect.
    pub fn names(&self) -> Vec<String> {
        let registry = self.registry.read();
        let mut names: Vec<String> = registry
            .filters
            .keys()
            .chain(registry.mixers.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn create_filter(&self, name: &str) -> Result<SharedFilter> {
        let factory = self
            .registry
            .read()
            .filters
            .get(name)
            .cloned()
            .ok_or_else(|| ReelflowError::NotFound(format!("No filter named {}", name)))?;
        Ok(factory())
    }

    pub fn create_mixer(&self, name: &str) -> Result<SharedMixer> {
        let factory = self
            .registry
            .read()
            .mixers
            .get(name)
            .cloned()
            .ok_or_else(|| ReelflowError::NotFound(format!("No mixer named {}", name)))?;
        Ok(factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let engine = EffectsEngine::with_builtins();
        assert_eq!(engine.kind("invert"), Some(EffectKind::Filter));
        assert_eq!(engine.kind("cross_dissolve"), Some(EffectKind::Mixer));
        assert_eq!(engine.kind("nope"), None);
        assert!(engine.names().contains(&"dip_to_black".to_string()));
    }

    #[test]
    fn test_create_by_name() {
        let engine = EffectsEngine::with_builtins();
        assert_eq!(engine.create_filter("grayscale").unwrap().name(), "grayscale");
        assert_eq!(engine.create_mixer("dip_to_black").unwrap().name(), "dip_to_black");
        assert!(matches!(
            engine.create_filter("cross_dissolve"),
            Err(ReelflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_registration_replaces_kind() {
        let engine = EffectsEngine::with_builtins();
        engine.register_mixer("invert", || Arc::new(CrossDissolve));
        assert_eq!(engine.kind("invert"), Some(EffectKind::Mixer));
    }
}
