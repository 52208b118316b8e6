//! Name-keyed table of segmentation algorithms

use crate::algorithm::SegmentationAlgorithm;
use crate::algorithms::{Felzenszwalb, Quickshift, Slic, Watershed};
use crate::error::VisionError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Built once at startup, then shared read-only.
#[derive(Default, Clone)]
pub struct AlgorithmRegistry {
    algorithms: Vec<Arc<dyn SegmentationAlgorithm>>,
    by_name: HashMap<String, usize>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// felzenszwalb, slic, quickshift, watershed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [Arc<dyn SegmentationAlgorithm>; 4] = [
            Arc::new(Felzenszwalb),
            Arc::new(Slic),
            Arc::new(Quickshift),
            Arc::new(Watershed),
        ];
        for algorithm in builtins {
            registry
                .register(algorithm)
                .expect("builtin algorithm names are distinct");
        }
        registry
    }

    pub fn register(&mut self, algorithm: Arc<dyn SegmentationAlgorithm>) -> Result<(), VisionError> {
        let name = algorithm.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(VisionError::DuplicateAlgorithm(name));
        }
        debug!(algorithm = %name, "Registered segmentation algorithm");
        self.by_name.insert(name, self.algorithms.len());
        self.algorithms.push(algorithm);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SegmentationAlgorithm>, VisionError> {
        self.by_name
            .get(name)
            .map(|&i| Arc::clone(&self.algorithms[i]))
            .ok_or_else(|| VisionError::UnknownAlgorithm(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registration order.
    pub fn list(&self) -> &[Arc<dyn SegmentationAlgorithm>] {
        &self.algorithms
    }

    pub fn names(&self) -> Vec<&str> {
        self.algorithms.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_in_registration_order() {
        let registry = AlgorithmRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["felzenszwalb", "slic", "quickshift", "watershed"]);
        assert_eq!(registry.get("slic").unwrap().display_name(), "SLIC");
    }

    #[test]
    fn test_unknown_algorithm() {
        let registry = AlgorithmRegistry::with_builtins();
        let err = registry.get("kmeans").err().unwrap();
        assert!(matches!(err, VisionError::UnknownAlgorithm(ref n) if n == "kmeans"));
        assert!(!registry.contains("kmeans"));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = AlgorithmRegistry::with_builtins();
        let err = registry.register(Arc::new(Slic)).unwrap_err();
        assert!(matches!(err, VisionError::DuplicateAlgorithm(_)));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_defaults_fall_within_ranges() {
        let registry = AlgorithmRegistry::with_builtins();
        for algorithm in registry.list() {
            let ranges = algorithm.parameter_ranges();
            for (name, value) in algorithm.default_parameters() {
                let range = &ranges[&name];
                let v = value.as_f64().unwrap();
                assert!(
                    v >= range.min && v <= range.max,
                    "{}.{} default {} outside {:?}",
                    algorithm.name(),
                    name,
                    v,
                    range
                );
            }
        }
    }
}
