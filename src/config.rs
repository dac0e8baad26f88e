//! Engine configuration.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{TimelineError, TimelineResult};

/// Configuration for a [`TimelineEngine`](crate::TimelineEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the tree's shared random source. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Maximum number of branches (the root branch included).
    pub max_branches: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_branches: 4096,
        }
    }
}

impl EngineConfig {
    /// Returns a copy of this configuration with a fixed seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration.
    ///
    /// This must be called before constructing an engine.
    pub fn validate(&self) -> TimelineResult<()> {
        if self.max_branches == 0 {
            return Err(TimelineError::InvalidConfig {
                reason: "max_branches must be > 0".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn config_default_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn config_rejects_zero_branches() {
        let config = EngineConfig {
            max_branches: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_branches, EngineConfig::default().max_branches);
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let config = EngineConfig::default().with_seed(42);
        let mut first = config.rng();
        let mut second = config.rng();
        let a: Vec<f64> = (0..4).map(|_| first.gen()).collect();
        let b: Vec<f64> = (0..4).map(|_| second.gen()).collect();
        assert_eq!(a, b);
    }
}
