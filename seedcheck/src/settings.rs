use anyhow::{Context, Result};
use hashbrown::HashSet;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::logic::ResolverLimits;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverSettings {
    pub max_attempts: Option<usize>,
    pub timeout_seconds: Option<f32>,
    #[serde(default = "default_true")]
    pub shuffle_actions: bool,
    #[serde(default)]
    pub random_seed: u64,
    #[serde(default = "default_true")]
    pub validate_with_solver: bool,
    #[serde(default)]
    pub ignore_cache: bool,
    pub enabled_layers: Option<Vec<String>>,
    #[serde(default)]
    pub trace: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            max_attempts: None,
            timeout_seconds: None,
            shuffle_actions: true,
            random_seed: 0,
            validate_with_solver: true,
            ignore_cache: false,
            enabled_layers: None,
            trace: false,
        }
    }
}

impl ResolverSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read settings {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing settings {}", path.display()))
    }

    pub fn limits(&self, cancel: Option<Arc<AtomicBool>>) -> ResolverLimits {
        ResolverLimits {
            max_attempts: self.max_attempts,
            timeout: self.timeout_seconds.map(Duration::from_secs_f32),
            cancel,
        }
    }

    pub fn layers(&self) -> Option<HashSet<String>> {
        self.enabled_layers
            .as_ref()
            .map(|layers| layers.iter().cloned().collect())
    }

    pub fn rng(&self) -> rand::rngs::StdRng {
        rng_from_seed(self.random_seed)
    }
}

pub fn rng_from_seed(seed: u64) -> rand::rngs::StdRng {
    let mut rng_seed = [0u8; 32];
    rng_seed[..8].copy_from_slice(&seed.to_le_bytes());
    rand::rngs::StdRng::from_seed(rng_seed)
}
