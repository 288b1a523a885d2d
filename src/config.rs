use serde::{Deserialize, Serialize};

/// Evaluation knobs applied to every pipeline created from a
/// [`TraversalSource`](crate::traversal::TraversalSource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Fuse adjacent compatible steps while building.
    pub optimize: bool,
    /// Seed for `random`/`shuffle`; drawn from entropy when absent.
    pub seed: Option<u64>,
    /// Ceiling applied to every loop on top of its own predicate.
    pub max_loop_depth: Option<usize>,
    /// Record paths from the first step instead of on demand.
    pub track_paths: bool,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            seed: None,
            max_loop_depth: None,
            track_paths: false,
        }
    }
}

impl TraversalConfig {
    /// Reproducible runs: fixed seed, default everything else.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Every appended step stays a separate stage.
    pub fn unoptimized() -> Self {
        Self {
            optimize: false,
            ..Self::default()
        }
    }

    /// Caps every loop at `depth` iterations.
    pub fn bounded(depth: usize) -> Self {
        Self {
            max_loop_depth: Some(depth),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: TraversalConfig = toml::from_str("seed = 7").unwrap();
        assert_eq!(config.seed, Some(7));
        assert!(config.optimize);
        assert_eq!(config.max_loop_depth, None);
    }
}
