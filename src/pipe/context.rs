use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::TraversalConfig;
use crate::graph::GraphAccess;
use crate::pipe::sinks::SideEffects;

/// Evaluation state threaded through every pull.
///
/// One context belongs to one top-level pipeline; nested branch and loop
/// chains are driven with their parent's context, so every step shares the
/// same graph handle, side-effect registry and random source.
pub struct EvalContext {
    pub(crate) graph: Arc<dyn GraphAccess>,
    pub(crate) sinks: SideEffects,
    pub(crate) config: TraversalConfig,
    pub(crate) path_enabled: bool,
    rng: Option<StdRng>,
}

impl EvalContext {
    pub fn new(graph: Arc<dyn GraphAccess>, config: TraversalConfig) -> Self {
        let path_enabled = config.track_paths;
        Self {
            graph,
            sinks: SideEffects::default(),
            config,
            path_enabled,
            rng: None,
        }
    }

    pub fn graph(&self) -> &dyn GraphAccess {
        self.graph.as_ref()
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    pub fn sinks(&self) -> &SideEffects {
        &self.sinks
    }

    pub fn path_enabled(&self) -> bool {
        self.path_enabled
    }

    /// Random source for `random`/`shuffle`, created on first use.
    pub fn rng(&mut self) -> &mut StdRng {
        let seed = self.config.seed;
        self.rng.get_or_insert_with(|| match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        })
    }

    /// Context for building a sub-pipeline. Takes the side-effect registry so
    /// sinks registered by the child keep their ids once handed back.
    pub(crate) fn fork(&mut self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            sinks: std::mem::take(&mut self.sinks),
            config: self.config.clone(),
            path_enabled: self.path_enabled,
            rng: None,
        }
    }

    pub(crate) fn rejoin(&mut self, child: EvalContext) {
        self.sinks = child.sinks;
        self.path_enabled |= child.path_enabled;
    }
}
