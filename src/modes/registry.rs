use std::collections::HashMap;

use super::{ModeRenderer, RenderContext, RenderError, VisualizerMode};
use crate::render::broker::GpuContextBroker;

/// Lazily loads and memoizes mode renderers, and hands GPU state off from
/// the outgoing mode whenever the requested mode changes.
pub struct ModeRegistry {
    fallback: VisualizerMode,
    previous: Option<VisualizerMode>,
    cache: HashMap<VisualizerMode, Box<dyn ModeRenderer>>,
    seed: Option<u64>,
    loads: usize,
    cleanups: usize,
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::new(VisualizerMode::default())
    }
}

impl ModeRegistry {
    pub fn new(fallback: VisualizerMode) -> Self {
        Self {
            fallback,
            previous: None,
            cache: HashMap::new(),
            seed: None,
            loads: 0,
            cleanups: 0,
        }
    }

    /// Seed every randomised renderer this registry loads.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn previous_mode(&self) -> Option<VisualizerMode> {
        self.previous
    }

    pub fn is_loaded(&self, mode: VisualizerMode) -> bool {
        self.cache.contains_key(&mode)
    }

    pub fn loaded_count(&self) -> usize {
        self.cache.len()
    }

    /// Number of renderer constructions so far.
    pub fn load_count(&self) -> usize {
        self.loads
    }

    /// Number of outgoing-mode cleanups triggered by switches.
    pub fn cleanup_count(&self) -> usize {
        self.cleanups
    }

    /// Resolve a key and render it; unknown keys render the fallback mode.
    pub fn render_key(&mut self, key: &str, ctx: &mut RenderContext<'_>) -> Result<VisualizerMode, RenderError> {
        let mode = VisualizerMode::from_key(key).unwrap_or(self.fallback);
        self.render(mode, ctx)?;
        Ok(mode)
    }

    pub fn render(&mut self, mode: VisualizerMode, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        if !ctx.token.is_live() {
            return Err(RenderError::Cancelled);
        }

        if self.previous != Some(mode) {
            if let Some(outgoing) = self.previous {
                self.release(outgoing, ctx.broker);
            }
            log::debug!("visualizer mode -> {}", mode.id());
            self.previous = Some(mode);
        }

        let seed = self.seed;
        let loads = &mut self.loads;
        let renderer = self.cache.entry(mode).or_insert_with(|| {
            *loads += 1;
            log::debug!("loading mode {}", mode.id());
            mode.load(seed)
        });

        // Teardown may have happened while the mode was loading.
        if !ctx.token.is_live() {
            return Err(RenderError::Cancelled);
        }
        renderer.render(ctx)
    }

    fn release(&mut self, mode: VisualizerMode, broker: &mut GpuContextBroker) {
        match self.cache.get_mut(&mode) {
            Some(renderer) => renderer.cleanup(broker),
            None => broker.cleanup(mode.id()),
        }
        self.cleanups += 1;
    }

    /// Release every cached mode's GPU state and drop all renderers.
    pub fn cleanup_all(&mut self, broker: &mut GpuContextBroker) {
        for (_, renderer) in self.cache.iter_mut() {
            renderer.cleanup(broker);
        }
        self.cache.clear();
        self.previous = None;
    }
}
