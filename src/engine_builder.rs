use crate::{
    planner::DEFAULT_POINTS,
    source::{GroupResolver, ReadingSource},
    Engine,
};
use std::num::NonZeroUsize;

/// Builder for [`Engine`].
pub struct EngineBuilder {
    parallelism: usize,
    default_points: usize,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parallelism: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            default_points: DEFAULT_POINTS,
        }
    }

    /// Sets how many entities may be aggregated concurrently.
    ///
    /// `1` runs every query on the calling thread.
    ///
    /// Default = available parallelism
    #[must_use]
    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    /// Sets the number of points a compressed series has unless the query overrides it.
    ///
    /// Default = 500
    #[must_use]
    pub fn default_points(mut self, n: usize) -> Self {
        self.default_points = n;
        self
    }

    /// Creates the engine on top of its collaborators.
    ///
    /// The same value may serve as both, e.g. `build(&store, &store)`.
    pub fn build<S: ReadingSource, G: GroupResolver>(self, readings: S, groups: G) -> Engine<S, G> {
        log::debug!(
            "Creating engine with parallelism={} default_points={}",
            self.parallelism,
            self.default_points
        );

        Engine {
            readings,
            groups,
            parallelism: self.parallelism,
            default_points: self.default_points,
        }
    }
}
