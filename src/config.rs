//! Engine-wide configuration.
//!
//! These knobs are orthogonal to the RETE algorithm itself: they govern
//! diagnostics and safety valves, not match semantics. Leaving unlinking
//! and back-fill both enabled are the supported production defaults; the
//! `unlinking_enabled` escape hatch exists for testing, not for embedders
//! with unusual needs (see DESIGN.md).

/// Configuration for an [`crate::engine::Engine`] instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether right/left unlinking is active. Disabling this is a
    /// diagnostic knob used to check that unlinking never changes the set
    /// of activations produced (the "unlinking transparency" property);
    /// it is not a supported production configuration.
    pub unlinking_enabled: bool,

    /// Upper bound on the number of `run()` agenda-drain iterations before
    /// the engine gives up and returns, logging a warning. Guards against a
    /// misbehaving action that keeps re-asserting facts that re-activate
    /// the same productions forever. `None` means unbounded.
    pub max_run_iterations: Option<usize>,

    /// Whether `add_rule` should back-fill a newly compiled rule's
    /// sub-network by re-broadcasting every currently-live fact through it
    /// exactly once. The supported, documented pattern is "add all rules
    /// before asserting facts"; this flag exists for embedders that must
    /// add rules incrementally after facts already exist. See DESIGN.md for
    /// the rationale behind defaulting this to `true`.
    pub backfill_on_add_rule: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unlinking_enabled: true,
            max_run_iterations: Some(10_000),
            backfill_on_add_rule: true,
        }
    }
}
