//! Error taxonomy for the rule engine.
//!
//! Mirrors the three classes described by the engine's error-handling design:
//! structural errors rejected synchronously at `add_rule`, user-code errors
//! isolated to the firing that triggered them, and state-access conditions
//! that are simply no-ops and therefore never appear here.

use thiserror::Error;

/// Errors that can occur while compiling a rule or driving the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A rule was rejected at `add_rule` because it violates a structural
    /// invariant of the network (undefined variable, duplicate name,
    /// negated first condition, empty condition list, ...).
    #[error("rule '{rule}' is structurally invalid: {message}")]
    Structural {
        /// Name of the offending rule.
        rule: String,
        /// Human-readable explanation.
        message: String,
    },

    /// A predicate or action raised while the engine was evaluating or
    /// firing it. The activation that triggered this is still counted as
    /// fired; the engine does not retry it and continues draining the
    /// agenda.
    #[error("user code for rule '{rule}' failed: {message}")]
    UserCode {
        /// Name of the rule whose predicate/action failed.
        rule: String,
        /// Captured failure message (panic payload or returned error).
        message: String,
    },
}

/// Convenient `Result` alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
