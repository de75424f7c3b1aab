//! # rule-engine: a RETE II forward-chaining production rule engine
//!
//! A discrimination (alpha) network feeding a beta network of join and
//! negation nodes, with right/left unlinking so branches that cannot
//! currently produce a match do no work. Rules arrive as already-compiled
//! [`Rule`] values; facts are asserted and retracted against an [`Engine`],
//! which drains completed matches through an [`Agenda`] on [`Engine::run`].
//!
//! ## Quick start
//!
//! ```
//! use rule_engine::{Engine, EngineConfig, Rule, Pattern, Constraint, FactValue};
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! engine
//!     .add_rule(
//!         Rule::builder("red-car")
//!             .condition(Pattern::new(
//!                 "car",
//!                 vec![("color".to_string(), Constraint::Literal(FactValue::from("red")))],
//!                 false,
//!             ))
//!             .action(|facts, _bindings, _ctx| {
//!                 println!("matched {:?}", facts[0].id());
//!             }),
//!     )
//!     .unwrap();
//!
//! engine.assert("car", [("color".to_string(), FactValue::from("red"))].into());
//! engine.run();
//! ```
//!
//! ## Module map
//!
//! - [`fact`]: the typed value model (`Fact`, `FactId`, `FactValue`).
//! - [`pattern`]: intra-fact `Pattern`/`Constraint` and cross-fact `JoinTest`.
//! - [`token`]: the arena-allocated match tree (`Token`, `TokenArena`).
//! - [`working_memory`]: the live fact set and its observer channel.
//! - [`alpha`]: the discrimination network (`AlphaMemory`, `AlphaNetwork`).
//! - [`beta`]: partial-match memories between join stages.
//! - [`join`]: two-input join nodes.
//! - [`negation`]: closed-world negation nodes.
//! - [`production`]: terminal nodes and the priority agenda.
//! - [`rule`]: the input contract (`Rule`, `RuleBuilder`, `ActionContext`).
//! - [`engine`]: the compiler + driver tying every module together.
//! - [`config`]: engine-wide configuration knobs.
//! - [`error`]: the engine's error taxonomy.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Intra-fact and cross-fact constraints (`Pattern`, `Constraint`, `JoinTest`).
pub mod pattern;
/// The typed, immutable value model (`Fact`, `FactId`, `FactValue`).
pub mod fact;
/// The arena-allocated match tree (`Token`, `TokenArena`).
pub mod token;
/// The live fact set and its observer-broadcast channel.
pub mod working_memory;
/// The discrimination (alpha) network.
pub mod alpha;
/// Beta-network memories holding partial-match tokens.
pub mod beta;
/// Two-input join nodes.
pub mod join;
/// Closed-world negation nodes.
pub mod negation;
/// Terminal production nodes and the priority agenda.
pub mod production;
/// The input contract: `Rule`, `RuleBuilder`, `ActionContext`.
pub mod rule;
/// The compiler + driver: compiles rules into the network and routes events.
pub mod engine;
/// Engine-wide configuration.
pub mod config;
/// The engine's error taxonomy.
pub mod error;

pub use config::EngineConfig;
pub use engine::{Engine, EngineStats};
pub use error::{EngineError, Result};
pub use fact::{Fact, FactId, FactValue};
pub use pattern::{Constraint, JoinTest, Pattern};
pub use rule::{Action, ActionContext, Rule, RuleBuilder};
pub use token::{Token, TokenId};
pub use working_memory::{WmEvent, WmObserver, WorkingMemoryBackend};
