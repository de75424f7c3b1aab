//! Join nodes: the two-input beta-network stage that extends a token with
//! one more fact, subject to a set of cross-condition [`JoinTest`]s (spec
//! §4.4).

use crate::fact::Fact;
use crate::pattern::JoinTest;
use crate::token::{TokenArena, TokenId};

/// `(alpha_memory, beta_memory, tests, successor)` from spec §4.4/§4.8. A
/// join has exactly one downstream beta memory: the compile algorithm
/// creates a fresh one for each condition, so `successor` is a single index
/// rather than a list (contrast [`crate::beta::BetaMemory::successors`],
/// which fans out because a beta memory can feed more than one rule's next
/// stage).
pub struct JoinNode {
    pub alpha_memory: usize,
    pub beta_memory: usize,
    pub tests: Vec<JoinTest>,
    pub successor: usize,
    /// Gated by `alpha_memory`'s emptiness: a left-activation's job is to
    /// scan `alpha_memory`'s items, which is a guaranteed no-op while it is
    /// empty (spec §4.7).
    pub left_linked: bool,
    /// Gated by `beta_memory`'s emptiness, symmetrically.
    pub right_linked: bool,
}

impl JoinNode {
    pub fn new(alpha_memory: usize, beta_memory: usize, tests: Vec<JoinTest>, successor: usize) -> Self {
        Self {
            alpha_memory,
            beta_memory,
            tests,
            successor,
            left_linked: false,
            right_linked: false,
        }
    }

    /// Does `candidate` satisfy every join test against the facts chained
    /// from `token` (in condition order, as returned by
    /// [`TokenArena::facts`])?
    pub fn passes(&self, token_facts: &[Fact], candidate: &Fact) -> bool {
        self.tests
            .iter()
            .all(|test| test.passes(token_facts.get(test.token_slot_index), candidate))
    }

    /// Right-activation: a new fact arrived in `alpha_memory`. Returns the
    /// tokens in `beta_memory` it should be joined with, in that memory's
    /// insertion order (spec §8 ordering guarantees). Building and
    /// propagating the resulting tokens is the engine's job, since it owns
    /// the arena and the successor memory.
    /// `force_linked` lets the engine disable unlinking altogether
    /// ([`crate::config::EngineConfig::unlinking_enabled`]) without this
    /// node losing track of its real link state.
    pub fn right_activate(&self, fact: &Fact, beta_tokens: &[TokenId], arena: &TokenArena, force_linked: bool) -> Vec<TokenId> {
        if !self.right_linked && !force_linked {
            return Vec::new();
        }
        beta_tokens
            .iter()
            .copied()
            .filter(|&t| self.passes(&arena.facts(t), fact))
            .collect()
    }

    /// Left-activation: a new token arrived in `beta_memory`. Returns the
    /// facts in `alpha_memory` it should be joined with.
    pub fn left_activate(&self, token: TokenId, alpha_items: &[Fact], arena: &TokenArena, force_linked: bool) -> Vec<Fact> {
        if !self.left_linked && !force_linked {
            return Vec::new();
        }
        let token_facts = arena.facts(token);
        alpha_items
            .iter()
            .filter(|fact| self.passes(&token_facts, fact))
            .cloned()
            .collect()
    }
}
