//! Negation nodes: propagate a token exactly while no fact in `alpha_memory`
//! matches its join tests (spec §4.5). Unlike a join, negation never
//! unlinks: an empty alpha memory is negation's *active* case, not a
//! no-op one (spec §4.7), so there is no `left_linked`/`right_linked` pair
//! here.

use crate::fact::{Fact, FactId};
use crate::pattern::JoinTest;
use crate::token::{TokenArena, TokenId};
use std::collections::HashMap;

/// `(alpha_memory, beta_memory, tests, successor)` plus the bookkeeping a
/// negation needs that a join doesn't: every input token gets exactly one
/// candidate output token (fact-less, per spec §3 invariant 3), allocated up
/// front and kept alive in the arena even while inhibited so it can be
/// relinked without re-deriving bindings once its last inhibitor is
/// retracted.
pub struct NegationNode {
    pub alpha_memory: usize,
    pub beta_memory: usize,
    pub tests: Vec<JoinTest>,
    pub successor: usize,
    /// Input token (in `beta_memory`) -> its candidate output token. Present
    /// once `left_activate` has processed the input token; removed only
    /// when the input token itself is retracted.
    produced: HashMap<TokenId, TokenId>,
}

impl NegationNode {
    pub fn new(alpha_memory: usize, beta_memory: usize, tests: Vec<JoinTest>, successor: usize) -> Self {
        Self {
            alpha_memory,
            beta_memory,
            tests,
            successor,
            produced: HashMap::new(),
        }
    }

    /// Does `candidate` count as an inhibitor of `token`?
    pub fn inhibits(&self, token_facts: &[Fact], candidate: &Fact) -> bool {
        self.tests
            .iter()
            .all(|test| test.passes(token_facts.get(test.token_slot_index), candidate))
    }

    /// All facts currently in `alpha_items` that inhibit `token`.
    pub fn inhibitors_of(&self, token: TokenId, alpha_items: &[Fact], arena: &TokenArena) -> Vec<FactId> {
        let token_facts = arena.facts(token);
        alpha_items
            .iter()
            .filter(|fact| self.inhibits(&token_facts, fact))
            .map(Fact::id)
            .collect()
    }

    /// Record the output token allocated for a freshly left-activated input
    /// token.
    pub fn record_output(&mut self, input: TokenId, output: TokenId) {
        self.produced.insert(input, output);
    }

    /// The output token for an input token, if one has been produced.
    pub fn output_for(&self, input: TokenId) -> Option<TokenId> {
        self.produced.get(&input).copied()
    }

    /// Forget an input token's output mapping, e.g. because the input token
    /// itself was retracted. Returns the output token id so the caller can
    /// free it.
    pub fn forget(&mut self, input: TokenId) -> Option<TokenId> {
        self.produced.remove(&input)
    }

    /// Every currently-tracked `(input, output)` pair, used to find which
    /// outputs a newly (de)activated alpha fact might inhibit without
    /// re-scanning the whole beta memory from scratch.
    pub fn tracked(&self) -> impl Iterator<Item = (TokenId, TokenId)> + '_ {
        self.produced.iter().map(|(&i, &o)| (i, o))
    }

    /// Drop all input/output tracking (spec §4.8 `reset()`). The output
    /// tokens themselves are freed by the caller, which owns the arena.
    pub fn clear(&mut self) {
        self.produced.clear();
    }
}
