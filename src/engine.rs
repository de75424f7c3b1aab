//! The compiler + driver: compiles [`Rule`]s into the RETE network and
//! routes working-memory events through it (spec §4.8).
//!
//! This module is the one place that is allowed to see every other node
//! type at once: alpha memories, beta memories, joins, negations,
//! productions and the token arena are all owned here as flat, index-
//! addressed `Vec`s (spec §9: "arena-allocate nodes and tokens, use stable
//! indices ... rather than bidirectional owning references").

use crate::alpha::{AlphaEdge, AlphaMemory, AlphaNetwork};
use crate::beta::{BetaEdge, BetaMemory};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::fact::{Fact, FactValue};
use crate::join::JoinNode;
use crate::negation::NegationNode;
use crate::pattern::JoinTest;
use crate::production::{Agenda, ProductionNode};
use crate::rule::{extract_bindings, ActionContext, Rule};
use crate::token::{Producer, Token, TokenArena, TokenId};
use crate::working_memory::{WorkingMemory, WorkingMemoryBackend};
use std::collections::{HashMap, HashSet};

/// Index of the dummy-top beta memory, the root of every rule's token chain
/// (spec §4.8 step 1, glossary "dummy top").
const DUMMY_TOP: usize = 0;

/// Snapshot counters returned by [`Engine::stats`]. Grounded in the
/// teacher's `WorkingMemoryStats`/`AgendaStats` plain-struct-plus-`Display`
/// convention (`src/rete/working_memory.rs`, `src/rete/agenda.rs`).
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub live_facts: usize,
    pub rules: usize,
    pub alpha_memories: usize,
    pub beta_memories: usize,
    pub live_tokens: usize,
    pub agenda_depth: usize,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Engine Stats: {} facts, {} rules, {} alpha memories, {} beta memories, {} live tokens, {} pending activations",
            self.live_facts, self.rules, self.alpha_memories, self.beta_memories, self.live_tokens, self.agenda_depth
        )
    }
}

/// The RETE II network plus the working memory and agenda it drives.
///
/// `Engine` is `Send` (nothing here uses thread-local or `Rc` state) but is
/// not internally synchronized: concurrent calls on one instance from
/// multiple threads are undefined, matching spec §5's single-threaded,
/// cooperative scheduling model.
pub struct Engine {
    config: EngineConfig,
    wm: WorkingMemory,
    alpha_network: AlphaNetwork,
    alpha_memories: Vec<AlphaMemory>,
    beta_memories: Vec<BetaMemory>,
    joins: Vec<JoinNode>,
    negations: Vec<NegationNode>,
    productions: Vec<ProductionNode>,
    rules: Vec<Rule>,
    rule_names: HashSet<String>,
    tokens: TokenArena,
    agenda: Agenda,
    /// Out-of-band sink for user-code failures (spec §7). Defaults to
    /// logging through the `log` facade at `error` level; an embedder may
    /// override it to route failures elsewhere (metrics, a UI toast, ...).
    on_failure: Box<dyn FnMut(&EngineError)>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Create a new engine with the given configuration. The network starts
    /// with just the dummy-top beta memory; `add_rule` populates the rest.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            wm: WorkingMemory::new(),
            alpha_network: AlphaNetwork::new(),
            alpha_memories: Vec::new(),
            beta_memories: vec![BetaMemory::dummy_top()],
            joins: Vec::new(),
            negations: Vec::new(),
            productions: Vec::new(),
            rules: Vec::new(),
            rule_names: HashSet::new(),
            tokens: TokenArena::new(),
            agenda: Agenda::new(),
            on_failure: Box::new(|err| log::error!("{err}")),
        }
    }

    /// Override where user-code failures (spec §7) are reported. Replaces
    /// the default `log::error!` sink.
    pub fn set_failure_sink(&mut self, sink: impl FnMut(&EngineError) + 'static) {
        self.on_failure = Box::new(sink);
    }

    // ---------------------------------------------------------------
    // §4.8 compiler
    // ---------------------------------------------------------------

    /// Compile a rule into the network. Structural errors (spec §7) are
    /// rejected before any mutation to existing network state.
    pub fn add_rule(&mut self, rule: Rule) -> Result<()> {
        self.validate(&rule)?;

        self.rule_names.insert(rule.name.clone());
        let rule_index = self.rules.len();

        let mut current_beta = DUMMY_TOP;
        // variable -> (token slot index in the eventual facts chain, attribute
        // read off the fact bound at that slot). Only non-negated conditions
        // occupy a slot (spec §3 invariant 3), so this is built with a
        // separate counter from the raw condition index.
        let mut bound_vars: HashMap<String, (usize, String)> = HashMap::new();
        let mut slot = 0usize;

        for pattern in &rule.conditions {
            let key = pattern.key();
            let alpha_idx = match self.alpha_network.lookup(&key) {
                Some(idx) => idx,
                None => {
                    let idx = self.alpha_memories.len();
                    self.alpha_memories.push(AlphaMemory::new(pattern.clone()));
                    self.alpha_network.register(&pattern.type_tag, key, idx);
                    idx
                }
            };

            let tests: Vec<JoinTest> = pattern
                .variables()
                .filter_map(|(var, attr)| {
                    bound_vars
                        .get(var)
                        .map(|(token_slot, token_attr)| JoinTest::new(*token_slot, token_attr.clone(), attr.to_string()))
                })
                .collect();

            let output_beta = self.beta_memories.len();
            self.beta_memories.push(BetaMemory::new());

            if pattern.negated {
                let neg_idx = self.negations.len();
                self.negations.push(NegationNode::new(alpha_idx, current_beta, tests, output_beta));
                self.alpha_memories[alpha_idx].successors.push(AlphaEdge::Negation { index: neg_idx });
                self.beta_memories[current_beta].successors.push(BetaEdge::Negation { index: neg_idx });

                if self.config.backfill_on_add_rule {
                    let seed_tokens = self.beta_memories[current_beta].tokens().to_vec();
                    for token in seed_tokens {
                        self.negation_left_activate(neg_idx, token);
                    }
                }
                log::trace!("rule '{}': negation node {neg_idx} over alpha {alpha_idx}", rule.name);
            } else {
                let join_idx = self.joins.len();
                let mut join = JoinNode::new(alpha_idx, current_beta, tests, output_beta);
                // Reflect the real current state of shared memories rather than
                // always starting unlinked: a join attached to an
                // already-populated alpha/beta (because it shares a memory with
                // an earlier rule) must not be mistaken for starting empty.
                join.right_linked = !self.alpha_memories[alpha_idx].is_empty();
                join.left_linked = !self.beta_memories[current_beta].is_empty();
                self.joins.push(join);
                self.alpha_memories[alpha_idx].successors.push(AlphaEdge::Join { index: join_idx });
                self.beta_memories[current_beta].successors.push(BetaEdge::Join { index: join_idx });

                if self.config.backfill_on_add_rule {
                    let seed_tokens = self.beta_memories[current_beta].tokens().to_vec();
                    for token in seed_tokens {
                        self.join_left_activate(join_idx, token);
                    }
                }

                for (var, attr) in pattern.variables() {
                    bound_vars.insert(var.to_string(), (slot, attr.to_string()));
                }
                slot += 1;
                log::trace!("rule '{}': join node {join_idx} over alpha {alpha_idx}", rule.name);
            }

            current_beta = output_beta;
        }

        let prod_idx = self.productions.len();
        self.productions.push(ProductionNode::new(rule_index));
        self.beta_memories[current_beta].successors.push(BetaEdge::Production { index: prod_idx });

        if self.config.backfill_on_add_rule {
            let seed_tokens = self.beta_memories[current_beta].tokens().to_vec();
            for token in seed_tokens {
                self.production_left_activate(prod_idx, token);
            }
        }

        log::debug!("compiled rule '{}' ({} conditions)", rule.name, rule.conditions.len());
        self.rules.push(rule);
        Ok(())
    }

    /// Structural validation (spec §7): duplicate name, empty condition
    /// list, a negated first condition, or a negated condition referencing a
    /// variable no earlier condition actually binds (such a variable could
    /// never be compared against anything, so it is meaningless rather than
    /// merely unusual).
    fn validate(&self, rule: &Rule) -> Result<()> {
        if self.rule_names.contains(&rule.name) {
            return Err(EngineError::Structural {
                rule: rule.name.clone(),
                message: "a rule with this name is already compiled".to_string(),
            });
        }
        if rule.conditions.is_empty() {
            return Err(EngineError::Structural {
                rule: rule.name.clone(),
                message: "rule has no conditions".to_string(),
            });
        }
        if rule.conditions[0].negated {
            return Err(EngineError::Structural {
                rule: rule.name.clone(),
                message: "first condition cannot be negated".to_string(),
            });
        }

        let mut bound: HashSet<&str> = HashSet::new();
        for pattern in &rule.conditions {
            if pattern.negated {
                for (var, _) in pattern.variables() {
                    if !bound.contains(var) {
                        return Err(EngineError::Structural {
                            rule: rule.name.clone(),
                            message: format!("variable '{var}' in a negated condition has no earlier binding"),
                        });
                    }
                }
            } else {
                for (var, _) in pattern.variables() {
                    bound.insert(var);
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // §6.3 engine surface: assert / retract / run / reset / facts
    // ---------------------------------------------------------------

    /// Assert a new fact and dispatch it through every matching alpha memory
    /// (spec §4.1, §4.2).
    pub fn assert(&mut self, type_tag: &str, attrs: HashMap<String, FactValue>) -> Fact {
        let fact = self.wm.assert(type_tag, attrs);
        self.dispatch_assert(&fact);
        fact
    }

    fn dispatch_assert(&mut self, fact: &Fact) {
        let candidates = self.alpha_network.candidates(fact.type_tag()).to_vec();
        for alpha_idx in candidates {
            if self.alpha_memories[alpha_idx].pattern.matches(fact) {
                self.alpha_right_activate(alpha_idx, fact.clone());
            }
        }
    }

    /// Retract a fact. Idempotent: retracting a fact not currently in
    /// working memory is a silent no-op (spec §4.1, §8 property 5).
    pub fn retract(&mut self, fact: &Fact) {
        let was_live = self.wm.get(fact.id()).is_some();
        self.wm.retract(fact);
        if !was_live {
            return;
        }
        let candidates = self.alpha_network.candidates(fact.type_tag()).to_vec();
        for alpha_idx in candidates {
            self.alpha_deactivate(alpha_idx, fact);
        }
    }

    /// Drain the agenda, firing each activation's rule action exactly once
    /// (spec §4.6). Facts asserted from within an action re-enter `assert`
    /// and are processed before this call returns (spec §5).
    pub fn run(&mut self) {
        let mut iterations = 0usize;
        while let Some(activation) = self.agenda.pop() {
            if let Some(limit) = self.config.max_run_iterations {
                if iterations >= limit {
                    log::warn!("run(): hit max_run_iterations ({limit}); agenda still has pending activations");
                    break;
                }
            }
            iterations += 1;
            self.fire(activation.rule_index, activation.token);
        }
    }

    fn fire(&mut self, rule_index: usize, token: TokenId) {
        let facts = self.tokens.facts(token);
        let bindings = extract_bindings(&self.rules[rule_index], &facts);
        let rule_name = self.rules[rule_index].name.clone();

        // Pull the action out so it (and `self`) can both be borrowed
        // mutably for the call without the borrow checker seeing them as
        // aliasing the same `self.rules[rule_index]` slot.
        let mut action = std::mem::replace(&mut self.rules[rule_index].action, Box::new(|_, _, _| {}));
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            action(&facts, &bindings, self);
        }));
        self.rules[rule_index].action = action;

        if let Err(payload) = outcome {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "action panicked with a non-string payload".to_string());
            let err = EngineError::UserCode { rule: rule_name, message };
            (self.on_failure)(&err);
        }
    }

    /// Remove all facts and tokens, clear every memory and the agenda,
    /// without discarding the compiled network (spec §4.8, §8 property 4).
    pub fn reset(&mut self) {
        self.wm.clear();
        for alpha in &mut self.alpha_memories {
            alpha.clear();
        }
        for (idx, beta) in self.beta_memories.iter_mut().enumerate() {
            if idx == DUMMY_TOP {
                beta.clear_to_root();
            } else {
                beta.clear();
            }
        }
        for join in &mut self.joins {
            join.right_linked = false;
            join.left_linked = false;
        }
        for negation in &mut self.negations {
            negation.clear();
        }
        for production in &mut self.productions {
            production.clear();
        }
        self.agenda.clear();
        self.tokens = TokenArena::new();
    }

    /// Iterate over every currently-live fact (spec §6.3).
    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.wm.iter()
    }

    /// Register an external working-memory observer (spec §4.1, §6.2):
    /// receives `:add`/`:remove` events synchronously, in registration
    /// order, alongside (but independent of) the engine's own alpha
    /// dispatch.
    pub fn register_observer(&mut self, observer: Box<dyn crate::working_memory::WmObserver>) {
        self.wm.register_observer(observer);
    }

    /// Snapshot counters for diagnostics (supplemented feature, SPEC_FULL §9).
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            live_facts: self.wm.len(),
            rules: self.rules.len(),
            alpha_memories: self.alpha_memories.len(),
            beta_memories: self.beta_memories.len(),
            live_tokens: self.tokens.live_count(),
            agenda_depth: self.agenda.len(),
        }
    }

    // ---------------------------------------------------------------
    // §4.2/§4.7 alpha-side dispatch
    // ---------------------------------------------------------------

    fn alpha_right_activate(&mut self, alpha_idx: usize, fact: Fact) {
        let was_empty = self.alpha_memories[alpha_idx].is_empty();
        self.alpha_memories[alpha_idx].insert(fact.clone());
        if was_empty && self.config.unlinking_enabled {
            self.relink_right(alpha_idx);
        }
        let successors = self.alpha_memories[alpha_idx].successors.clone();
        for successor in successors {
            match successor {
                AlphaEdge::Join { index } => self.join_right_activate(index, &fact),
                AlphaEdge::Negation { index } => self.negation_right_activate(index, &fact),
            }
        }
    }

    fn alpha_deactivate(&mut self, alpha_idx: usize, fact: &Fact) {
        let Some(removed) = self.alpha_memories[alpha_idx].remove(fact.id()) else {
            return; // this fact never matched this particular alpha memory
        };
        let successors = self.alpha_memories[alpha_idx].successors.clone();
        for successor in successors {
            match successor {
                AlphaEdge::Join { index } => self.join_right_deactivate(index, &removed),
                AlphaEdge::Negation { index } => self.negation_right_deactivate(index, &removed),
            }
        }
        if self.alpha_memories[alpha_idx].is_empty() && self.config.unlinking_enabled {
            self.unlink_right(alpha_idx);
        }
    }

    fn relink_right(&mut self, alpha_idx: usize) {
        for successor in &self.alpha_memories[alpha_idx].successors {
            if let AlphaEdge::Join { index } = successor {
                self.joins[*index].right_linked = true;
            }
        }
    }

    fn unlink_right(&mut self, alpha_idx: usize) {
        for successor in &self.alpha_memories[alpha_idx].successors {
            if let AlphaEdge::Join { index } = successor {
                self.joins[*index].right_linked = false;
            }
        }
    }

    // ---------------------------------------------------------------
    // §4.3/§4.7 beta-side dispatch
    // ---------------------------------------------------------------

    fn activate_beta(&mut self, beta_idx: usize, token: TokenId) {
        let was_empty = self.beta_memories[beta_idx].is_empty();
        self.beta_memories[beta_idx].insert(token);
        if was_empty && self.config.unlinking_enabled {
            self.relink_left(beta_idx);
        }
        let successors = self.beta_memories[beta_idx].successors.clone();
        for successor in successors {
            match successor {
                BetaEdge::Join { index } => self.join_left_activate(index, token),
                BetaEdge::Negation { index } => self.negation_left_activate(index, token),
                BetaEdge::Production { index } => self.production_left_activate(index, token),
            }
        }
    }

    fn relink_left(&mut self, beta_idx: usize) {
        for successor in &self.beta_memories[beta_idx].successors {
            if let BetaEdge::Join { index } = successor {
                self.joins[*index].left_linked = true;
            }
        }
    }

    fn unlink_left(&mut self, beta_idx: usize) {
        for successor in &self.beta_memories[beta_idx].successors {
            if let BetaEdge::Join { index } = successor {
                self.joins[*index].left_linked = false;
            }
        }
    }

    // ---------------------------------------------------------------
    // §4.4 JoinNode dispatch
    // ---------------------------------------------------------------

    fn join_right_activate(&mut self, join_idx: usize, fact: &Fact) {
        let join = &self.joins[join_idx];
        let beta_tokens = self.beta_memories[join.beta_memory].tokens().to_vec();
        let force_linked = !self.config.unlinking_enabled;
        let matches = self.joins[join_idx].right_activate(fact, &beta_tokens, &self.tokens, force_linked);
        for parent in matches {
            self.build_join_token(join_idx, parent, fact.clone());
        }
    }

    fn join_left_activate(&mut self, join_idx: usize, token: TokenId) {
        let join = &self.joins[join_idx];
        let alpha_items = self.alpha_memories[join.alpha_memory].items().to_vec();
        let force_linked = !self.config.unlinking_enabled;
        let matches = self.joins[join_idx].left_activate(token, &alpha_items, &self.tokens, force_linked);
        for fact in matches {
            self.build_join_token(join_idx, token, fact);
        }
    }

    fn build_join_token(&mut self, join_idx: usize, parent: TokenId, fact: Fact) {
        let output_beta = self.joins[join_idx].successor;
        let child = self.tokens.alloc(Token {
            parent: Some(parent),
            fact: Some(fact),
            owner: output_beta,
            producer: Producer::Join(join_idx),
            children: Vec::new(),
            inhibitors: Vec::new(),
        });
        self.tokens.get_mut(parent).children.push(child);
        self.activate_beta(output_beta, child);
    }

    /// Cascade-delete every token this join produced from `fact` (spec §4.4:
    /// "children whose fact == fact and owner_node == this are unlinked ...
    /// recursively, their own children first").
    fn join_right_deactivate(&mut self, join_idx: usize, fact: &Fact) {
        let beta_memory = self.joins[join_idx].beta_memory;
        let parents = self.beta_memories[beta_memory].tokens().to_vec();
        for parent in parents {
            let doomed: Vec<TokenId> = self
                .tokens
                .get(parent)
                .children
                .iter()
                .copied()
                .filter(|&c| self.tokens.get(c).producer == Producer::Join(join_idx) && self.tokens.get(c).fact.as_ref().map(Fact::id) == Some(fact.id()))
                .collect();
            for child in doomed {
                self.cascade_delete(child);
            }
        }
    }

    // ---------------------------------------------------------------
    // §4.5 NegationNode dispatch
    // ---------------------------------------------------------------

    fn negation_left_activate(&mut self, neg_idx: usize, token: TokenId) {
        let negation = &self.negations[neg_idx];
        let alpha_items = self.alpha_memories[negation.alpha_memory].items().to_vec();
        let inhibitors = self.negations[neg_idx].inhibitors_of(token, &alpha_items, &self.tokens);
        let output_beta = self.negations[neg_idx].successor;
        let inhibited = !inhibitors.is_empty();

        let output = self.tokens.alloc(Token {
            parent: Some(token),
            fact: None,
            owner: output_beta,
            producer: Producer::Negation(neg_idx),
            children: Vec::new(),
            inhibitors,
        });
        self.tokens.get_mut(token).children.push(output);
        self.negations[neg_idx].record_output(token, output);

        if !inhibited {
            self.activate_beta(output_beta, output);
        }
    }

    /// A new fact arrived in the negation's alpha memory: it may newly
    /// inhibit one or more already-propagated tokens (spec §4.5
    /// `right_activate`).
    fn negation_right_activate(&mut self, neg_idx: usize, fact: &Fact) {
        let tracked: Vec<(TokenId, TokenId)> = self.negations[neg_idx].tracked().collect();
        for (input, output) in tracked {
            let token_facts = self.tokens.facts(input);
            if !self.negations[neg_idx].inhibits(&token_facts, fact) {
                continue;
            }
            let was_uninhibited = self.tokens.get(output).inhibitors.is_empty();
            self.tokens.get_mut(output).inhibitors.push(fact.id());
            if was_uninhibited {
                // The match is gone: remove the propagated token from its
                // beta memory and cascade-delete its descendants, but the
                // token itself stays alive in the arena (still tracked by
                // `produced`) so it can be cheaply relinked later.
                self.retract_propagated_negation_output(output);
            }
        }
    }

    /// An inhibiting fact was retracted: if that was the last inhibitor for
    /// some tracked token, it newly matches and is (re-)propagated (spec
    /// §4.5 `right_deactivate`).
    fn negation_right_deactivate(&mut self, neg_idx: usize, fact: &Fact) {
        let tracked: Vec<(TokenId, TokenId)> = self.negations[neg_idx].tracked().collect();
        for (_input, output) in tracked {
            let inhibitors = &mut self.tokens.get_mut(output).inhibitors;
            let Some(pos) = inhibitors.iter().position(|&id| id == fact.id()) else {
                continue;
            };
            inhibitors.remove(pos);
            if self.tokens.get(output).inhibitors.is_empty() {
                self.activate_beta(self.negations[neg_idx].successor, output);
            }
        }
    }

    /// Remove `token` from its owner beta memory and cascade-delete its
    /// descendants, without freeing `token` itself from the arena (used when
    /// a negation's output becomes newly inhibited (the token is pulled
    /// back, not destroyed, since it is still tracked by the negation for
    /// possible future relinking).
    fn retract_propagated_negation_output(&mut self, token: TokenId) {
        let owner = self.tokens.get(token).owner;
        self.beta_memories[owner].remove(token);
        self.detach_from_production(owner, token);
        let children: Vec<TokenId> = self.tokens.get(token).children.drain(..).collect();
        for child in children {
            self.cascade_delete(child);
        }
        self.agenda.cancel(token);
        if self.beta_memories[owner].is_empty() && self.config.unlinking_enabled {
            self.unlink_left(owner);
        }
    }

    // ---------------------------------------------------------------
    // §4.6 ProductionNode dispatch
    // ---------------------------------------------------------------

    fn production_left_activate(&mut self, prod_idx: usize, token: TokenId) {
        self.productions[prod_idx].store(token);
        let rule_index = self.productions[prod_idx].rule_index;
        let priority = self.rules[rule_index].priority;
        self.agenda.push(rule_index, token, priority);
    }

    fn detach_from_production(&mut self, beta_idx: usize, token: TokenId) {
        for successor in self.beta_memories[beta_idx].successors.clone() {
            if let BetaEdge::Production { index } = successor {
                self.productions[index].remove(token);
            }
        }
    }

    // ---------------------------------------------------------------
    // Cascade deletion (spec §3 "children", §4.4, §8 property 3)
    // ---------------------------------------------------------------

    /// Destroy `token` and everything beneath it in the match tree,
    /// deepest-first, unlinking each from its owner memory/production and
    /// cancelling any pending agenda activation along the way. `agenda.cancel`
    /// is safe to call here even for intermediate join/negation tokens that
    /// never reached a production: it only marks an activation void if one
    /// is currently pending for this id (see `Agenda`'s doc comment), so it
    /// can never leave a stale entry that a later, unrelated token reusing
    /// the same recycled arena id would trip over.
    fn cascade_delete(&mut self, token: TokenId) {
        let children: Vec<TokenId> = self.tokens.get(token).children.clone();
        for child in children {
            self.cascade_delete(child);
        }

        let freed = self.tokens.free(token);
        self.beta_memories[freed.owner].remove(token);
        self.detach_from_production(freed.owner, token);
        self.agenda.cancel(token);

        if let Producer::Negation(neg_idx) = freed.producer {
            if let Some(parent) = freed.parent {
                self.negations[neg_idx].forget(parent);
            }
        }
        if let Some(parent) = freed.parent {
            if self.tokens.is_live(parent) {
                let children = &mut self.tokens.get_mut(parent).children;
                if let Some(pos) = children.iter().position(|&c| c == token) {
                    children.remove(pos);
                }
            }
        }

        if self.beta_memories[freed.owner].is_empty() && self.config.unlinking_enabled && freed.owner != DUMMY_TOP {
            self.unlink_left(freed.owner);
        }
    }
}

impl ActionContext for Engine {
    fn assert(&mut self, type_tag: &str, attrs: HashMap<String, FactValue>) -> Fact {
        Engine::assert(self, type_tag, attrs)
    }

    fn retract(&mut self, fact: &Fact) {
        Engine::retract(self, fact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Constraint, Pattern};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn literal_pattern(type_tag: &str, attr: &str, value: impl Into<FactValue>) -> Pattern {
        Pattern::new(type_tag, vec![(attr.to_string(), Constraint::Literal(value.into()))], false)
    }

    fn attrs(pairs: &[(&str, FactValue)]) -> HashMap<String, FactValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    /// S1: single condition, literal match.
    #[test]
    fn s1_single_condition_literal_match() {
        let mut engine = Engine::default();
        let fired = Rc::new(RefCell::new(0));
        let fired_clone = fired.clone();
        engine
            .add_rule(
                Rule::builder("red-car")
                    .condition(literal_pattern("car", "color", "red"))
                    .action(move |_, _, _| *fired_clone.borrow_mut() += 1),
            )
            .unwrap();

        engine.assert("car", attrs(&[("color", "red".into())]));
        engine.assert("car", attrs(&[("color", "blue".into())]));
        engine.run();

        assert_eq!(*fired.borrow(), 1);
    }

    /// S2: two-condition join with a shared variable binding.
    #[test]
    fn s2_two_condition_join() {
        let mut engine = Engine::default();
        let names = Rc::new(RefCell::new(Vec::new()));
        let names_clone = names.clone();

        let driver = Pattern::new("driver", vec![("name".to_string(), Constraint::Variable("?n".to_string()))], false);
        let car = Pattern::new(
            "car",
            vec![
                ("color".to_string(), Constraint::Literal(FactValue::from("red"))),
                ("owner".to_string(), Constraint::Variable("?n".to_string())),
            ],
            false,
        );

        engine
            .add_rule(
                Rule::builder("red-car-owner")
                    .condition(driver)
                    .condition(car)
                    .action(move |_, bindings, _| {
                        if let Some(FactValue::String(n)) = bindings.get("?n") {
                            names_clone.borrow_mut().push(n.clone());
                        }
                    }),
            )
            .unwrap();

        engine.assert("driver", attrs(&[("name", "Alice".into())]));
        engine.assert("car", attrs(&[("color", "red".into()), ("owner", "Alice".into())]));
        engine.assert("car", attrs(&[("color", "red".into()), ("owner", "Bob".into())]));
        engine.run();

        assert_eq!(*names.borrow(), vec!["Alice".to_string()]);
    }

    /// S3: negation: assert, inhibit, re-run, retract inhibitor, re-run.
    #[test]
    fn s3_negation_duality() {
        let mut engine = Engine::default();
        let fires = Rc::new(RefCell::new(0));
        let fires_clone = fires.clone();

        let sensor = Pattern::new("sensor", vec![("temp".to_string(), Constraint::Variable("?t".to_string()))], false);
        let alarm = literal_pattern("alarm", "active", true).with_negated();

        engine
            .add_rule(
                Rule::builder("no-alarm")
                    .condition(sensor)
                    .condition(alarm)
                    .action(move |_, _, _| *fires_clone.borrow_mut() += 1),
            )
            .unwrap();

        engine.assert("sensor", attrs(&[("temp", 100.0.into())]));
        engine.run();
        assert_eq!(*fires.borrow(), 1);

        let alarm_fact = engine.assert("alarm", attrs(&[("active", true.into())]));
        engine.run();
        assert_eq!(*fires.borrow(), 1, "inhibited match must not fire again");

        engine.retract(&alarm_fact);
        engine.run();
        assert_eq!(*fires.borrow(), 2);
    }

    /// S5: cascaded retraction removes the downstream production token.
    #[test]
    fn s5_cascaded_retraction() {
        let mut engine = Engine::default();
        let fires = Rc::new(RefCell::new(0));
        let fires_clone = fires.clone();

        let a = Pattern::new("a", vec![("x".to_string(), Constraint::Variable("?v".to_string()))], false);
        let b = Pattern::new("b", vec![("y".to_string(), Constraint::Variable("?v".to_string()))], false);

        engine
            .add_rule(Rule::builder("ab-join").condition(a).condition(b).action(move |_, _, _| *fires_clone.borrow_mut() += 1))
            .unwrap();

        let fa = engine.assert("a", attrs(&[("x", 1.0.into())]));
        engine.assert("b", attrs(&[("y", 1.0.into())]));
        engine.run();
        assert_eq!(*fires.borrow(), 1);

        engine.retract(&fa);
        engine.run();
        assert_eq!(*fires.borrow(), 1, "retracting an ancestor fact must cancel the pending/fired match, not add a new fire");
        assert_eq!(engine.stats().live_tokens, 1, "only the root token should remain");
    }

    /// S6: reset() leaves no stale partial matches across cycles.
    #[test]
    fn s6_reset_across_cycles() {
        let mut engine = Engine::default();
        let fires = Rc::new(RefCell::new(0));
        let fires_clone = fires.clone();

        let driver = Pattern::new("driver", vec![("name".to_string(), Constraint::Variable("?n".to_string()))], false);
        let car = Pattern::new(
            "car",
            vec![
                ("color".to_string(), Constraint::Literal(FactValue::from("red"))),
                ("owner".to_string(), Constraint::Variable("?n".to_string())),
            ],
            false,
        );
        engine
            .add_rule(
                Rule::builder("red-car-owner")
                    .condition(driver)
                    .condition(car)
                    .action(move |_, _, _| *fires_clone.borrow_mut() += 1),
            )
            .unwrap();

        engine.assert("driver", attrs(&[("name", "Alice".into())]));
        engine.assert("car", attrs(&[("color", "red".into()), ("owner", "Alice".into())]));
        engine.run();
        assert_eq!(*fires.borrow(), 1);

        engine.reset();
        assert_eq!(engine.facts().count(), 0);
        assert_eq!(engine.stats().live_tokens, 1);

        engine.assert("driver", attrs(&[("name", "Alice".into())]));
        engine.run();
        assert_eq!(*fires.borrow(), 1, "no stale car token should survive the reset");
    }

    #[test]
    fn rejects_duplicate_rule_names() {
        let mut engine = Engine::default();
        let rule = || Rule::builder("dup").condition(literal_pattern("car", "color", "red")).action(|_, _, _| {});
        engine.add_rule(rule()).unwrap();
        assert!(engine.add_rule(rule()).is_err());
    }

    #[test]
    fn rejects_negated_first_condition() {
        let mut engine = Engine::default();
        let result = engine.add_rule(Rule::builder("bad").condition(literal_pattern("car", "color", "red").with_negated()).action(|_, _, _| {}));
        assert!(result.is_err());
    }

    #[test]
    fn backfill_seeds_new_rule_from_existing_facts() {
        let mut engine = Engine::default();
        engine.assert("car", attrs(&[("color", "red".into())]));

        let fired = Rc::new(RefCell::new(0));
        let fired_clone = fired.clone();
        engine
            .add_rule(Rule::builder("late-rule").condition(literal_pattern("car", "color", "red")).action(move |_, _, _| *fired_clone.borrow_mut() += 1))
            .unwrap();
        engine.run();
        assert_eq!(*fired.borrow(), 1, "backfill_on_add_rule defaults to true");
    }

    /// A production token cascade-deleted before it fires frees both its own
    /// arena id and its (never-agenda-tracked) intermediate join token's id.
    /// A later, unrelated rule's production token can legitimately be
    /// allocated one of those freed ids. That reuse must never cause the
    /// later token's real activation to be mistaken for the earlier
    /// cancelled one and silently dropped.
    #[test]
    fn cascade_cancelling_an_intermediate_token_does_not_poison_a_recycled_id() {
        let mut engine = Engine::default();
        let r2_fired = Rc::new(RefCell::new(0));
        let r2_fired_clone = r2_fired.clone();

        let a = Pattern::new("a", vec![("x".to_string(), Constraint::Variable("?v".to_string()))], false);
        let b = Pattern::new("b", vec![("y".to_string(), Constraint::Variable("?v".to_string()))], false);
        engine.add_rule(Rule::builder("r1-ab-join").condition(a).condition(b).action(|_, _, _| {})).unwrap();
        engine
            .add_rule(Rule::builder("r2-single").condition(literal_pattern("c", "z", 5.0)).action(move |_, _, _| *r2_fired_clone.borrow_mut() += 1))
            .unwrap();

        // Build r1's intermediate join token and production token, then
        // retract the ancestor fact before run() ever drains the agenda:
        // both tokens are freed by cascade_delete without ever firing.
        let fa = engine.assert("a", attrs(&[("x", 1.0.into())]));
        engine.assert("b", attrs(&[("y", 1.0.into())]));
        engine.retract(&fa);

        // A brand new, unrelated production token for r2 may now be
        // allocated one of the ids just freed above.
        engine.assert("c", attrs(&[("z", 5.0.into())]));
        engine.run();

        assert_eq!(*r2_fired.borrow(), 1, "a legitimate activation must not be discarded because it reused a cancelled token's freed id");
    }
}
