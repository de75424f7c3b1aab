//! Rules: the input contract an embedder builds against (spec §6.1).

use crate::fact::{Fact, FactValue};
use crate::pattern::Pattern;
use std::collections::HashMap;
use std::fmt;

/// The subset of the engine surface (spec §6.3) an action is allowed to call
/// back into while it is firing: asserting or retracting facts. Spec §5
/// documents that facts asserted from within an action "re-enter the assert
/// path" and are drained by the same outer `run()` call; that reentrancy is
/// only possible if the action has a handle back to the engine, so this
/// trait is the ambient piece spec §6.1's bare `(facts, bindings)` action
/// signature needs in order to actually be useful for production rules
/// (resolved open question, see DESIGN.md).
pub trait ActionContext {
    /// Assert a new fact, as [`crate::engine::Engine::assert`].
    fn assert(&mut self, type_tag: &str, attrs: HashMap<String, FactValue>) -> Fact;
    /// Retract a fact, as [`crate::engine::Engine::retract`].
    fn retract(&mut self, fact: &Fact);
}

/// A rule's action: invoked once per firing with the matched facts in
/// condition order, the variable bindings extracted from them, and a handle
/// back to the engine for assert/retract. Not `Send`: the engine is
/// single-threaded (spec §5) and actions routinely close over
/// engine-external state (loggers, accumulators) that has no reason to be
/// thread-safe.
pub type Action = Box<dyn FnMut(&[Fact], &HashMap<String, FactValue>, &mut dyn ActionContext)>;

/// One compiled-from rule: an ordered list of conditions plus the action to
/// run when they are all satisfied (spec §6.1).
pub struct Rule {
    pub name: String,
    /// Higher fires first; ties break FIFO by match-completion order (spec
    /// §4.6). Defaults to 0.
    pub priority: i32,
    /// Conditions in declaration order; this order is also the token's
    /// fact-chain order (spec §3 invariant 1) and the index space
    /// [`crate::pattern::JoinTest::token_slot_index`] refers into.
    pub conditions: Vec<Pattern>,
    pub action: Action,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("conditions", &self.conditions.len())
            .finish()
    }
}

impl Rule {
    pub fn builder(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder {
            name: name.into(),
            priority: 0,
            conditions: Vec::new(),
        }
    }
}

/// Fluent constructor for a [`Rule`]; call [`RuleBuilder::action`] last to
/// consume the builder into a finished rule.
pub struct RuleBuilder {
    name: String,
    priority: i32,
    conditions: Vec<Pattern>,
}

impl RuleBuilder {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn condition(mut self, pattern: Pattern) -> Self {
        self.conditions.push(pattern);
        self
    }

    /// Finish the rule with its action, consuming the builder.
    pub fn action(self, action: impl FnMut(&[Fact], &HashMap<String, FactValue>, &mut dyn ActionContext) + 'static) -> Rule {
        Rule {
            name: self.name,
            priority: self.priority,
            conditions: self.conditions,
            action: Box::new(action),
        }
    }
}

/// Extract every variable binding a rule's conditions declared, by reading
/// each bound attribute off the corresponding fact in `facts` (condition
/// order). A variable bound to a missing attribute resolves to
/// [`FactValue::nil`] (spec §3).
pub fn extract_bindings(rule: &Rule, facts: &[Fact]) -> HashMap<String, FactValue> {
    let mut bindings = HashMap::new();
    // `facts` (from `TokenArena::facts`) holds one entry per *non-negated*
    // condition only (a negation never binds a fact into the token, spec
    // §3 invariant 3), so the two sequences are walked with separate
    // cursors rather than zipped positionally.
    let mut fact_cursor = facts.iter();
    for pattern in &rule.conditions {
        if pattern.negated {
            continue;
        }
        let Some(fact) = fact_cursor.next() else { break };
        for (var, attr) in pattern.variables() {
            let value = fact.get(attr).cloned().unwrap_or_else(FactValue::nil);
            bindings.insert(var.to_string(), value);
        }
    }
    bindings
}
