//! Patterns: the intra-fact constraints carried by one rule condition, and
//! the cross-fact [`JoinTest`]s derived from variables shared across
//! conditions.

use crate::fact::{Fact, FactValue};
use std::sync::Arc;

/// One entry of a pattern's constraint map (spec §3).
#[derive(Clone)]
pub enum Constraint {
    /// The attribute must equal this value exactly.
    Literal(FactValue),
    /// A unary boolean function; fails (does not match) if the attribute is
    /// missing. Two textually-identical predicates built from separate
    /// closures are distinct for alpha-memory sharing purposes: predicates
    /// are deduplicated by identity, never by equivalence (spec §4.2).
    Predicate(Arc<dyn Fn(&FactValue) -> bool + Send + Sync>),
    /// A symbolic placeholder. Always passes; records the attribute name so
    /// the production node can extract a binding later.
    Variable(String),
}

impl Constraint {
    /// Does this attribute value satisfy the constraint? `value` is `None`
    /// when the attribute is absent from the fact. A panicking predicate is
    /// isolated and treated as a non-match (spec §7: "a failing predicate
    /// is treated as false"), not propagated to tear down matching.
    fn accepts(&self, value: Option<&FactValue>) -> bool {
        match self {
            Constraint::Literal(expected) => value == Some(expected),
            Constraint::Predicate(pred) => {
                let Some(value) = value else { return false };
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pred(value))).unwrap_or_else(|_| {
                    log::warn!("predicate panicked during matching; treating as non-match");
                    false
                })
            }
            Constraint::Variable(_) => true,
        }
    }

    fn predicate_identity(&self) -> Option<usize> {
        match self {
            Constraint::Predicate(p) => Some(Arc::as_ptr(p) as *const () as usize),
            _ => None,
        }
    }
}

/// One rule condition's intra-fact pattern: `(type_tag, constraint_map,
/// negated_flag)`.
#[derive(Clone)]
pub struct Pattern {
    pub type_tag: String,
    /// Ordered so pattern-key canonicalization and join-test derivation are
    /// deterministic; order carries no matching semantics.
    pub constraints: Vec<(String, Constraint)>,
    pub negated: bool,
}

impl Pattern {
    pub fn new(type_tag: impl Into<String>, constraints: Vec<(String, Constraint)>, negated: bool) -> Self {
        let mut constraints = constraints;
        constraints.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            type_tag: type_tag.into(),
            constraints,
            negated,
        }
    }

    /// Builder-style helper to flip `negated` on, for call sites that build
    /// a pattern inline and want to mark it negated without repeating the
    /// whole constructor call.
    pub fn with_negated(mut self) -> Self {
        self.negated = true;
        self
    }

    /// Does `fact` satisfy this pattern's intra-fact constraints? Type tag
    /// is checked by the caller (alpha-memory dispatch keys on it first).
    pub fn matches(&self, fact: &Fact) -> bool {
        self.constraints
            .iter()
            .all(|(attr, constraint)| constraint.accepts(fact.get(attr)))
    }

    /// Canonical key used to deduplicate alpha memories: two patterns with
    /// structurally-equal type tag and constraint map (literal/variable
    /// compared by value, predicate by closure identity) share one alpha
    /// memory (spec §4.2).
    pub fn key(&self) -> PatternKey {
        let entries = self
            .constraints
            .iter()
            .map(|(attr, c)| {
                let kind = match c {
                    Constraint::Literal(v) => ConstraintKey::Literal(FactValueKey::from(v)),
                    Constraint::Predicate(_) => ConstraintKey::Predicate(c.predicate_identity().unwrap()),
                    Constraint::Variable(_) => ConstraintKey::Variable,
                };
                (attr.clone(), kind)
            })
            .collect();
        PatternKey {
            type_tag: self.type_tag.clone(),
            entries,
        }
    }

    /// The variable name bound at `attribute`, if this pattern binds one
    /// there.
    pub fn variable_at(&self, attribute: &str) -> Option<&str> {
        self.constraints.iter().find_map(|(attr, c)| {
            if attr == attribute {
                match c {
                    Constraint::Variable(name) => Some(name.as_str()),
                    _ => None,
                }
            } else {
                None
            }
        })
    }

    /// All variables this pattern binds, as `(variable_name, attribute)`.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.constraints.iter().filter_map(|(attr, c)| match c {
            Constraint::Variable(name) => Some((name.as_str(), attr.as_str())),
            _ => None,
        })
    }
}

/// Hashable/comparable stand-in for [`FactValue`] used only for pattern-key
/// canonicalization (floats are compared by bit pattern here, which is fine
/// since a pattern key only needs to distinguish *literal* constraints, not
/// perform numeric comparison).
#[derive(Clone, PartialEq, Eq, Hash)]
enum FactValueKey {
    Number(u64),
    String(String),
    Bool(bool),
    Symbol(String),
    Timestamp(i64),
    Opaque,
}

impl From<&FactValue> for FactValueKey {
    fn from(v: &FactValue) -> Self {
        match v {
            FactValue::Number(n) => FactValueKey::Number(n.to_bits()),
            FactValue::String(s) => FactValueKey::String(s.clone()),
            FactValue::Bool(b) => FactValueKey::Bool(*b),
            FactValue::Symbol(s) => FactValueKey::Symbol(s.clone()),
            FactValue::Timestamp(t) => FactValueKey::Timestamp(t.timestamp_nanos_opt().unwrap_or_default()),
            // Opaque values are never literal-comparable in a meaningful
            // way across rules; collapse to a single key so two patterns
            // that happen to both hold an Opaque literal do NOT
            // accidentally dedup onto one alpha memory.
            FactValue::Opaque(_) => FactValueKey::Opaque,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum ConstraintKey {
    Literal(FactValueKey),
    Predicate(usize),
    Variable,
}

/// Canonicalized alpha-memory pattern key (spec §4.2/§4.8).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PatternKey {
    type_tag: String,
    entries: Vec<(String, ConstraintKey)>,
}

/// A cross-fact equality constraint derived from a variable shared between
/// an earlier condition and the current one: `(token_slot_index,
/// token_slot_attribute, fact_attribute)` (spec §3/§4.8).
#[derive(Clone, Debug)]
pub struct JoinTest {
    /// Index into the token's fact chain (condition order) of the earlier
    /// condition that first bound the shared variable.
    pub token_slot_index: usize,
    /// Attribute read off the fact bound at that earlier condition.
    pub token_slot_attribute: String,
    /// Attribute read off the candidate fact being joined in now.
    pub fact_attribute: String,
}

impl JoinTest {
    pub fn new(token_slot_index: usize, token_slot_attribute: impl Into<String>, fact_attribute: impl Into<String>) -> Self {
        Self {
            token_slot_index,
            token_slot_attribute: token_slot_attribute.into(),
            fact_attribute: fact_attribute.into(),
        }
    }

    /// Evaluate the test: does the value bound at this test's token slot
    /// equal the fact's value at `fact_attribute`? Absent-vs-absent
    /// compares equal; absent-vs-present never does (spec §4.4).
    pub fn passes(&self, token_slot_fact: Option<&Fact>, candidate: &Fact) -> bool {
        let left = token_slot_fact.and_then(|f| f.get(&self.token_slot_attribute));
        let right = candidate.get(&self.fact_attribute);
        match (left, right) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}
