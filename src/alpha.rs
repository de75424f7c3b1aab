//! The discrimination (alpha) network: one [`AlphaMemory`] per distinct
//! pattern, plus the [`AlphaNetwork`] index that shares a memory between
//! rules declaring structurally identical first-stage patterns (spec §4.2).

use crate::fact::Fact;
use crate::pattern::{Pattern, PatternKey};
use std::collections::HashMap;

/// A successor of an alpha memory: either a join node or a negation node.
/// Unlike the beta side, a *memory's* own emptiness never gates dispatch
/// along these edges: whether a join actually bothers scanning this
/// memory's items is the join's own `left_linked` flag (gated by *this*
/// memory's emptiness, but stored on the join so it can be addressed
/// per-edge: a pattern shared between a join and a negation must unlink
/// the join without ever affecting the negation, spec §4.7).
#[derive(Debug, Clone, Copy)]
pub enum AlphaEdge {
    Join { index: usize },
    Negation { index: usize },
}

impl AlphaEdge {
    pub fn node_index(&self) -> usize {
        match self {
            AlphaEdge::Join { index } => *index,
            AlphaEdge::Negation { index } => *index,
        }
    }
}

/// `(pattern, items, successors)` from spec §3/§4.2.
pub struct AlphaMemory {
    pub pattern: Pattern,
    items: Vec<Fact>,
    pub successors: Vec<AlphaEdge>,
}

impl AlphaMemory {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            items: Vec::new(),
            successors: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Fact] {
        &self.items
    }

    /// Append a fact.
    pub fn insert(&mut self, fact: Fact) {
        self.items.push(fact);
    }

    /// Remove and return the fact with this id, if present.
    pub fn remove(&mut self, fact_id: crate::fact::FactId) -> Option<Fact> {
        let pos = self.items.iter().position(|f| f.id() == fact_id)?;
        Some(self.items.remove(pos))
    }

    /// Drop all items (spec §4.8 `reset()`), keeping `pattern` and
    /// `successors` (the compiled network survives a reset).
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Deduplicates alpha memories by canonical pattern key (spec §4.2, §4.8
/// step 2a).
#[derive(Default)]
pub struct AlphaNetwork {
    by_key: HashMap<PatternKey, usize>,
    /// Secondary index used at dispatch time: every alpha memory declared
    /// over a given type tag, regardless of its other constraints (several
    /// memories can share a type tag while differing in predicates/literals,
    /// so this is a one-to-many fan-out, unlike `by_key`).
    by_type: HashMap<String, Vec<usize>>,
}

impl AlphaNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the alpha-memory index for `pattern`'s key, if one was
    /// already created.
    pub fn lookup(&self, key: &PatternKey) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    /// Register a freshly-created alpha memory under `key`.
    pub fn register(&mut self, type_tag: &str, key: PatternKey, memory_index: usize) {
        self.by_key.insert(key, memory_index);
        self.by_type.entry(type_tag.to_string()).or_default().push(memory_index);
    }

    /// Every alpha memory whose type tag matches `type_tag`: the candidate
    /// set a newly-asserted fact of that type must be tested against.
    pub fn candidates(&self, type_tag: &str) -> &[usize] {
        self.by_type.get(type_tag).map(Vec::as_slice).unwrap_or(&[])
    }
}
