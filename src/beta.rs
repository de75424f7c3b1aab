//! The beta network: memories holding partial-match tokens between a rule's
//! conditions (spec §3/§4.3).

use crate::token::TokenId;

/// A successor of a beta memory: a join, a negation, or a terminal
/// production node. Productions are never unlinked: they are the point of
/// the match, not an intermediate stage to elide.
#[derive(Debug, Clone, Copy)]
pub enum BetaEdge {
    Join { index: usize },
    Negation { index: usize },
    Production { index: usize },
}

impl BetaEdge {
    pub fn node_index(&self) -> usize {
        match self {
            BetaEdge::Join { index } => *index,
            BetaEdge::Negation { index } => *index,
            BetaEdge::Production { index } => *index,
        }
    }
}

/// `(tokens, successors)` from spec §3/§4.3. The dummy-top beta memory
/// (index 0) holds only [`crate::token::ROOT_TOKEN`] and is never emptied.
#[derive(Default)]
pub struct BetaMemory {
    tokens: Vec<TokenId>,
    pub successors: Vec<BetaEdge>,
}

impl BetaMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dummy-top memory, pre-seeded with the root token so the first
    /// join in every rule's chain has something to left-activate against.
    pub fn dummy_top() -> Self {
        Self {
            tokens: vec![crate::token::ROOT_TOKEN],
            successors: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    /// Record a newly-built token as belonging to this memory. Propagating
    /// it to `successors`' left-activation is the caller's job (the engine
    /// drives dispatch so it can also maintain each successor join's
    /// `right_linked` flag as this memory's emptiness transitions).
    pub fn insert(&mut self, token: TokenId) {
        self.tokens.push(token);
    }

    /// Remove a token (by id) from this memory, e.g. during cascade-delete.
    pub fn remove(&mut self, token: TokenId) {
        if let Some(pos) = self.tokens.iter().position(|&t| t == token) {
            self.tokens.remove(pos);
        }
    }

    /// Drop all tokens (spec §4.8 `reset()`), keeping `successors`.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Same as `clear`, but re-seeds the root token (for the dummy-top
    /// memory only, whose root token survives every `reset()`).
    pub fn clear_to_root(&mut self) {
        self.tokens.clear();
        self.tokens.push(crate::token::ROOT_TOKEN);
    }
}
