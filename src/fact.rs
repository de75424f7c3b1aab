//! Facts: the typed, immutable values that make up working memory.
//!
//! A [`Fact`] pairs an engine-assigned [`FactId`] with a `type_tag` and an
//! attribute map of dynamically-typed [`FactValue`]s. Facts are cheap to
//! clone (attributes are stored behind an `Arc`) because the same fact is
//! held concurrently by working memory and by every alpha memory it
//! currently matches.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Engine-assigned fact identity. Distinct facts never share an id, even if
/// their attributes are equal-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactId(u64);

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fact#{}", self.0)
    }
}

/// Monotonic id generator shared by a [`crate::working_memory::WorkingMemory`].
#[derive(Debug, Default)]
pub(crate) struct FactIdGen(AtomicU64);

impl FactIdGen {
    pub(crate) fn next(&self) -> FactId {
        FactId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Dynamically-typed attribute value. Cross-type comparisons always yield
/// `false`; there is no implicit coercion between numbers and strings.
#[derive(Clone)]
pub enum FactValue {
    /// Floating-point number. Integral values are represented here too;
    /// the engine does not distinguish ints from floats at this layer.
    Number(f64),
    /// Text.
    String(String),
    /// Truth value.
    Bool(bool),
    /// Interned-style symbolic atom, compared by string equality but kept
    /// distinct from `String` so rule authors can tell intent apart.
    Symbol(String),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Escape hatch for embedder-defined payloads the engine never
    /// inspects. Equality is identity (`Arc::ptr_eq`): two `Opaque` values
    /// compare equal only if they wrap the same allocation.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl FactValue {
    /// The nil sentinel a `Variable` constraint binds to when the attribute
    /// is absent from the fact (spec §3: "matches anything including a
    /// missing attribute (binds to the nil sentinel)").
    pub fn nil() -> FactValue {
        FactValue::Symbol("nil".to_string())
    }
}

impl fmt::Debug for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Number(n) => write!(f, "Number({n})"),
            FactValue::String(s) => write!(f, "String({s:?})"),
            FactValue::Bool(b) => write!(f, "Bool({b})"),
            FactValue::Symbol(s) => write!(f, "Symbol({s})"),
            FactValue::Timestamp(t) => write!(f, "Timestamp({t})"),
            FactValue::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

impl PartialEq for FactValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FactValue::Number(a), FactValue::Number(b)) => a == b,
            (FactValue::String(a), FactValue::String(b)) => a == b,
            (FactValue::Bool(a), FactValue::Bool(b)) => a == b,
            (FactValue::Symbol(a), FactValue::Symbol(b)) => a == b,
            (FactValue::Timestamp(a), FactValue::Timestamp(b)) => a == b,
            (FactValue::Opaque(a), FactValue::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<f64> for FactValue {
    fn from(n: f64) -> Self {
        FactValue::Number(n)
    }
}

impl From<i64> for FactValue {
    fn from(n: i64) -> Self {
        FactValue::Number(n as f64)
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        FactValue::String(s.to_string())
    }
}

impl From<String> for FactValue {
    fn from(s: String) -> Self {
        FactValue::String(s)
    }
}

impl From<bool> for FactValue {
    fn from(b: bool) -> Self {
        FactValue::Bool(b)
    }
}

/// An immutable, engine-assigned fact: `(type_tag, attribute_map)`.
///
/// Cloning a `Fact` is cheap (the attribute map is shared via `Arc`), which
/// is what lets the same fact live in working memory and in every alpha
/// memory whose pattern it satisfies without per-clone allocation.
#[derive(Clone)]
pub struct Fact {
    id: FactId,
    type_tag: Arc<str>,
    attributes: Arc<HashMap<String, FactValue>>,
}

impl Fact {
    pub(crate) fn new(id: FactId, type_tag: impl Into<Arc<str>>, attributes: HashMap<String, FactValue>) -> Self {
        Self {
            id,
            type_tag: type_tag.into(),
            attributes: Arc::new(attributes),
        }
    }

    /// This fact's engine-assigned identity.
    pub fn id(&self) -> FactId {
        self.id
    }

    /// The closed-set type symbol this fact was asserted under.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Look up an attribute by name. Absent attributes return `None`; it
    /// is up to the caller (pattern matching, join tests) to decide whether
    /// that means "fails" or "binds to nil".
    pub fn get(&self, attribute: &str) -> Option<&FactValue> {
        self.attributes.get(attribute)
    }

    /// Iterate over all attributes.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &FactValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fact")
            .field("id", &self.id)
            .field("type_tag", &self.type_tag)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Fact {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_facts_have_distinct_identity_even_if_equal_valued() {
        let gen = FactIdGen::default();
        let mut attrs = HashMap::new();
        attrs.insert("color".to_string(), FactValue::from("red"));
        let a = Fact::new(gen.next(), "car", attrs.clone());
        let b = Fact::new(gen.next(), "car", attrs);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.get("color"), b.get("color"));
    }

    #[test]
    fn cross_type_comparisons_are_unequal() {
        assert_ne!(FactValue::Number(1.0), FactValue::String("1".to_string()));
        assert_ne!(FactValue::Bool(true), FactValue::Number(1.0));
    }

    #[test]
    fn opaque_equality_is_identity() {
        let shared: Arc<dyn Any + Send + Sync> = Arc::new(42usize);
        let a = FactValue::Opaque(shared.clone());
        let b = FactValue::Opaque(shared);
        let c = FactValue::Opaque(Arc::new(42usize));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
