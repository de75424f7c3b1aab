//! Working memory: the live fact set and the observer-broadcast channel
//! feeding the alpha network (spec §4.1, §6.2).

use crate::fact::{Fact, FactId, FactIdGen, FactValue};
use std::collections::HashMap;

/// An add/remove notification broadcast synchronously to every registered
/// observer, in registration order.
pub enum WmEvent<'a> {
    Add(&'a Fact),
    Remove(&'a Fact),
}

/// Something that wants to hear about working-memory changes. The engine's
/// own alpha dispatcher is not implemented as one of these: it runs
/// in-process as the first, mandatory step of `assert`/`retract`, but
/// external listeners (audit trails, UIs, ...) register through this trait,
/// matching the observer contract spec §6.2 requires of any working-memory
/// implementation.
pub trait WmObserver {
    fn notify(&mut self, event: WmEvent<'_>);
}

/// Contract a replacement working-memory backend must satisfy (spec §6.2).
/// `WorkingMemory` below is the engine's own in-memory implementation of
/// this contract; an embedder wanting a persistent backend implements the
/// same trait and the engine core is otherwise unaware of the difference
/// (the core only ever talks to working memory through `assert`/`retract`/
/// iteration plus the observer channel).
pub trait WorkingMemoryBackend {
    fn assert(&mut self, type_tag: &str, attrs: HashMap<String, FactValue>) -> Fact;
    fn retract(&mut self, fact: &Fact);
    fn each_fact(&self) -> Box<dyn Iterator<Item = &Fact> + '_>;
    fn register_observer(&mut self, observer: Box<dyn WmObserver>);
}

/// The engine's in-memory working memory.
#[derive(Default)]
pub struct WorkingMemory {
    facts: HashMap<FactId, Fact>,
    id_gen: FactIdGen,
    observers: Vec<Box<dyn WmObserver>>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently-live facts.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Look a fact up by id (used to validate handles on retraction).
    pub fn get(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(&id)
    }

    /// Iterate over all live facts without the `each_fact` trait method's
    /// `Box<dyn Iterator>` indirection.
    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.values()
    }

    /// Drop every live fact without notifying observers (spec §4.8
    /// `reset()` is a bulk administrative wipe, not a sequence of
    /// individual retractions: observers are not meant to replay N
    /// `:remove` events for it).
    pub fn clear(&mut self) {
        self.facts.clear();
    }
}

impl WorkingMemoryBackend for WorkingMemory {
    /// Create and store a new fact, broadcasting an `:add` event to every
    /// observer in registration order.
    fn assert(&mut self, type_tag: &str, attrs: HashMap<String, FactValue>) -> Fact {
        let id = self.id_gen.next();
        let fact = Fact::new(id, type_tag, attrs);
        self.facts.insert(id, fact.clone());
        for observer in &mut self.observers {
            observer.notify(WmEvent::Add(&fact));
        }
        fact
    }

    /// Remove a fact, broadcasting a `:remove` event. Idempotent: retracting
    /// a fact that is not currently live is a silent no-op (spec §4.1,
    /// §8 property 5).
    fn retract(&mut self, fact: &Fact) {
        if let Some(removed) = self.facts.remove(&fact.id()) {
            for observer in &mut self.observers {
                observer.notify(WmEvent::Remove(&removed));
            }
        }
    }

    fn each_fact(&self) -> Box<dyn Iterator<Item = &Fact> + '_> {
        Box::new(self.facts.values())
    }

    fn register_observer(&mut self, observer: Box<dyn WmObserver>) {
        self.observers.push(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder(Rc<RefCell<Vec<String>>>);
    impl WmObserver for Recorder {
        fn notify(&mut self, event: WmEvent<'_>) {
            let tag = match event {
                WmEvent::Add(f) => format!("add:{}", f.id()),
                WmEvent::Remove(f) => format!("remove:{}", f.id()),
            };
            self.0.borrow_mut().push(tag);
        }
    }

    #[test]
    fn retract_unknown_fact_is_idempotent_noop() {
        let mut wm = WorkingMemory::new();
        let f = wm.assert("car", HashMap::new());
        wm.retract(&f);
        // second retract of the same (already-gone) fact is a no-op
        wm.retract(&f);
        assert_eq!(wm.len(), 0);
    }

    #[test]
    fn observers_see_events_synchronously_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut wm = WorkingMemory::new();
        wm.register_observer(Box::new(Recorder(log.clone())));
        let f1 = wm.assert("car", HashMap::new());
        wm.retract(&f1);
        assert_eq!(*log.borrow(), vec![format!("add:{}", f1.id()), format!("remove:{}", f1.id())]);
    }
}
