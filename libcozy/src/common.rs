//! Small utilities shared across the crate: fresh-name generation and the
//! ordered-collection aliases the rest of the crate builds on.
//!
//! Grounded on `cozy/common.py`'s `fresh_name`/`Counter` helpers (a single
//! process-wide counter, newly required to be shared safely across the
//! worker threads that §5 of SPEC_FULL.md introduces) and the teacher's
//! `shared::NameGen`, which plays the same role for the jankyscript
//! pipeline's renaming passes.

use std::sync::Mutex;

use indexmap::{IndexMap, IndexSet};

/// An insertion-ordered set, used wherever the original relies on Python's
/// dict-preserves-insertion-order sets (e.g. free variable sets, where
/// order affects the order parameters are later emitted in).
pub type OrderedSet<T> = IndexSet<T>;

/// An insertion-ordered map, used for `concrete_state`, `query_specs`,
/// `updates`, and `handle_updates` in the implementation data model
/// (SPEC_FULL.md §3), where iteration order is observable in the emitted
/// code and must be deterministic.
pub type OrderedMap<K, V> = IndexMap<K, V>;

/// Process-wide fresh-name counter. A single `NameGen` is shared (behind
/// an `Arc`) across every worker thread so that names synthesized by
/// concurrent `ImproveQueryJob`s never collide, mirroring the original's
/// reliance on a single-process global counter even though here the
/// workers are threads rather than Python's `Job` objects.
pub struct NameGen {
    next: Mutex<u64>,
    prefix: String,
}

impl NameGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        NameGen {
            next: Mutex::new(0),
            prefix: prefix.into(),
        }
    }

    /// Returns a name guaranteed distinct from every other name this
    /// generator has produced. `avoid` mirrors `fresh_name(formula, avoid)`:
    /// when the caller already has a preferred name in mind that happens
    /// not to collide with anything in `avoid`, use it unchanged.
    pub fn fresh_name(&self, hint: &str, avoid: &OrderedSet<String>) -> String {
        if !avoid.contains(hint) {
            return hint.to_string();
        }
        loop {
            let n = {
                let mut next = self.next.lock().unwrap();
                let n = *next;
                *next += 1;
                n
            };
            let candidate = format!("{}{}_{}", self.prefix, hint, n);
            if !avoid.contains(&candidate) {
                return candidate;
            }
        }
    }
}

impl Default for NameGen {
    fn default() -> Self {
        NameGen::new("_v")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_name_reuses_hint_when_unused() {
        let gen = NameGen::default();
        let avoid = OrderedSet::new();
        assert_eq!(gen.fresh_name("x", &avoid), "x");
    }

    #[test]
    fn fresh_name_avoids_collisions() {
        let gen = NameGen::default();
        let mut avoid = OrderedSet::new();
        avoid.insert("x".to_string());
        let name = gen.fresh_name("x", &avoid);
        assert_ne!(name, "x");
        assert!(!avoid.contains(&name));
    }

    #[test]
    fn fresh_name_is_unique_across_calls() {
        let gen = NameGen::default();
        let mut avoid = OrderedSet::new();
        avoid.insert("x".to_string());
        let a = gen.fresh_name("x", &avoid);
        avoid.insert(a.clone());
        let b = gen.fresh_name("x", &avoid);
        assert_ne!(a, b);
    }
}
