//! Per-worker string interner (spec §4.1, C1).
//!
//! Deduplicates the short, frequently repeated strings the extractor
//! produces (names, kinds, module specifiers, container paths). No eviction
//! within a worker's life — per spec §9 Open Questions, this trades memory
//! for simplicity and is not revisited here. The interner is discarded with
//! its owning worker.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A single worker-thread's string table.
///
/// Not `Send`/`Sync` by design — each worker owns one (spec §4.5 "Workers
/// are pure function hosts ... no cross-worker state").
#[derive(Default)]
pub struct StringInterner {
    table: HashMap<Rc<str>, Rc<str>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Return a canonical `Rc<str>` for `s`; equal strings share storage.
    pub fn intern(&mut self, s: &str) -> Rc<str> {
        if let Some(existing) = self.table.get(s) {
            return existing.clone();
        }
        let rc: Rc<str> = Rc::from(s);
        self.table.insert(rc.clone(), rc.clone());
        rc
    }

    /// Intern `s` and hand back an owned `String` sharing no allocation with
    /// the canonical copy. Used at the extractor/model boundary: the
    /// canonical `Rc<str>` is not `Send`, so it cannot live inside an
    /// `IndexedSymbol`/`IndexedReference` that must cross the worker-pool
    /// channel, but every call for an already-seen spelling (a repeated
    /// `this`, a container name mentioned on every member, ...) still only
    /// hashes and clones an `Rc` instead of growing the table.
    pub fn intern_to_string(&mut self, s: &str) -> String {
        self.intern(s).to_string()
    }

    /// Number of unique strings currently interned.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

thread_local! {
    static THREAD_INTERNER: RefCell<StringInterner> = RefCell::new(StringInterner::new());
}

/// Run `f` against this worker thread's interner (spec §4.1: one table per
/// worker thread, living for the thread's lifetime, discarded only when the
/// thread exits — not recreated per file).
pub fn with_thread_local<R>(f: impl FnOnce(&mut StringInterner) -> R) -> R {
    THREAD_INTERNER.with(|cell| f(&mut cell.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_share_storage() {
        let mut interner = StringInterner::new();
        let a = interner.intern("loadData");
        let b = interner.intern("loadData");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn distinct_strings_are_distinct() {
        let mut interner = StringInterner::new();
        interner.intern("foo");
        interner.intern("bar");
        assert_eq!(interner.len(), 2);
    }
}
