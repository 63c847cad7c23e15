//! A bounded cache of compiled patterns, shared between threads.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use indexmap::IndexMap;
use log::trace;

use crate::budget::BudgetConfig;
use crate::compiler::Compiler;
use crate::error::CompileError;
use crate::flags::Flags;
use crate::machine::CompiledMatcher;

pub const DEFAULT_CAPACITY: usize = 1000;

type Compiled = Result<Arc<CompiledMatcher>, CompileError>;

/// Least recently used patterns are evicted first. Every pattern is compiled
/// at most once while it stays cached, even under concurrent lookups; failed
/// compilations are cached too. A pattern is never evicted while it is being
/// compiled, so the cache may briefly hold more than `capacity` entries.
#[derive(Debug)]
pub struct PatternCache {
    capacity: usize,
    budgets: BudgetConfig,
    // Most recently used last.
    entries: Mutex<IndexMap<(String, Flags), Arc<OnceLock<Compiled>>>>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_budgets(capacity, BudgetConfig::default())
    }

    pub fn with_budgets(capacity: usize, budgets: BudgetConfig) -> Self {
        Self {
            capacity,
            budgets,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get_or_compile(&self, pattern: &str, flags: Flags) -> Compiled {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let key = (pattern.to_string(), flags);
            let slot = entries.shift_remove(&key).unwrap_or_default();
            entries.insert(key, Arc::clone(&slot));
            // Entries still compiling are never evicted.
            while entries.len() > self.capacity {
                let Some(oldest) = entries.values().position(|slot| slot.get().is_some()) else {
                    break;
                };
                if let Some(((evicted, _), _)) = entries.shift_remove_index(oldest) {
                    trace!("evicted /{evicted}/ from pattern cache");
                }
            }
            slot
        };
        slot.get_or_init(|| {
            Compiler::new(self.budgets.clone())
                .compile(pattern, flags)
                .map(Arc::new)
        })
        .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn reuses_compiled_patterns() {
        let cache = PatternCache::new(10);
        let a = cache.get_or_compile("a+", Flags::empty()).unwrap();
        let b = cache.get_or_compile("a+", Flags::empty()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = cache.get_or_compile("a+", Flags::IGNORE_CASE).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);

        assert!(cache.get_or_compile("(", Flags::empty()).is_err());
        assert_eq!(cache.len(), 3);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = PatternCache::new(2);
        let a = cache.get_or_compile("a", Flags::empty()).unwrap();
        cache.get_or_compile("b", Flags::empty()).unwrap();
        // Touch "a" so that "b" is the oldest.
        cache.get_or_compile("a", Flags::empty()).unwrap();
        cache.get_or_compile("c", Flags::empty()).unwrap();
        assert_eq!(cache.len(), 2);

        let again = cache.get_or_compile("a", Flags::empty()).unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        let entries = cache.entries.lock().unwrap();
        assert!(!entries.contains_key(&("b".to_string(), Flags::empty())));
    }

    #[test]
    fn keeps_compilations_in_flight() {
        let cache = PatternCache::new(1);
        let key = |p: &str| (p.to_string(), Flags::empty());
        let pending = Arc::new(OnceLock::new());
        cache
            .entries
            .lock()
            .unwrap()
            .insert(key("x"), Arc::clone(&pending));

        cache.get_or_compile("a", Flags::empty()).unwrap();
        cache.get_or_compile("b", Flags::empty()).unwrap();
        {
            let entries = cache.entries.lock().unwrap();
            assert!(entries.contains_key(&key("x")));
            assert!(!entries.contains_key(&key("a")));
            assert_eq!(entries.len(), 2);
        }

        // Once "x" is done, lookups share its result and it can be evicted.
        let compiled = pending
            .get_or_init(|| Compiler::default().compile("x", Flags::empty()).map(Arc::new))
            .clone()
            .unwrap();
        let again = cache.get_or_compile("x", Flags::empty()).unwrap();
        assert!(Arc::ptr_eq(&compiled, &again));
        cache.get_or_compile("c", Flags::empty()).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn shared_between_threads() {
        let cache = Arc::new(PatternCache::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get_or_compile("(x|y)+z", Flags::empty()).unwrap())
            })
            .collect();
        let matchers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(matchers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }
}
