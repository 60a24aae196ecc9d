//! Module locator - finds modules in the cache by predicate
//!
//! Three flavours:
//! - synchronous scans ([`find`], [`find_all`], [`find_or_err`])
//! - [`LazyModule`], which rescans until found and then caches the hit
//! - [`Waiters`], deferred lookups resolved when a matching module loads
//!
//! None of them block: a lookup that cannot be answered yet is either
//! `None` or parked until the module arrives.

use crate::guard;
use crate::modules::{Filter, ModuleCache, ModuleId, ModuleRecord};
use std::cell::OnceCell;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("no loaded module matches {filter}")]
    ModuleNotFound { filter: String },
}

/// First module (in load order) matching `filter`.
pub fn find<'a>(cache: &'a ModuleCache, filter: &Filter) -> Option<&'a ModuleRecord> {
    cache.iter().find(|m| filter.matches(m))
}

pub fn find_or_err<'a>(
    cache: &'a ModuleCache,
    filter: &Filter,
) -> Result<&'a ModuleRecord, LocatorError> {
    find(cache, filter).ok_or_else(|| LocatorError::ModuleNotFound {
        filter: filter.to_string(),
    })
}

/// Every module matching `filter`, in load order.
pub fn find_all<'a>(cache: &'a ModuleCache, filter: &Filter) -> Vec<&'a ModuleRecord> {
    cache.iter().filter(|m| filter.matches(m)).collect()
}

/// Lookup that is resolved on first successful access and cached for the
/// process lifetime.
#[derive(Debug)]
pub struct LazyModule {
    filter: Filter,
    resolved: OnceCell<ModuleId>,
}

impl LazyModule {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            resolved: OnceCell::new(),
        }
    }

    /// Resolve against `cache`. Until a module matches, every call rescans.
    pub fn get<'a>(&self, cache: &'a ModuleCache) -> Option<&'a ModuleRecord> {
        if let Some(id) = self.resolved.get() {
            return cache.get(id);
        }
        let module = find(cache, &self.filter)?;
        let _ = self.resolved.set(module.id.clone());
        Some(module)
    }

    pub fn resolved_id(&self) -> Option<&ModuleId> {
        self.resolved.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

type WaitCallback = Box<dyn FnOnce(&ModuleRecord)>;

/// Handle to a parked [`Waiters::wait_for`] callback, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "waiter#{}", self.0)
    }
}

struct Waiter {
    id: WaiterId,
    filter: Filter,
    callback: WaitCallback,
}

/// Deferred lookups waiting for a matching module to load.
#[derive(Default)]
pub struct Waiters {
    next_id: u64,
    pending: Vec<Waiter>,
}

impl Waiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` with the first module matching `filter`.
    ///
    /// Runs immediately when a match is already loaded and returns `None`.
    /// Otherwise the callback is parked until the first matching module is
    /// announced through [`Waiters::notify`], and the returned id can cancel
    /// it before then. Each callback runs at most once.
    pub fn wait_for<F>(&mut self, cache: &ModuleCache, filter: Filter, callback: F) -> Option<WaiterId>
    where
        F: FnOnce(&ModuleRecord) + 'static,
    {
        if let Some(module) = find(cache, &filter) {
            run_callback(Box::new(callback), &filter, module);
            return None;
        }
        self.next_id += 1;
        let id = WaiterId(self.next_id);
        self.pending.push(Waiter {
            id,
            filter,
            callback: Box::new(callback),
        });
        Some(id)
    }

    /// Drop a parked callback. Returns `false` if it already ran or was
    /// cancelled.
    pub fn cancel(&mut self, id: WaiterId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|w| w.id != id);
        self.pending.len() != before
    }

    /// Resolve every waiter matching a newly loaded module. Returns how many ran.
    pub fn notify(&mut self, module: &ModuleRecord) -> usize {
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|w| w.filter.matches(module));
        self.pending = pending;

        let count = ready.len();
        for waiter in ready {
            tracing::debug!(module = %module.id, waiter = %waiter.id, filter = %waiter.filter, "waiter resolved");
            run_callback(waiter.callback, &waiter.filter, module);
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Descriptions of filters still waiting, for diagnostics.
    pub fn pending_filters(&self) -> Vec<String> {
        self.pending.iter().map(|w| w.filter.to_string()).collect()
    }
}

/// A panicking callback is logged; the module load carries on.
fn run_callback(callback: WaitCallback, filter: &Filter, module: &ModuleRecord) {
    if let Err(panic) = guard::catch(|| callback(module)) {
        tracing::error!(module = %module.id, %filter, "wait_for callback panicked: {panic}");
    }
}

impl fmt::Debug for Waiters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiters")
            .field("pending", &self.pending_filters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{by_code, by_props};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn cache_with(modules: Vec<ModuleRecord>) -> ModuleCache {
        let mut cache = ModuleCache::new();
        for m in modules {
            cache.insert(m);
        }
        cache
    }

    #[test]
    fn test_find_first_match() {
        let cache = cache_with(vec![
            ModuleRecord::new(1u64, "alpha"),
            ModuleRecord::new(2u64, "beta 1"),
            ModuleRecord::new(3u64, "beta 2"),
        ]);
        let found = find(&cache, &by_code(&["beta"])).unwrap();
        assert_eq!(found.id, ModuleId::Numeric(2));
        assert_eq!(find_all(&cache, &by_code(&["beta"])).len(), 2);
        assert!(find(&cache, &by_code(&["gamma"])).is_none());
    }

    #[test]
    fn test_find_or_err() {
        let cache = ModuleCache::new();
        let err = find_or_err(&cache, &by_props(&["getUser"])).unwrap_err();
        assert_eq!(
            err,
            LocatorError::ModuleNotFound {
                filter: "byProps(getUser)".to_string()
            }
        );
    }

    #[test]
    fn test_lazy_rescans_then_caches() {
        let lazy = LazyModule::new(by_props(&["getUser"]));
        let mut cache = ModuleCache::new();
        assert!(lazy.get(&cache).is_none());
        assert!(!lazy.is_resolved());

        cache.insert(ModuleRecord::new(10u64, "").with_exports(json!({"getUser": 0})));
        assert_eq!(lazy.get(&cache).unwrap().id, ModuleId::Numeric(10));
        assert_eq!(lazy.resolved_id(), Some(&ModuleId::Numeric(10)));

        // A second match loaded later does not change the cached answer
        cache.insert(ModuleRecord::new(11u64, "").with_exports(json!({"getUser": 1})));
        assert_eq!(lazy.get(&cache).unwrap().id, ModuleId::Numeric(10));
    }

    #[test]
    fn test_wait_for_immediate() {
        let cache = cache_with(vec![ModuleRecord::new(1u64, "ready")]);
        let mut waiters = Waiters::new();
        let hit = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&hit);
        let id = waiters.wait_for(&cache, by_code(&["ready"]), move |m| {
            *sink.borrow_mut() = Some(m.id.clone());
        });
        assert_eq!(id, None);
        assert_eq!(*hit.borrow(), Some(ModuleId::Numeric(1)));
        assert_eq!(waiters.pending(), 0);
    }

    #[test]
    fn test_wait_for_deferred_runs_once() {
        let cache = ModuleCache::new();
        let mut waiters = Waiters::new();
        let calls = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&calls);
        waiters.wait_for(&cache, by_code(&["later"]), move |_| {
            *sink.borrow_mut() += 1;
        });
        assert_eq!(waiters.pending(), 1);

        assert_eq!(waiters.notify(&ModuleRecord::new(1u64, "unrelated")), 0);
        assert_eq!(waiters.notify(&ModuleRecord::new(2u64, "later")), 1);
        assert_eq!(waiters.notify(&ModuleRecord::new(3u64, "later")), 0);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_cancelled_waiter_never_runs() {
        let cache = ModuleCache::new();
        let mut waiters = Waiters::new();
        let calls = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&calls);
        let id = waiters
            .wait_for(&cache, by_code(&["later"]), move |_| *sink.borrow_mut() += 1)
            .unwrap();

        assert!(waiters.cancel(id));
        assert!(!waiters.cancel(id));
        assert_eq!(waiters.notify(&ModuleRecord::new(1u64, "later")), 0);
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn test_panicking_waiter_does_not_stop_others() {
        let cache = ModuleCache::new();
        let mut waiters = Waiters::new();
        let calls = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&calls);
        waiters.wait_for(&cache, by_code(&["later"]), |_| panic!("callback boom"));
        waiters.wait_for(&cache, by_code(&["later"]), move |_| *sink.borrow_mut() += 1);

        assert_eq!(waiters.notify(&ModuleRecord::new(1u64, "later")), 2);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(waiters.pending(), 0);
    }
}
