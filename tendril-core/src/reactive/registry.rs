//! Identity Registry
//!
//! Hot reloading re-runs module-level setup code. Anything that should
//! survive a reload (a store, a shared signal) is fetched from a registry by
//! a stable string key instead of being created afresh, so the reloaded code
//! gets the live instance back.
//!
//! Two flavours exist:
//!
//! - [`Registry`] holds `Send + Sync` values. [`Registry::global`] is the
//!   one process-wide instance; independent instances can be created for
//!   tests or embedding.
//! - [`LocalRegistry`] holds values for the calling thread only, which is
//!   what reactive handles (`!Send`) need.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::debug;

use crate::error::ReactiveError;

type Entry = Arc<dyn Any + Send + Sync>;

static GLOBAL: OnceLock<Registry> = OnceLock::new();

thread_local! {
    static LOCAL: RefCell<HashMap<String, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Get-or-create store of shared instances, keyed by string.
#[derive(Default)]
pub struct Registry {
    entries: DashMap<String, Entry>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    /// Return the instance stored under `key`, creating it with `init` on
    /// first use.
    ///
    /// `init` runs while the key's shard is locked, so it must not use this
    /// registry.
    pub fn get_or_insert_with<T>(&self, key: &str, init: impl FnOnce() -> T) -> Result<Arc<T>, ReactiveError>
    where
        T: Send + Sync + 'static,
    {
        let entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| {
                debug!(key, "registry entry created");
                Arc::new(init()) as Entry
            })
            .value()
            .clone();

        entry.downcast::<T>().map_err(|_| mismatch(key))
    }

    /// Look up `key` without creating it.
    pub fn get<T>(&self, key: &str) -> Result<Option<Arc<T>>, ReactiveError>
    where
        T: Send + Sync + 'static,
    {
        let Some(entry) = self.entries.get(key).map(|entry| Arc::clone(entry.value())) else {
            return Ok(None);
        };
        entry.downcast::<T>().map(Some).map_err(|_| mismatch(key))
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn insert<T>(&self, key: &str, value: T) -> Arc<T>
    where
        T: Send + Sync + 'static,
    {
        let value = Arc::new(value);
        if self.entries.insert(key.to_owned(), value.clone()).is_some() {
            debug!(key, "registry entry replaced");
        }
        value
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Registry for the calling thread, for values that cannot cross threads.
pub struct LocalRegistry;

impl LocalRegistry {
    /// Return a clone of the value stored under `key`, creating it with
    /// `init` on first use.
    ///
    /// Reactive handles are cheap `Rc` clones, so a signal fetched twice is
    /// the same signal.
    pub fn get_or_insert_with<T>(key: &str, init: impl FnOnce() -> T) -> Result<T, ReactiveError>
    where
        T: Clone + 'static,
    {
        if let Some(existing) = LOCAL.with(|local| local.borrow().get(key).cloned()) {
            return existing
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| mismatch(key));
        }

        // `init` may itself use the registry, so no borrow is held here.
        let value = init();
        LOCAL.with(|local| {
            local
                .borrow_mut()
                .insert(key.to_owned(), Rc::new(value.clone()))
        });
        debug!(key, "local registry entry created");
        Ok(value)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(key: &str) -> bool {
        LOCAL.with(|local| local.borrow_mut().remove(key).is_some())
    }

    /// Whether `key` is present.
    pub fn contains_key(key: &str) -> bool {
        LOCAL.with(|local| local.borrow().contains_key(key))
    }

    /// Remove every entry on this thread.
    pub fn clear() {
        // Values may run arbitrary drops; release the borrow first.
        let entries = LOCAL.with(|local| std::mem::take(&mut *local.borrow_mut()));
        drop(entries);
    }
}

fn mismatch(key: &str) -> ReactiveError {
    ReactiveError::RegistryTypeMismatch {
        key: key.to_owned(),
    }
}
