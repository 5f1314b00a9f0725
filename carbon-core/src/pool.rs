use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::stats::PoolStats;
use crate::store::Store;

/// Registry of named, isolated [`Store`]s
///
/// A single mutex guards the name -> store map. It is held only for map
/// lookups and mutations and never while waiting for a sweep task to exit.
/// A store is always stopped before its name leaves the registry, so a name
/// that can be found always refers to a running store.
///
/// Sweep tasks are spawned on the runtime the pool was built in, so
/// [`Pool::create_db`] may be called from any thread.
///
/// # Example
///
/// ```rust,no_run
/// use carbon_core::Pool;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let pool = Pool::new();
///
///     let sessions = pool.create_db("sessions", Duration::from_secs(30)).unwrap();
///     sessions.set("user:123", b"token", Duration::from_secs(300));
///
///     let found = pool.find_db("sessions").unwrap();
///     assert_eq!(found.get("user:123"), Some(b"token".to_vec()));
///
///     pool.remove_db("sessions").await.unwrap();
///     pool.stop().await;
/// }
/// ```
pub struct Pool {
    registry: Mutex<HashMap<String, Store>>,
    config: PoolConfig,
    runtime: Handle,
}

impl Pool {
    /// Creates a new pool with default configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context. The pool requires
    /// a runtime to spawn the stores' sweep tasks.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a new pool with custom configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context. Use
    /// [`Pool::with_runtime`] to build a pool from a plain thread.
    pub fn with_config(config: PoolConfig) -> Self {
        let Ok(runtime) = Handle::try_current() else {
            panic!(
                "carbon_core::Pool requires a Tokio runtime. \
                 Ensure you are calling Pool::new() or Pool::with_config() \
                 from within a #[tokio::main] or #[tokio::test] context, \
                 or use Pool::with_runtime() with an explicit handle."
            );
        };
        Self::with_runtime(config, runtime)
    }

    /// Creates a new pool whose sweep tasks run on `runtime`
    ///
    /// The runtime must have its time driver enabled (`enable_time` or
    /// `enable_all` on the builder). Without it the sweep tasks cannot start
    /// their interval and every store created by this pool stops sweeping.
    pub fn with_runtime(config: PoolConfig, runtime: Handle) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            config,
            runtime,
        }
    }

    /// Returns the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Creates and registers a running store named `name`
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AlreadyExists`] if the name is taken; the existing
    /// store is left untouched.
    pub fn create_db(&self, name: &str, sweep_interval: Duration) -> Result<Store> {
        let mut registry = self.registry.lock();
        if registry.contains_key(name) {
            return Err(PoolError::already_exists(name));
        }

        let store = Store::spawn(name, sweep_interval, &self.runtime);
        registry.insert(name.to_string(), store.clone());
        drop(registry);

        tracing::debug!(store = %name, interval = ?store.sweep_interval(), "created store");
        Ok(store)
    }

    /// Same as [`Pool::create_db`], using the configured sweep interval
    pub fn create_db_with_defaults(&self, name: &str) -> Result<Store> {
        self.create_db(name, self.config.sweep_interval)
    }

    /// Looks up the store registered as `name`
    pub fn find_db(&self, name: &str) -> Result<Store> {
        self.registry
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::not_found(name))
    }

    /// Removes every entry from the store registered as `name`
    ///
    /// The store stays registered and keeps sweeping.
    pub fn empty_db(&self, name: &str) -> Result<()> {
        let store = self.find_db(name)?;
        store.reset();
        tracing::debug!(store = %name, "emptied store");
        Ok(())
    }

    /// Stops the store registered as `name` and removes it from the pool
    ///
    /// The store is stopped before its name is released. The sweep task is
    /// joined after the registry lock has been dropped, so a slow shutdown
    /// does not hold up other namespaces.
    pub async fn remove_db(&self, name: &str) -> Result<()> {
        let store = {
            let mut registry = self.registry.lock();
            let store = registry
                .get(name)
                .cloned()
                .ok_or_else(|| PoolError::not_found(name))?;
            store.shutdown();
            registry.remove(name);
            store
        };

        store.wait_stopped().await;
        tracing::debug!(store = %name, "removed store");
        Ok(())
    }

    /// Stops and removes every store, then waits for all sweep tasks to exit
    ///
    /// The pool remains usable afterwards; new stores may be created.
    pub async fn stop(&self) {
        let stores: Vec<Store> = {
            let mut registry = self.registry.lock();
            for store in registry.values() {
                store.shutdown();
            }
            registry.drain().map(|(_, store)| store).collect()
        };

        let count = stores.len();
        join_all(stores.iter().map(|store| store.wait_stopped())).await;
        tracing::debug!(stores = count, "stopped pool");
    }

    /// Returns a size summary of all registered stores
    pub fn stats(&self) -> PoolStats {
        let snapshot: Vec<Store> = self.registry.lock().values().cloned().collect();
        PoolStats::collect(&snapshot)
    }

    /// Returns the number of registered stores
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Returns `true` if no stores are registered
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// Returns `true` if a store named `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.registry.lock().contains_key(name)
    }

    /// Returns the names of all registered stores, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Signal every sweep task; nothing can be awaited here
        for store in self.registry.get_mut().values() {
            store.shutdown();
        }
    }
}
