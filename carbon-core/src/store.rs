use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::effective_sweep_interval;
use crate::entry::Entry;

/// Internal shared state for the store
struct StoreInner {
    name: String,
    sweep_interval: Duration,
    data: DashMap<String, Entry>,
    /// Sender to signal shutdown to the sweep task
    shutdown_tx: watch::Sender<bool>,
    /// Set once by the Running -> Stopped transition
    stopped: AtomicBool,
    /// Flips to `true` once the sweep task has left its loop
    exited_rx: watch::Receiver<bool>,
}

/// One namespace: a thread-safe key-value table with per-entry TTL
///
/// Uses `DashMap` for the table, so reads on a key take a shared shard lock
/// and writes take an exclusive one. Operations on the same key are
/// linearized; nothing is promised across keys.
///
/// Each store owns a background sweep task that deletes expired entries every
/// `sweep_interval`. The task runs until the owning [`Pool`](crate::Pool)
/// removes or stops the store, or until the last handle to it is dropped.
///
/// Expiry is also checked on read: [`Store::get`] never returns an entry
/// whose TTL has elapsed, even if the sweep has not removed it yet.
/// [`Store::size`] counts such entries until they are swept.
///
/// Stores are created through [`Pool::create_db`](crate::Pool::create_db).
/// Cloning a `Store` yields another handle to the same namespace.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Creates a running store and spawns its sweep task on `runtime`.
    pub(crate) fn spawn(name: impl Into<String>, sweep_interval: Duration, runtime: &Handle) -> Self {
        let sweep_interval = effective_sweep_interval(sweep_interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (exited_tx, exited_rx) = watch::channel(false);

        let inner = Arc::new(StoreInner {
            name: name.into(),
            sweep_interval,
            data: DashMap::new(),
            shutdown_tx,
            stopped: AtomicBool::new(false),
            exited_rx,
        });

        // The task only holds a weak reference so dropping every handle
        // still tears the store down.
        runtime.spawn(Self::sweep_task(
            Arc::downgrade(&inner),
            sweep_interval,
            shutdown_rx,
            exited_tx,
        ));

        Self { inner }
    }

    /// Background task that periodically sweeps expired entries
    async fn sweep_task(
        inner: Weak<StoreInner>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
        exited_tx: watch::Sender<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick - we want to wait for the interval first
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    // Err means the sender is gone, i.e. the store was dropped
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    if inner.stopped.load(Ordering::Acquire) {
                        break;
                    }
                    let removed = Self::sweep_internal(&inner);
                    if removed > 0 {
                        tracing::trace!(store = %inner.name, removed, "swept expired entries");
                    }
                }
            }
        }

        // Release the timer before reporting the exit
        drop(ticker);
        exited_tx.send_replace(true);
    }

    /// Internal sweep logic (shared between manual and background sweeps)
    fn sweep_internal(inner: &StoreInner) -> usize {
        let now = Instant::now();
        let mut removed_count = 0;

        inner.data.retain(|_, entry| {
            if entry.is_expired_at(now) {
                removed_count += 1;
                false
            } else {
                true
            }
        });

        removed_count
    }

    /// Returns the name this store is registered under
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the fixed period between background sweeps
    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Returns `true` until the pool has removed or stopped this store
    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stores `data` under `key`, living for `ttl` from now
    ///
    /// If the key already exists, the entry is replaced; the new entry's
    /// insertion time and TTL alone govern its expiry. A zero TTL stores an
    /// entry that is already expired: it is invisible to [`Store::get`] and is
    /// removed by the next sweep. A TTL too large for the clock never expires.
    ///
    /// The expiry boundary is inclusive: the entry counts as expired from the
    /// instant `inserted_at + ttl` is reached, not only once it is passed.
    ///
    /// The bytes are copied verbatim. Writes to a stopped store are discarded.
    pub fn set(&self, key: impl Into<String>, data: impl AsRef<[u8]>, ttl: Duration) {
        if !self.is_running() {
            return;
        }
        let key = key.into();
        let entry = Entry::new(Arc::from(data.as_ref()), Instant::now(), ttl);
        self.inner.data.insert(key.clone(), entry);

        // A shutdown that cleared the table between the check and the
        // insert would otherwise leave this entry behind, never swept.
        if !self.is_running() {
            self.inner.data.remove(&key);
        }
    }

    /// Retrieves a copy of the bytes stored under `key`
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.get_shared(key).map(|data| data.to_vec())
    }

    /// Like [`Store::get`], but returns the shared buffer without copying it
    pub fn get_shared(&self, key: &str) -> Option<Arc<[u8]>> {
        let entry = self.inner.data.get(key)?;
        if entry.value().is_expired() {
            return None;
        }
        Some(entry.value().data_shared())
    }

    /// Checks if a key exists and is not expired
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner
            .data
            .get(key)
            .is_some_and(|entry| !entry.value().is_expired())
    }

    /// Deletes a key from the store
    ///
    /// Returns `true` if the key existed (regardless of expiration), `false` otherwise.
    #[must_use = "returns whether the key existed"]
    pub fn delete(&self, key: &str) -> bool {
        self.inner.data.remove(key).is_some()
    }

    /// Returns all keys that are not expired, in no particular order
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.inner
            .data
            .iter()
            .filter(|entry| !entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Removes every entry, keeping the store and its sweep task alive
    pub fn reset(&self) {
        self.inner.data.clear();
    }

    /// Returns the number of entries in the store (including expired ones
    /// that have not been swept yet)
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.data.len()
    }

    /// Returns `true` if the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }

    /// Runs one expiration pass right now
    ///
    /// Returns the number of entries removed. The background task performs
    /// the same pass every `sweep_interval`.
    pub fn sweep(&self) -> usize {
        Self::sweep_internal(&self.inner)
    }

    /// Stops the store: signals the sweep task to exit and clears the table
    ///
    /// Only delivers the signal, it does not wait for the task. Returns `true`
    /// if this call performed the transition and `false` if the store was
    /// already stopped; repeated calls are harmless.
    pub(crate) fn shutdown(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.data.clear();
        true
    }

    /// Stops the store and waits for its sweep task to exit
    #[cfg(test)]
    pub(crate) async fn shutdown_and_wait(&self) {
        self.shutdown();
        self.wait_stopped().await;
    }

    /// Waits for the sweep task to exit after [`Store::shutdown`]
    ///
    /// Any number of callers may wait; each one resolves only after the task
    /// has left its loop.
    pub(crate) async fn wait_stopped(&self) {
        let mut exited_rx = self.inner.exited_rx.clone();
        if exited_rx.wait_for(|exited| *exited).await.is_err() {
            // The task was dropped without finishing: it panicked or its
            // runtime shut down
            tracing::warn!(store = %self.inner.name, "sweep task ended abnormally");
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("sweep_interval", &self.inner.sweep_interval)
            .field("running", &self.is_running())
            .field("size", &self.size())
            .finish()
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        // Signal the sweep task to stop when the last handle is dropped
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Helper to create a store within a tokio runtime for tests
    fn create_test_store() -> Store {
        create_test_store_with_interval(Duration::from_secs(60))
    }

    fn create_test_store_with_interval(interval: Duration) -> Store {
        // Create a runtime for the background task
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        // Keep the runtime alive by leaking it (fine for tests)
        let rt = Box::leak(Box::new(rt));

        Store::spawn("test", interval, rt.handle())
    }

    fn spawn_here(name: &str, interval: Duration) -> Store {
        Store::spawn(name, interval, &Handle::current())
    }

    /// Stores an entry that has already expired without relying on a zero TTL
    fn set_expired(store: &Store, key: &str, data: &[u8]) {
        let entry = Entry::new(
            Arc::from(data),
            Instant::now() - Duration::from_secs(2),
            Duration::from_secs(1),
        );
        store.inner.data.insert(key.to_string(), entry);
    }

    #[test]
    fn test_set_and_get() {
        let store = create_test_store();
        store.set("key1", b"value1", Duration::from_secs(60));

        assert_eq!(store.get("key1"), Some(b"value1".to_vec()));
    }

    #[test]
    fn test_get_nonexistent_key() {
        let store = create_test_store();
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_binary_data_round_trips_verbatim() {
        let store = create_test_store();
        let data = [0u8, 255, 10, 13, 0, 7];
        store.set("bin", data, Duration::from_secs(60));

        assert_eq!(store.get("bin").as_deref(), Some(&data[..]));
    }

    #[test]
    fn test_overwrite_key() {
        let store = create_test_store();
        store.set("key1", b"value1", Duration::from_secs(60));
        store.set("key1", b"value2", Duration::from_secs(60));

        assert_eq!(store.get("key1"), Some(b"value2".to_vec()));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_overwrite_uses_latest_ttl() {
        let store = create_test_store();
        store.set("key1", b"long", Duration::from_secs(3600));
        store.set("key1", b"short", Duration::ZERO);

        // The second write's TTL governs expiry
        assert_eq!(store.get("key1"), None);
        assert_eq!(store.sweep(), 1);

        store.set("key2", b"short", Duration::ZERO);
        store.set("key2", b"long", Duration::from_secs(3600));
        assert_eq!(store.sweep(), 0);
        assert_eq!(store.get("key2"), Some(b"long".to_vec()));
    }

    #[test]
    fn test_zero_ttl_is_expired_but_counted_until_swept() {
        let store = create_test_store();
        store.set("key1", b"value1", Duration::ZERO);

        assert_eq!(store.get("key1"), None);
        assert!(!store.contains_key("key1"));
        assert_eq!(store.size(), 1);

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_extreme_ttl_does_not_panic() {
        let store = create_test_store();
        store.set("key1", b"value1", Duration::MAX);

        assert_eq!(store.get("key1"), Some(b"value1".to_vec()));
        assert_eq!(store.sweep(), 0);
    }

    #[test]
    fn test_delete() {
        let store = create_test_store();
        store.set("key1", b"value1", Duration::from_secs(60));

        assert!(store.delete("key1"));
        assert_eq!(store.get("key1"), None);
        assert!(!store.delete("key1"));
    }

    #[test]
    fn test_reset() {
        let store = create_test_store();
        for i in 0..10 {
            store.set(format!("key{}", i), b"value", Duration::from_secs(60));
        }
        assert_eq!(store.size(), 10);

        store.reset();

        assert_eq!(store.size(), 0);
        for i in 0..10 {
            assert_eq!(store.get(&format!("key{}", i)), None);
        }
        // The store is still usable afterwards
        assert!(store.is_running());
        store.set("after", b"reset", Duration::from_secs(60));
        assert_eq!(store.get("after"), Some(b"reset".to_vec()));
    }

    #[test]
    fn test_reset_empty_store() {
        let store = create_test_store();
        store.reset();
        store.reset();
        assert!(store.is_empty());
        assert!(store.is_running());
    }

    #[test]
    fn test_sweep() {
        let store = create_test_store_with_interval(Duration::from_secs(3600));

        set_expired(&store, "expired1", b"value1");
        set_expired(&store, "expired2", b"value2");
        store.set("valid", b"value3", Duration::from_secs(60));

        let removed = store.sweep();
        assert_eq!(removed, 2);
        assert_eq!(store.size(), 1);
        assert_eq!(store.get("valid"), Some(b"value3".to_vec()));
    }

    #[test]
    fn test_contains_key() {
        let store = create_test_store();
        store.set("key1", b"value1", Duration::from_secs(60));
        set_expired(&store, "expired", b"value2");

        assert!(store.contains_key("key1"));
        assert!(!store.contains_key("expired"));
        assert!(!store.contains_key("nonexistent"));
    }

    #[test]
    fn test_keys() {
        let store = create_test_store();
        store.set("key1", b"value1", Duration::from_secs(60));
        store.set("key2", b"value2", Duration::from_secs(60));
        set_expired(&store, "expired", b"value3");

        let mut keys = store.keys();
        keys.sort();

        assert_eq!(keys, vec!["key1", "key2"]);
    }

    #[test]
    fn test_size_and_is_empty() {
        let store = create_test_store();

        assert!(store.is_empty());
        assert_eq!(store.size(), 0);

        store.set("key1", b"value1", Duration::from_secs(60));

        assert!(!store.is_empty());
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let store = create_test_store_with_interval(Duration::ZERO);
        assert_eq!(store.sweep_interval(), crate::config::MIN_SWEEP_INTERVAL);
    }

    #[test]
    fn test_concurrent_writes() {
        let store = Arc::new(create_test_store());
        let mut handles = vec![];

        // Spawn 10 threads, each writing 100 keys
        for thread_id in 0..10 {
            let store = Arc::clone(&store);
            let handle = thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("thread{}:key{}", thread_id, i);
                    store.set(key, format!("value{}", i), Duration::from_secs(60));
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(store.size(), 1000);
    }

    #[test]
    fn test_concurrent_set_get_during_sweeps() {
        use std::sync::atomic::AtomicUsize;

        // Sweep every millisecond so passes interleave with the writers
        let store = Arc::new(create_test_store_with_interval(Duration::from_millis(1)));
        let mismatches = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for thread_id in 0..8 {
            let store = Arc::clone(&store);
            let mismatches = Arc::clone(&mismatches);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("t{}:k{}", thread_id, i);
                    let value = format!("v{}:{}", thread_id, i);
                    store.set(key.clone(), &value, Duration::from_secs(60));
                    // Short-lived noise for the sweep to collect
                    store.set(format!("{}:tmp", key), b"x", Duration::ZERO);
                    if store.get(&key).as_deref() != Some(value.as_bytes()) {
                        mismatches.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(mismatches.load(Ordering::SeqCst), 0);

        // Only the long-lived keys survive once the sweep has caught up
        store.sweep();
        assert_eq!(store.size(), 8 * 200);
    }

    #[tokio::test]
    async fn test_background_sweep_runs() {
        let store = spawn_here("bg", Duration::from_millis(50));

        set_expired(&store, "expire1", b"value1");
        set_expired(&store, "expire2", b"value2");
        store.set("keep", b"value3", Duration::from_secs(60));

        // Initially all 3 entries exist (even if expired)
        assert_eq!(store.size(), 3);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store.size(), 1);
        assert_eq!(store.get("keep"), Some(b"value3".to_vec()));
    }

    #[tokio::test]
    async fn test_short_ttl_expires_within_ttl_plus_interval() {
        let store = spawn_here("ttl", Duration::from_millis(50));
        store.set("k", b"v", Duration::from_millis(20));

        assert_eq!(store.get("k"), Some(b"v".to_vec()));

        tokio::time::sleep(Duration::from_millis(20 + 50 + 80)).await;

        assert_eq!(store.get("k"), None);
        assert_eq!(store.size(), 0);
    }

    #[tokio::test]
    async fn test_store_clone_shares_data() {
        let store1 = spawn_here("shared", Duration::from_secs(60));
        let store2 = store1.clone();

        store1.set("key1", b"value1", Duration::from_secs(60));
        assert_eq!(store2.get("key1"), Some(b"value1".to_vec()));

        store2.set("key2", b"value2", Duration::from_secs(60));
        assert_eq!(store1.get("key2"), Some(b"value2".to_vec()));
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweep_task() {
        let store = spawn_here("stop", Duration::from_millis(10));
        store.set("key1", b"value1", Duration::from_secs(60));

        assert!(store.shutdown());
        assert!(!store.is_running());
        // Stale handles observe an empty store
        assert_eq!(store.size(), 0);

        tokio::time::timeout(Duration::from_secs(1), store.wait_stopped())
            .await
            .expect("sweep task did not exit");
        assert!(*store.inner.exited_rx.borrow());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_waiter_sees_the_task_exit() {
        let store = spawn_here("waiters", Duration::from_millis(1));
        store.set("key", b"value", Duration::from_secs(60));

        // A waiter that gives up early must not rob later waiters
        let _ = tokio::time::timeout(Duration::ZERO, store.wait_stopped()).await;

        store.shutdown();
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.wait_stopped().await;
                    *store.inner.exited_rx.borrow()
                })
            })
            .collect();

        for waiter in futures::future::join_all(waiters).await {
            assert!(waiter.expect("waiter panicked"));
        }
    }

    #[tokio::test]
    async fn test_no_background_mutation_after_shutdown() {
        let store = spawn_here("quiet", Duration::from_millis(10));
        store.shutdown_and_wait().await;

        // Plant an expired entry directly; no sweep may remove it any more
        set_expired(&store, "ghost", b"boo");
        assert_eq!(store.size(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.size(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let store = spawn_here("twice", Duration::from_millis(10));

        assert!(store.shutdown());
        assert!(!store.shutdown());

        store.shutdown_and_wait().await;
        store.shutdown_and_wait().await;
        assert!(!store.is_running());
    }

    #[tokio::test]
    async fn test_set_after_shutdown_is_discarded() {
        let store = spawn_here("closed", Duration::from_secs(60));
        store.shutdown();

        store.set("late", b"write", Duration::from_secs(60));
        assert_eq!(store.get("late"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_writes_racing_shutdown_leave_nothing_behind() {
        let store = Arc::new(create_test_store());
        let mut handles = vec![];

        for thread_id in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let mut i = 0;
                // Keep writing a while past the shutdown
                let mut after_stop = 0;
                while after_stop < 100 {
                    store.set(format!("t{}:k{}", thread_id, i), b"v", Duration::from_secs(60));
                    i += 1;
                    if !store.is_running() {
                        after_stop += 1;
                    }
                }
            }));
        }

        thread::sleep(Duration::from_millis(5));
        store.shutdown();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert!(!store.is_running());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_task_does_not_keep_store_alive() {
        // Long interval so the task never holds a strong reference mid-sweep
        let store = spawn_here("dropped", Duration::from_secs(60));
        let mut exited_rx = store.inner.exited_rx.clone();
        let weak = Arc::downgrade(&store.inner);

        drop(store);
        assert!(weak.upgrade().is_none());

        tokio::time::timeout(Duration::from_secs(1), exited_rx.wait_for(|exited| *exited))
            .await
            .expect("sweep task did not exit after drop")
            .expect("sweep task ended abnormally");
    }

    #[tokio::test]
    async fn test_multiple_stores_independent_sweep() {
        let store1 = spawn_here("fast", Duration::from_millis(50));
        let store2 = spawn_here("slow", Duration::from_secs(60));

        set_expired(&store1, "expire", b"value");
        set_expired(&store2, "expire", b"value");
        store2.set("keep", b"value", Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store1.size(), 0);
        // store2 has not swept yet
        assert_eq!(store2.size(), 2);
        assert_eq!(store2.get("keep"), Some(b"value".to_vec()));
    }
}
