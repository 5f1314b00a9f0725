use anyhow::{ensure, Result};
use carbon_core::{Pool, PoolConfig};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LONG_TTL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carbon_scenarios=info,carbon_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PoolConfig::from_env();
    tracing::info!("🧪 Carbon scenarios");
    tracing::info!("   Default sweep interval: {:?}", config.sweep_interval);
    println!();

    let pool = Pool::with_config(config);

    // Run all scenarios
    scenario_basic_operations(&pool).await?;
    scenario_parallel_set_get(&pool).await?;
    scenario_namespace_isolation(&pool).await?;
    scenario_expiration(&pool).await?;
    scenario_stop(&pool).await?;

    println!();
    tracing::info!("✅ All scenarios passed!");

    Ok(())
}

/// SET/GET, duplicate create, empty and remove on a single namespace
async fn scenario_basic_operations(pool: &Pool) -> Result<()> {
    tracing::info!("Scenario: Basic Operations");

    let name = format!("basic-{}", uuid::Uuid::new_v4());
    let store = pool.create_db_with_defaults(&name)?;

    store.set("greeting", b"hello world", LONG_TTL);
    ensure!(
        store.get("greeting").as_deref() == Some(&b"hello world"[..]),
        "value should round-trip"
    );

    let duplicate = pool.create_db_with_defaults(&name);
    ensure!(
        matches!(duplicate, Err(ref err) if err.is_already_exists()),
        "duplicate create should fail"
    );

    pool.empty_db(&name)?;
    ensure!(store.get("greeting").is_none(), "empty_db should clear the store");

    pool.remove_db(&name).await?;
    ensure!(
        pool.find_db(&name).is_err_and(|err| err.is_not_found()),
        "removed store should not be found"
    );

    tracing::info!("   ✓ Basic operations work correctly");
    Ok(())
}

/// Parallel SET and GET on one namespace - verify no data mixing
async fn scenario_parallel_set_get(pool: &Pool) -> Result<()> {
    let num_operations = 5_000;
    tracing::info!("Scenario: Parallel SET/GET ({} tasks)", num_operations);

    let name = format!("parallel-{}", uuid::Uuid::new_v4());
    let store = pool.create_db(&name, Duration::from_millis(5))?;

    let test_data: Vec<(String, Vec<u8>)> = (0..num_operations)
        .map(|i| {
            let key = format!("key-{}", i);
            let value = format!("value-{}-{}", i, uuid::Uuid::new_v4()).into_bytes();
            (key, value)
        })
        .collect();

    let start = Instant::now();
    let set_tasks: Vec<_> = test_data
        .iter()
        .cloned()
        .map(|(key, value)| {
            let store = store.clone();
            tokio::spawn(async move { store.set(key, value, LONG_TTL) })
        })
        .collect();
    for result in join_all(set_tasks).await {
        result?;
    }
    let set_elapsed = start.elapsed();

    let errors = Arc::new(AtomicUsize::new(0));
    let get_start = Instant::now();
    let get_tasks: Vec<_> = test_data
        .iter()
        .cloned()
        .map(|(key, expected)| {
            let store = store.clone();
            let errors = Arc::clone(&errors);
            tokio::spawn(async move {
                match store.get(&key) {
                    Some(value) if value == expected => {}
                    Some(_) => {
                        tracing::error!("Value mismatch for key {}", key);
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                    None => {
                        tracing::error!("Key not found: {}", key);
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for result in join_all(get_tasks).await {
        result?;
    }
    let get_elapsed = get_start.elapsed();

    tracing::info!(
        "   SET {:?}, GET {:?} ({:.0} / {:.0} ops/sec)",
        set_elapsed,
        get_elapsed,
        num_operations as f64 / set_elapsed.as_secs_f64(),
        num_operations as f64 / get_elapsed.as_secs_f64()
    );

    let error_count = errors.load(Ordering::SeqCst);
    ensure!(error_count == 0, "{} values did not match", error_count);
    ensure!(store.size() == num_operations, "every key should be stored");

    pool.remove_db(&name).await?;
    tracing::info!("   ✓ All {} values verified correctly", num_operations);
    Ok(())
}

/// Many namespaces written concurrently under identical keys
async fn scenario_namespace_isolation(pool: &Pool) -> Result<()> {
    let num_namespaces = 50;
    let keys_per_namespace = 20;
    tracing::info!(
        "Scenario: Namespace Isolation ({} namespaces x {} keys)",
        num_namespaces,
        keys_per_namespace
    );

    let names: Vec<String> = (0..num_namespaces).map(|i| format!("tenant-{}", i)).collect();
    for name in &names {
        pool.create_db_with_defaults(name)?;
    }

    let writers: Vec<_> = names
        .iter()
        .map(|name| {
            let store = pool.find_db(name);
            let name = name.clone();
            async move {
                let store = store?;
                for i in 0..keys_per_namespace {
                    store.set(format!("key-{}", i), format!("{}:{}", name, i), LONG_TTL);
                    tokio::task::yield_now().await;
                }
                Ok::<_, anyhow::Error>(())
            }
        })
        .collect();
    join_all(writers)
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    for name in &names {
        let store = pool.find_db(name)?;
        for i in 0..keys_per_namespace {
            let expected = format!("{}:{}", name, i);
            ensure!(
                store.get(&format!("key-{}", i)).as_deref() == Some(expected.as_bytes()),
                "namespace {} leaked data",
                name
            );
        }
    }

    let stats = pool.stats();
    ensure!(stats.total_db == num_namespaces, "unexpected store count");
    ensure!(
        stats.total_size == num_namespaces * keys_per_namespace,
        "unexpected entry count"
    );

    for name in &names {
        pool.remove_db(name).await?;
    }

    tracing::info!("   ✓ No data leaked between namespaces");
    Ok(())
}

/// Entries disappear after their TTL and are reclaimed by the sweep
async fn scenario_expiration(pool: &Pool) -> Result<()> {
    tracing::info!("Scenario: Expiration");

    let sweep_interval = Duration::from_millis(100);
    let ttl = Duration::from_millis(50);
    let name = format!("expiring-{}", uuid::Uuid::new_v4());
    let store = pool.create_db(&name, sweep_interval)?;

    store.set("short", b"short-lived", ttl);
    store.set("long", b"long-lived", LONG_TTL);
    ensure!(store.get("short").is_some(), "short entry should be visible at first");

    tokio::time::sleep(ttl + sweep_interval + Duration::from_millis(100)).await;

    ensure!(store.get("short").is_none(), "short entry should have expired");
    ensure!(store.get("long").is_some(), "long entry should survive");
    ensure!(store.size() == 1, "sweep should have reclaimed the short entry");

    pool.remove_db(&name).await?;
    tracing::info!("   ✓ Expiration and sweep work correctly");
    Ok(())
}

/// Pool-wide stop tears every store down
async fn scenario_stop(pool: &Pool) -> Result<()> {
    tracing::info!("Scenario: Stop");

    let handles = (0..10)
        .map(|i| pool.create_db(&format!("stop-{}", i), Duration::from_millis(10)))
        .collect::<carbon_core::Result<Vec<_>>>()?;
    for store in &handles {
        store.set("key", b"value", LONG_TTL);
    }

    let start = Instant::now();
    pool.stop().await;
    tracing::info!("   Stopped {} stores in {:?}", handles.len(), start.elapsed());

    ensure!(pool.is_empty(), "pool should be empty after stop");
    ensure!(
        handles.iter().all(|store| !store.is_running() && store.is_empty()),
        "every store should be stopped and cleared"
    );

    tracing::info!("   ✓ Stop shuts down every store");
    Ok(())
}
