//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache facade against a simple model, and its
//! behavior while the store is failing.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio_test::block_on;

use crate::cache::{CacheStore, Lookup};
use crate::connection::ConnectionPool;
use crate::error::StoreError;
use crate::store::MemoryConnector;

type PooledStore = CacheStore<ConnectionPool<MemoryConnector>>;

// == Test Configuration ==
const TEST_POOL_SIZE: usize = 4;

fn new_store() -> (Arc<MemoryConnector>, PooledStore) {
    let connector = Arc::new(MemoryConnector::new());
    let pool = ConnectionPool::with_connector(Arc::clone(&connector), TEST_POOL_SIZE);
    (connector, CacheStore::new(pool))
}

// == Strategies ==
/// Generates valid cache keys
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}"
}

fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,128}"
}

fn prefix_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

/// Failures the cache absorbs instead of returning
fn transient_error_strategy() -> impl Strategy<Value = StoreError> {
    prop_oneof![
        Just(StoreError::Connection("socket closed".to_string())),
        Just(StoreError::Timeout("1000ms".to_string())),
        Just(StoreError::Server("LOADING".to_string())),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Add { key: String, value: String },
    Get { key: String },
    Remove { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    // Small key space so operations collide
    let key = "[a-c]{1,2}";
    prop_oneof![
        (key, valid_value_strategy()).prop_map(|(key, value)| CacheOp::Add { key, value }),
        key.prop_map(|key| CacheOp::Get { key }),
        key.prop_map(|key| CacheOp::Remove { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Any sequence of operations behaves like a plain map, and the stats
    // count exactly the hits, misses, writes and removals that happened.
    #[test]
    fn prop_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let (_connector, store) = new_store();
        let mut model: HashMap<String, String> = HashMap::new();
        let (mut hits, mut misses, mut writes, mut removals) = (0u64, 0u64, 0u64, 0u64);

        for op in ops {
            match op {
                CacheOp::Add { key, value } => {
                    prop_assert!(block_on(store.add(&key, &value, None)).unwrap());
                    model.insert(key, value);
                    writes += 1;
                }
                CacheOp::Get { key } => {
                    let got: Option<String> = block_on(store.get(&key)).unwrap();
                    prop_assert_eq!(got.as_ref(), model.get(&key));
                    if got.is_some() { hits += 1 } else { misses += 1 }
                }
                CacheOp::Remove { key } => {
                    let removed = block_on(store.remove(&key)).unwrap();
                    prop_assert_eq!(removed, model.remove(&key).is_some());
                    if removed { removals += 1 }
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, misses, "Misses mismatch");
        prop_assert_eq!(stats.writes, writes, "Writes mismatch");
        prop_assert_eq!(stats.removals, removals, "Removals mismatch");
        prop_assert_eq!(stats.degraded(), 0);
    }

    // A stored value reads back unchanged until it is removed.
    #[test]
    fn prop_roundtrip_then_remove(key in valid_key_strategy(), value in valid_value_strategy()) {
        let (_connector, store) = new_store();

        prop_assert!(block_on(store.add(&key, &value, None)).unwrap());
        prop_assert_eq!(block_on(store.get::<String>(&key)).unwrap(), Some(value));
        prop_assert!(block_on(store.exists(&key)).unwrap());

        prop_assert!(block_on(store.remove(&key)).unwrap());
        prop_assert_eq!(block_on(store.get::<String>(&key)).unwrap(), None);
        prop_assert!(!block_on(store.exists(&key)).unwrap());
    }

    // Values written under one prefix are invisible under another prefix
    // and without one.
    #[test]
    fn prop_prefixes_are_isolated(
        key in valid_key_strategy(),
        value in valid_value_strategy(),
        first in prefix_strategy(),
        second in prefix_strategy(),
    ) {
        prop_assume!(first != second);
        let (connector, store) = new_store();

        block_on(store.add_with_prefix(&key, &value, None, &first)).unwrap();

        let stored = format!("{first}:{key}");
        prop_assert!(connector.backend().contains_key(&stored));
        prop_assert_eq!(
            block_on(store.get_with_prefix::<String>(&key, &first)).unwrap(),
            Some(value)
        );
        prop_assert_eq!(block_on(store.get_with_prefix::<String>(&key, &second)).unwrap(), None);
        prop_assert_eq!(block_on(store.get::<String>(&key)).unwrap(), None);
    }

    // An expiry in the past never leaves a readable value behind.
    #[test]
    fn prop_expired_add_is_absent(
        key in valid_key_strategy(),
        value in valid_value_strategy(),
        seconds_ago in 0i64..86_400,
    ) {
        let (_connector, store) = new_store();
        block_on(store.add(&key, "previous", None)).unwrap();

        let past = Utc::now() - ChronoDuration::seconds(seconds_ago);
        prop_assert!(!block_on(store.add(&key, &value, Some(past))).unwrap());
        prop_assert_eq!(block_on(store.get::<String>(&key)).unwrap(), None);
    }

    // While the store fails transiently, every operation still succeeds
    // from the caller's point of view and yields its neutral result.
    #[test]
    fn prop_transient_failures_degrade(
        key in valid_key_strategy(),
        value in valid_value_strategy(),
        error in transient_error_strategy(),
    ) {
        let (connector, store) = new_store();
        block_on(store.add(&key, &value, None)).unwrap();
        let kind = error.transient_kind().unwrap();
        connector.backend().set_outage(Some(error));

        prop_assert_eq!(
            block_on(store.lookup::<String>(&key)).unwrap(),
            Lookup::Unavailable(kind)
        );
        prop_assert!(!block_on(store.add(&key, &value, None)).unwrap());
        prop_assert!(!block_on(store.exists(&key)).unwrap());
        prop_assert!(!block_on(store.remove(&key)).unwrap());
        prop_assert_eq!(store.stats().degraded(), 4);

        connector.backend().set_outage(None);
        prop_assert_eq!(block_on(store.get::<String>(&key)).unwrap(), Some(value));
    }
}
