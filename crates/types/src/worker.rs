//! `Worker`: a registered prover operator and its ban/failure bookkeeping.

use std::sync::atomic::{AtomicI64, AtomicU32};

use alloy::primitives::Address;
use parking_lot::RwLock;

/// A worker's mutable state. `consecutive_failures` and `banned_until`
/// (unix nanos, 0 = not banned) are atomics so `WorkerResult` can update
/// them without taking the worker map's lock; `name` is set once and is
/// the one field the manager may mutate under a short-lived write lock.
#[derive(Debug)]
pub struct Worker {
    pub address: Address,
    name: RwLock<String>,
    pub consecutive_failures: AtomicU32,
    pub banned_until_unix_nanos: AtomicI64,
    pub total_successes: AtomicU32,
    pub total_failures: AtomicU32,
}

impl Worker {
    pub fn new(address: Address, name: String) -> Self {
        Self {
            address,
            name: RwLock::new(name),
            consecutive_failures: AtomicU32::new(0),
            banned_until_unix_nanos: AtomicI64::new(0),
            total_successes: AtomicU32::new(0),
            total_failures: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// `AddWorker` sets the name only if it was previously empty.
    pub fn set_name_if_empty(&self, name: &str) {
        let mut guard = self.name.write();
        if guard.is_empty() {
            *guard = name.to_string();
        }
    }
}

/// A snapshot of a worker's bookkeeping, for the read-only parts of the
/// ban predicate and for API responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub consecutive_failures: u32,
    pub banned_until_unix_nanos: i64,
}

/// Rules the Worker Manager's ban predicate and ticker are parameterized
/// by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BanRules {
    pub failures_to_get_banned: u32,
    pub ban_timeout_secs: u64,
}

impl WorkerSnapshot {
    pub fn is_banned(&self, rules: BanRules, now_unix_nanos: i64) -> bool {
        self.consecutive_failures > rules.failures_to_get_banned
            || now_unix_nanos < self.banned_until_unix_nanos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn name_is_set_only_once() {
        let w = Worker::new(Address::ZERO, String::new());
        w.set_name_if_empty("alice");
        w.set_name_if_empty("bob");
        assert_eq!(w.name(), "alice");
    }

    #[test]
    fn ban_predicate_combines_failures_and_timeout() {
        let rules = BanRules {
            failures_to_get_banned: 3,
            ban_timeout_secs: 60,
        };
        let snap = WorkerSnapshot {
            consecutive_failures: 4,
            banned_until_unix_nanos: 0,
        };
        assert!(snap.is_banned(rules, 1_000));

        let snap = WorkerSnapshot {
            consecutive_failures: 0,
            banned_until_unix_nanos: 2_000,
        };
        assert!(snap.is_banned(rules, 1_000));
        assert!(!snap.is_banned(rules, 3_000));
    }

    #[test]
    fn worker_new_starts_unbanned() {
        let w = Worker::new(Address::ZERO, "alice".into());
        assert_eq!(w.consecutive_failures.load(Ordering::Relaxed), 0);
        assert_eq!(w.banned_until_unix_nanos.load(Ordering::Relaxed), 0);
    }
}
