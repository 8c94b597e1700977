//! Pluggable selection strategies for picking one replica out of a service's
//! current member list.

use std::sync::atomic::{AtomicU64, Ordering};

const FNV_OFFSET_BASIS_32: u32 = 0x811c9dc5;
const FNV_PRIME_32: u32 = 0x0100_0193;

/// True 32-bit FNV-1a, matching the original's `fnv.New32a()`/`Sum32()`.
/// `fnv::FnvHasher` is the 64-bit variant and is not a drop-in substitute.
fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS_32;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME_32);
    }
    hash
}

/// Picks an index in `0..len` for a given key. Implementations must be
/// `Send + Sync` since a single instance is shared across every lookup.
pub trait LoadBalancer: Send + Sync {
    /// `len` is always > 0 when called by [`crate::DiscoveryService`].
    fn select(&self, len: usize, key: &str) -> usize;
}

/// FNV-1a-32 hash of `key`, modulo `len`. Deterministic: the same key and
/// the same member count always select the same index.
#[derive(Default)]
pub struct ConsistentHashBalancer;

impl LoadBalancer for ConsistentHashBalancer {
    fn select(&self, len: usize, key: &str) -> usize {
        (fnv1a_32(key.as_bytes()) % len as u32) as usize
    }
}

/// Cycles through indices in order, ignoring the key.
#[derive(Default)]
pub struct RoundRobinBalancer {
    counter: AtomicU64,
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(&self, len: usize, _key: &str) -> usize {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        (n % len as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_32_matches_known_vectors() {
        assert_eq!(fnv1a_32(b""), 0x811c9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c292c);
    }

    #[test]
    fn consistent_hash_is_stable_for_a_fixed_key_and_length() {
        let balancer = ConsistentHashBalancer;
        let first = balancer.select(5, "user-42");
        for _ in 0..20 {
            assert_eq!(balancer.select(5, "user-42"), first);
        }
    }

    #[test]
    fn round_robin_cycles_through_every_index() {
        let balancer = RoundRobinBalancer::default();
        let seen: Vec<usize> = (0..4).map(|_| balancer.select(4, "ignored")).collect();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
