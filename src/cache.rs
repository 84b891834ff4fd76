//! In-process memoization of record-store reads.
//!
//! One `moka` cache per namespace, each entry carrying its own TTL. There is
//! no size bound and no single-flight: two concurrent misses for the same key
//! both go upstream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::ops::compute::Op;
use moka::sync::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheNamespace {
    Jobs,
    Talents,
    Applications,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 3] = [
        CacheNamespace::Jobs,
        CacheNamespace::Talents,
        CacheNamespace::Applications,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "jobs" => Some(Self::Jobs),
            "talents" => Some(Self::Talents),
            "applications" => Some(Self::Applications),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Jobs => 0,
            Self::Talents => 1,
            Self::Applications => 2,
        }
    }
}

/// Builds `operation:params` with the parameters serialized as JSON.
pub fn cache_key<P: Serialize + ?Sized>(operation: &str, params: &P) -> String {
    match serde_json::to_string(params) {
        Ok(serialized) => format!("{operation}:{serialized}"),
        Err(_) => operation.to_string(),
    }
}

#[derive(Clone)]
struct Cached {
    value: Arc<Value>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Cached> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Cached,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Cached,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStats {
    pub namespace: CacheNamespace,
    pub entries: usize,
}

pub struct RecordCache {
    buckets: [Cache<String, Cached>; 3],
    default_ttl: Duration,
}

impl RecordCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            buckets: CacheNamespace::ALL
                .map(|_| Cache::builder().expire_after(PerEntryTtl).build()),
            default_ttl,
        }
    }

    fn bucket(&self, namespace: CacheNamespace) -> &Cache<String, Cached> {
        &self.buckets[namespace.index()]
    }

    pub fn get<T: DeserializeOwned>(&self, namespace: CacheNamespace, key: &str) -> Option<T> {
        let cached = self.bucket(namespace).get(key)?;
        match serde_json::from_value(Value::clone(&cached.value)) {
            Ok(value) => {
                debug!(?namespace, key, "cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(?namespace, key, error = %err, "dropping undecodable cache entry");
                // Only the entry that failed to decode goes; a newer `set` stays.
                let _ = self
                    .bucket(namespace)
                    .entry_by_ref(key)
                    .and_compute_with(|current| match current {
                        Some(entry) if Arc::ptr_eq(&entry.value().value, &cached.value) => {
                            Op::Remove
                        }
                        _ => Op::Nop,
                    });
                None
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, namespace: CacheNamespace, key: &str, value: &T) {
        self.set_with_ttl(namespace, key, value, self.default_ttl);
    }

    pub fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &T,
        ttl: Duration,
    ) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                warn!(?namespace, key, error = %err, "value not cacheable");
                return;
            }
        };
        self.bucket(namespace).insert(
            key.to_string(),
            Cached {
                value: Arc::new(value),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, namespace: CacheNamespace, key: &str) {
        self.bucket(namespace).invalidate(key);
    }

    /// Returns the number of live entries dropped.
    pub fn clear_namespace(&self, namespace: CacheNamespace) -> usize {
        let bucket = self.bucket(namespace);
        let dropped = bucket.iter().count();
        bucket.invalidate_all();
        dropped
    }

    /// Returns the number of live entries dropped.
    pub fn clear(&self) -> usize {
        CacheNamespace::ALL
            .iter()
            .map(|namespace| self.clear_namespace(*namespace))
            .sum()
    }

    pub fn stats(&self) -> Vec<NamespaceStats> {
        CacheNamespace::ALL
            .iter()
            .map(|namespace| NamespaceStats {
                namespace: *namespace,
                entries: self.bucket(*namespace).iter().count(),
            })
            .collect()
    }
}
