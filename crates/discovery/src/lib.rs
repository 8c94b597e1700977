//! The Discovery Service: a Redis-backed, eventually-consistent registry of
//! `service_name -> [host:port]` mappings, fronted by a local cache that is
//! refreshed on a fixed tick and consulted via a pluggable load-balancing
//! strategy.

pub mod balance;
pub mod error;

pub use balance::{ConsistentHashBalancer, LoadBalancer, RoundRobinBalancer};
pub use error::{Error, Result};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

const KEY_PREFIX: &str = "im:discovery:";

/// One registered replica: `address:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub address: String,
    pub port: String,
}

impl ServiceInfo {
    pub fn new(address: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: port.into(),
        }
    }

    fn to_member(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    fn from_member(member: &str) -> Option<Self> {
        let (address, port) = member.split_once(':')?;
        Some(Self::new(address, port))
    }
}

pub struct DiscoveryService {
    redis: ConnectionManager,
    services: RwLock<HashMap<String, Vec<ServiceInfo>>>,
    ready: AtomicBool,
    balancer: Box<dyn LoadBalancer>,
    refresh_interval: Duration,
    refresh_timeout: Duration,
}

impl DiscoveryService {
    /// Connect to Redis, attempt an initial cache fill, and spawn the
    /// one-second background refresh loop. Returns immediately even if the
    /// initial fill fails — `ready()` stays `false` until one succeeds.
    pub async fn connect(
        redis_url: &str,
        refresh_interval: Duration,
        refresh_timeout: Duration,
    ) -> Result<Arc<Self>> {
        Self::connect_with_balancer(
            redis_url,
            refresh_interval,
            refresh_timeout,
            Box::new(ConsistentHashBalancer),
        )
        .await
    }

    pub async fn connect_with_balancer(
        redis_url: &str,
        refresh_interval: Duration,
        refresh_timeout: Duration,
        balancer: Box<dyn LoadBalancer>,
    ) -> Result<Arc<Self>> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        let service = Arc::new(Self {
            redis,
            services: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(false),
            balancer,
            refresh_interval,
            refresh_timeout,
        });

        match tokio::time::timeout(refresh_timeout, service.refresh_once()).await {
            Ok(Ok(())) => {
                service.ready.store(true, Ordering::Release);
                info!("discovery cache primed from redis");
            }
            Ok(Err(err)) => warn!(%err, "initial discovery refresh failed, retrying on schedule"),
            Err(_) => warn!("initial discovery refresh timed out, retrying on schedule"),
        }

        service.clone().spawn_refresh_loop();
        Ok(service)
    }

    fn spawn_refresh_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match tokio::time::timeout(self.refresh_timeout, self.refresh_once()).await {
                    Ok(Ok(())) => {
                        self.ready.store(true, Ordering::Release);
                        debug!("discovery cache refreshed");
                    }
                    Ok(Err(err)) => error!(%err, "discovery refresh failed, keeping last-known cache"),
                    Err(_) => error!("discovery refresh timed out, keeping last-known cache"),
                }
            }
        });
    }

    async fn refresh_once(&self) -> Result<()> {
        let mut redis = self.redis.clone();
        let keys: Vec<String> = redis.keys(format!("{KEY_PREFIX}*")).await?;

        let mut next = HashMap::with_capacity(keys.len());
        for key in keys {
            let Some(service_name) = key.strip_prefix(KEY_PREFIX) else {
                continue;
            };
            let members: Vec<String> = redis.smembers(&key).await?;
            let infos = members.iter().filter_map(|m| ServiceInfo::from_member(m)).collect();
            next.insert(service_name.to_string(), infos);
        }

        *self.services.write().await = next;
        Ok(())
    }

    /// Register `address:port` under `service_name`, in Redis first and then
    /// in the local cache. Fails with [`Error::AlreadyExists`] if this exact
    /// member is already registered.
    pub async fn register(&self, service_name: &str, address: &str, port: &str) -> Result<()> {
        let info = ServiceInfo::new(address, port);
        let mut redis = self.redis.clone();
        let added: i64 = redis.sadd(format!("{KEY_PREFIX}{service_name}"), info.to_member()).await?;
        if added == 0 {
            return Err(Error::AlreadyExists(service_name.to_string()));
        }
        self.services
            .write()
            .await
            .entry(service_name.to_string())
            .or_default()
            .push(info);
        Ok(())
    }

    /// Remove `address:port` from `service_name`'s registration, in Redis
    /// and the local cache. Fails with [`Error::NotFound`] if it was not
    /// registered.
    pub async fn deregister(&self, service_name: &str, address: &str, port: &str) -> Result<()> {
        let info = ServiceInfo::new(address, port);
        let mut redis = self.redis.clone();
        let removed: i64 =
            redis.srem(format!("{KEY_PREFIX}{service_name}"), info.to_member()).await?;
        if removed == 0 {
            return Err(Error::NotFound(service_name.to_string()));
        }
        if let Some(entries) = self.services.write().await.get_mut(service_name) {
            entries.retain(|e| *e != info);
        }
        Ok(())
    }

    /// All currently known replicas for `service_name`.
    pub async fn get_service(&self, service_name: &str) -> Result<Vec<ServiceInfo>> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(Error::Unavailable);
        }

        if let Some(entries) = self.services.read().await.get(service_name) {
            if !entries.is_empty() {
                return Ok(entries.clone());
            }
        }

        // Cache miss: fall back to Redis directly and repopulate.
        let mut redis = self.redis.clone();
        let members: Vec<String> = redis.smembers(format!("{KEY_PREFIX}{service_name}")).await?;
        let infos: Vec<ServiceInfo> =
            members.iter().filter_map(|m| ServiceInfo::from_member(m)).collect();
        if infos.is_empty() {
            return Err(Error::NotFound(service_name.to_string()));
        }
        self.services.write().await.insert(service_name.to_string(), infos.clone());
        Ok(infos)
    }

    /// Select a single replica for `service_name` via the configured load
    /// balancer, keyed on `client_key`.
    pub async fn get_service_ip(&self, service_name: &str, client_key: &str) -> Result<ServiceInfo> {
        let mut entries = self.get_service(service_name).await?;
        // `register`/`refresh_once` don't guarantee a stable order (Redis
        // SMEMBERS is unordered), so sort before indexing: otherwise the
        // same client_key can select a different replica across refreshes.
        entries.sort_by(|a, b| a.to_member().cmp(&b.to_member()));
        let index = self.balancer.select(entries.len(), client_key);
        Ok(entries[index].clone())
    }

    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_info_member_round_trip() {
        let info = ServiceInfo::new("10.0.0.1", "7001");
        assert_eq!(info.to_member(), "10.0.0.1:7001");
        assert_eq!(ServiceInfo::from_member("10.0.0.1:7001"), Some(info));
    }

    #[test]
    fn service_info_rejects_malformed_member() {
        assert_eq!(ServiceInfo::from_member("no-colon-here"), None);
    }
}
