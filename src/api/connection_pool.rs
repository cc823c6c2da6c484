// src/api/connection_pool.rs
//! Shared HTTP clients, one per external service.
//!
//! Each service gets its own client so its request timeout applies to every
//! call without per-request plumbing; clients are reused across workers so
//! connections stay pooled.

use crate::error::AppError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use reqwest::{Client, ClientBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

static CONNECTION_POOL: Lazy<RwLock<HashMap<String, Arc<Client>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

const USER_AGENT: &str = concat!("sitecurator/", env!("CARGO_PKG_VERSION"));

/// Client configuration for one service.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum idle connections per host
    pub max_idle_per_host: usize,
    pub connect_timeout: Duration,
    /// Upper bound for a whole request, body included
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub tcp_keepalive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

impl PoolConfig {
    pub fn with_request_timeout(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..Self::default()
        }
    }

    fn build_client(&self) -> Result<Client, reqwest::Error> {
        let mut builder = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .pool_idle_timeout(self.pool_idle_timeout);

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        builder.build()
    }
}

/// Returns the pooled client for `key`, building it on first use.
///
/// The configuration of the first request for a key wins.
pub fn client_for(key: &str, config: &PoolConfig) -> Result<Arc<Client>, AppError> {
    if let Some(client) = CONNECTION_POOL.read().get(key) {
        return Ok(Arc::clone(client));
    }

    let mut clients = CONNECTION_POOL.write();
    if let Some(client) = clients.get(key) {
        return Ok(Arc::clone(client));
    }
    let client = Arc::new(config.build_client()?);
    clients.insert(key.to_string(), Arc::clone(&client));
    log::debug!(
        "Built HTTP client for {} (timeout {:?})",
        key,
        config.request_timeout
    );
    Ok(client)
}
