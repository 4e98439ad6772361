//! Source-address enrichment
//!
//! Composes the provider adapters behind a durable cache. A lookup pays the
//! external queries at most once per address: cache hits return immediately,
//! and concurrent callers for the same address share one in-flight lookup.

pub mod cache;
pub mod providers;

pub use cache::{EnrichmentResult, IpCache};
pub use providers::{build_providers, IntelProvider};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Cache-backed enrichment over a set of providers
pub struct Enricher {
    providers: Vec<Box<dyn IntelProvider>>,
    cache: Mutex<IpCache>,
    /// Per-address gates serializing external lookups for the same IP
    inflight: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Enricher {
    pub fn new(providers: Vec<Box<dyn IntelProvider>>, cache: IpCache) -> Self {
        Self {
            providers,
            cache: Mutex::new(cache),
            inflight: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Look up intelligence for an address through all configured providers.
    ///
    /// Cache hit: returns the stored result, no network I/O, no mutation.
    /// Cache miss: queries every provider (a failed provider is recorded as
    /// `null`, never a failed lookup), writes the composed result durably,
    /// then returns it. When the durable write fails the entry is discarded
    /// and the error surfaces, so a later call retries the external queries.
    ///
    /// At most one external lookup per address is in flight at a time;
    /// concurrent callers for the same address wait and reuse the result.
    pub async fn lookup(&self, ip: &str) -> Result<EnrichmentResult> {
        self.lookup_providers(ip, None).await
    }

    /// `lookup` restricted to a subset of providers on a cache miss.
    ///
    /// The cache is keyed by address alone: an entry satisfies every later
    /// lookup regardless of which providers originally populated it.
    pub async fn lookup_providers(
        &self,
        ip: &str,
        requested: Option<&[&str]>,
    ) -> Result<EnrichmentResult> {
        if let Some(hit) = self.cache.lock().get(ip).cloned() {
            debug!("enrichment cache hit for {}", ip);
            return Ok(hit);
        }

        let gate = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(ip.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = gate.lock().await;

        // A concurrent caller may have resolved this address while we waited
        if let Some(hit) = self.cache.lock().get(ip).cloned() {
            return Ok(hit);
        }

        info!("gathering intelligence for {}", ip);
        let mut result = EnrichmentResult::new();
        for provider in &self.providers {
            if let Some(names) = requested {
                if !names.contains(&provider.name()) {
                    continue;
                }
            }
            match provider.query(ip).await {
                Ok(response) => {
                    result.insert(provider.name().to_string(), response);
                }
                Err(e) => {
                    warn!("{} lookup failed for {}: {}", provider.name(), ip, e);
                    result.insert(provider.name().to_string(), Value::Null);
                }
            }
        }

        let written = self.cache.lock().insert_durable(ip, result.clone());

        drop(guard);
        self.inflight.lock().await.remove(ip);

        written?;
        Ok(result)
    }

    /// Peek at the cache without triggering external queries
    pub fn cached(&self, ip: &str) -> Option<EnrichmentResult> {
        self.cache.lock().get(ip).cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}
