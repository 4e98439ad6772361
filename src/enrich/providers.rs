//! Enrichment provider adapters
//!
//! Each external intelligence service is wrapped behind the `IntelProvider`
//! capability so providers stay interchangeable and tests can substitute
//! fakes. A provider returns its raw JSON response on success; any transport
//! failure or non-success status is an error the caller records as an
//! explicit absence.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::EnrichConfig;
use crate::error::{PipelineError, Result};

/// Uniform lookup capability over an external intelligence service
#[async_trait]
pub trait IntelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Query the service for one address
    async fn query(&self, ip: &str) -> Result<Value>;
}

/// GeoIP lookup (ip-api.com shape), no API key required
pub struct GeoIpProvider {
    client: Client,
    endpoint: String,
}

impl GeoIpProvider {
    pub fn new(client: Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl IntelProvider for GeoIpProvider {
    fn name(&self) -> &str {
        "geoip"
    }

    async fn query(&self, ip: &str) -> Result<Value> {
        let url = format!("{}/json/{}", self.endpoint, ip);
        fetch_json(self.client.get(&url), self.name()).await
    }
}

/// Abuse reputation lookup (AbuseIPDB shape), key in a request header
pub struct AbuseIpDbProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl AbuseIpDbProvider {
    pub fn new(client: Client, endpoint: String, api_key: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl IntelProvider for AbuseIpDbProvider {
    fn name(&self) -> &str {
        "abuseipdb"
    }

    async fn query(&self, ip: &str) -> Result<Value> {
        let req = self
            .client
            .get(&self.endpoint)
            .query(&[("ipAddress", ip), ("maxAgeInDays", "90")])
            .header("Key", &self.api_key)
            .header("Accept", "application/json");
        fetch_json(req, self.name()).await
    }
}

/// Host intelligence lookup (Shodan shape), key as a query parameter
pub struct ShodanProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ShodanProvider {
    pub fn new(client: Client, endpoint: String, api_key: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl IntelProvider for ShodanProvider {
    fn name(&self) -> &str {
        "shodan"
    }

    async fn query(&self, ip: &str) -> Result<Value> {
        let url = format!("{}/{}?key={}", self.endpoint, ip, self.api_key);
        fetch_json(self.client.get(&url), self.name()).await
    }
}

async fn fetch_json(req: reqwest::RequestBuilder, provider: &str) -> Result<Value> {
    let resp = req.send().await?;

    if !resp.status().is_success() {
        return Err(PipelineError::Provider {
            provider: provider.to_string(),
            reason: format!("status {}", resp.status()),
        });
    }

    Ok(resp.json().await?)
}

/// Build the configured provider set. Keyed providers are only constructed
/// when their API key is present.
pub fn build_providers(config: &EnrichConfig, client: &Client) -> Vec<Box<dyn IntelProvider>> {
    let mut providers: Vec<Box<dyn IntelProvider>> = vec![Box::new(GeoIpProvider::new(
        client.clone(),
        config.geoip_endpoint.clone(),
    ))];

    if let Some(key) = &config.abuseipdb_api_key {
        providers.push(Box::new(AbuseIpDbProvider::new(
            client.clone(),
            config.abuseipdb_endpoint.clone(),
            key.clone(),
        )));
    }

    if let Some(key) = &config.shodan_api_key {
        providers.push(Box::new(ShodanProvider::new(
            client.clone(),
            config.shodan_endpoint.clone(),
            key.clone(),
        )));
    }

    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_providers_require_keys() {
        let client = Client::new();

        let config = EnrichConfig::default();
        let providers = build_providers(&config, &client);
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name(), "geoip");

        let config = EnrichConfig {
            abuseipdb_api_key: Some("k1".to_string()),
            shodan_api_key: Some("k2".to_string()),
            ..Default::default()
        };
        let providers = build_providers(&config, &client);
        let names: Vec<_> = providers.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, ["geoip", "abuseipdb", "shodan"]);
    }
}
