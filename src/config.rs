use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub enrich: EnrichConfig,

    #[serde(default)]
    pub sink: SinkConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/sipwatch/config.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("sipwatch/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Interface to capture on (default: first available device)
    #[serde(default)]
    pub interface: Option<String>,

    /// BPF filter applied to the live capture
    #[serde(default = "default_bpf_filter")]
    pub bpf_filter: String,

    /// External address of the monitored host (autodiscovered when unset)
    #[serde(default)]
    pub external_ip: Option<IpAddr>,

    /// Destination address kept when analyzing capture files
    #[serde(default)]
    pub target_ip: Option<IpAddr>,

    /// Service used to discover our external address
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            bpf_filter: default_bpf_filter(),
            external_ip: None,
            target_ip: None,
            discovery_url: default_discovery_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// GeoIP endpoint (free, no API key needed)
    #[serde(default = "default_geoip_endpoint")]
    pub geoip_endpoint: String,

    /// Abuse reputation endpoint
    #[serde(default = "default_abuseipdb_endpoint")]
    pub abuseipdb_endpoint: String,

    /// Host intelligence endpoint
    #[serde(default = "default_shodan_endpoint")]
    pub shodan_endpoint: String,

    /// AbuseIPDB API key (provider disabled when unset)
    #[serde(default)]
    pub abuseipdb_api_key: Option<String>,

    /// Shodan API key (provider disabled when unset)
    #[serde(default)]
    pub shodan_api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Path of the persistent IP cache file
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            geoip_endpoint: default_geoip_endpoint(),
            abuseipdb_endpoint: default_abuseipdb_endpoint(),
            shodan_endpoint: default_shodan_endpoint(),
            abuseipdb_api_key: None,
            shodan_api_key: None,
            timeout_secs: default_timeout(),
            cache_path: default_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Enable indexing into the document store
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Document store base URL
    #[serde(default = "default_sink_url")]
    pub url: String,

    /// Basic auth username (no auth when unset)
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Index receiving SIP signaling records
    #[serde(default = "default_sip_index")]
    pub sip_index: String,

    /// Index receiving generic packet analysis records
    #[serde(default = "default_packet_index")]
    pub packet_index: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_sink_url(),
            username: None,
            password: None,
            sip_index: default_sip_index(),
            packet_index: default_packet_index(),
            timeout_secs: default_timeout(),
        }
    }
}

// Default value functions

fn default_bpf_filter() -> String {
    "port 5060 or port 5061".to_string()
}

fn default_discovery_url() -> String {
    "https://httpbin.org/ip".to_string()
}

fn default_geoip_endpoint() -> String {
    "http://ip-api.com".to_string()
}

fn default_abuseipdb_endpoint() -> String {
    "https://api.abuseipdb.com/api/v2/check".to_string()
}

fn default_shodan_endpoint() -> String {
    "https://api.shodan.io/shodan/host".to_string()
}

fn default_cache_path() -> String {
    "ip_cache.json".to_string()
}

fn default_sink_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_sip_index() -> String {
    "sip_data".to_string()
}

fn default_packet_index() -> String {
    "pcap-data".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capture.bpf_filter, "port 5060 or port 5061");
        assert_eq!(config.sink.sip_index, "sip_data");
        assert_eq!(config.enrich.cache_path, "ip_cache.json");
        assert!(config.enrich.abuseipdb_api_key.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sink.packet_index, config.sink.packet_index);
        assert_eq!(parsed.enrich.timeout_secs, config.enrich.timeout_secs);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [capture]
            target_ip = "203.0.113.5"

            [enrich]
            shodan_api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.capture.target_ip.unwrap().to_string(), "203.0.113.5");
        assert_eq!(parsed.capture.bpf_filter, "port 5060 or port 5061");
        assert_eq!(parsed.enrich.shodan_api_key.as_deref(), Some("secret"));
        assert!(parsed.sink.enabled);
    }
}
