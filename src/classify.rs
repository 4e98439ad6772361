//! Address classification
//!
//! Decides whether an address is internal (RFC1918) and whether a packet's
//! destination is relevant to the monitored host. Pure checks, no I/O.

use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr};
use tracing::warn;

/// Reserved private ranges treated as internal
const INTERNAL_RANGES: [&str; 3] = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

/// Classifies addresses relative to the monitored target
#[derive(Debug, Clone)]
pub struct TargetClassifier {
    external: IpAddr,
    internal_ranges: Vec<IpNetwork>,
}

impl TargetClassifier {
    /// Create a classifier for the given external address of the monitored host
    pub fn new(external: IpAddr) -> Self {
        let internal_ranges: Vec<IpNetwork> = INTERNAL_RANGES
            .iter()
            .map(|cidr| cidr.parse().expect("hard-coded CIDR literal"))
            .collect();

        Self {
            external,
            internal_ranges,
        }
    }

    /// The configured external address of the monitored host
    pub fn external(&self) -> IpAddr {
        self.external
    }

    /// True iff the address falls in a reserved private range
    pub fn is_internal(&self, ip: IpAddr) -> bool {
        self.internal_ranges.iter().any(|net| net.contains(ip))
    }

    /// True iff the destination matches the monitored host: its external
    /// address, or any internal address
    pub fn is_relevant(&self, dst_ip: IpAddr) -> bool {
        dst_ip == self.external || self.is_internal(dst_ip)
    }
}

/// Ask an external service for our public address.
///
/// Falls back to `0.0.0.0` when the service is unreachable so startup never
/// blocks on connectivity.
pub async fn discover_external_ip(client: &reqwest::Client, url: &str) -> IpAddr {
    match fetch_origin(client, url).await {
        Ok(ip) => ip,
        Err(e) => {
            warn!("external address discovery failed ({}), defaulting to 0.0.0.0", e);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    }
}

async fn fetch_origin(client: &reqwest::Client, url: &str) -> anyhow::Result<IpAddr> {
    #[derive(serde::Deserialize)]
    struct OriginResponse {
        origin: String,
    }

    let resp: OriginResponse = client.get(url).send().await?.json().await?;

    // Proxies can report "client, proxy"; the first entry is ours
    let first = resp
        .origin
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .parse()?;

    Ok(first)
}
