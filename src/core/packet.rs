//! Captured packet representation
//!
//! One `CapturedPacket` per observed packet, with addresses, ports and the
//! application payload already split out by the frame decoder. Owned by the
//! pipeline for the duration of one processing step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Transport protocol carrying the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportProtocol::Udp => write!(f, "UDP"),
            TransportProtocol::Tcp => write!(f, "TCP"),
        }
    }
}

/// A single captured packet with transport metadata and raw payload
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub transport: TransportProtocol,
    pub src_port: u16,
    pub dst_port: u16,
    /// Raw application payload, possibly empty
    pub payload: Vec<u8>,
    /// Capture timestamp from the pcap record header
    pub timestamp: DateTime<Utc>,
}

impl CapturedPacket {
    pub fn new(
        src_ip: IpAddr,
        dst_ip: IpAddr,
        transport: TransportProtocol,
        src_port: u16,
        dst_port: u16,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            src_ip,
            dst_ip,
            transport,
            src_port,
            dst_port,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Payload length in bytes
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
