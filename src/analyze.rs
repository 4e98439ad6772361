//! Generic packet analysis records
//!
//! Offline capture-file processing indexes every packet aimed at the target,
//! not just SIP. The payload is decoded as strict UTF-8 with a colon-line
//! key map; bytes that do not decode are kept as hex with an explicit
//! decoding-error marker. Exactly one of the two representations is set.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::IpAddr;

use crate::core::{CapturedPacket, TransportProtocol};

/// Marker stored when payload bytes are not valid UTF-8
pub const DECODING_ERROR: &str = "The bytes could not be decoded as a UTF-8 string";

/// Analysis record for one packet, camelCase on the wire
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedRecord {
    #[serde(rename = "packetTime")]
    pub packet_time: DateTime<Utc>,

    #[serde(rename = "srcIP")]
    pub src_ip: IpAddr,

    #[serde(rename = "dstIP")]
    pub dst_ip: IpAddr,

    #[serde(rename = "srcPort")]
    pub src_port: u16,

    #[serde(rename = "dstPort")]
    pub dst_port: u16,

    pub protocol: TransportProtocol,

    /// Payload length in bytes
    pub length: usize,

    #[serde(rename = "decodedString", skip_serializing_if = "Option::is_none")]
    pub decoded_string: Option<String>,

    /// Key→value map derived from colon-delimited payload lines
    #[serde(rename = "decodedStringKey", skip_serializing_if = "Option::is_none")]
    pub decoded_string_key: Option<Map<String, Value>>,

    #[serde(rename = "decodingError", skip_serializing_if = "Option::is_none")]
    pub decoding_error: Option<String>,

    #[serde(rename = "hexadecimalString", skip_serializing_if = "Option::is_none")]
    pub hexadecimal_string: Option<String>,

    /// Source-address enrichment, merged before sinking
    #[serde(rename = "srcIPDetails", skip_serializing_if = "Option::is_none")]
    pub src_ip_details: Option<Value>,
}

impl AnalyzedRecord {
    /// Build a record from a captured packet, decoding its payload
    pub fn from_packet(pkt: &CapturedPacket) -> Self {
        let mut record = Self {
            packet_time: pkt.timestamp,
            src_ip: pkt.src_ip,
            dst_ip: pkt.dst_ip,
            src_port: pkt.src_port,
            dst_port: pkt.dst_port,
            protocol: pkt.transport,
            length: pkt.payload.len(),
            decoded_string: None,
            decoded_string_key: None,
            decoding_error: None,
            hexadecimal_string: None,
            src_ip_details: None,
        };

        match std::str::from_utf8(&pkt.payload) {
            Ok(text) => {
                let mut keys = Map::new();
                for line in text.lines() {
                    if let Some((key, value)) = line.split_once(':') {
                        keys.insert(
                            key.trim().to_string(),
                            Value::String(value.trim().to_string()),
                        );
                    }
                }
                record.decoded_string = Some(text.to_string());
                record.decoded_string_key = Some(keys);
            }
            Err(_) => {
                record.decoding_error = Some(DECODING_ERROR.to_string());
                record.hexadecimal_string = Some(hex::encode(&pkt.payload));
            }
        }

        record
    }

    /// Attach the source-address enrichment result
    pub fn set_enrichment(&mut self, details: Value) {
        self.src_ip_details = Some(details);
    }
}
