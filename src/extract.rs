//! Payload extraction
//!
//! Gate between raw captured packets and the SIP parser: a packet yields its
//! payload only when the destination is relevant to the monitored host, an
//! endpoint uses the signaling ports, and the payload is non-empty. Anything
//! else is skipped without producing a record or a log entry.

use crate::classify::TargetClassifier;
use crate::core::{CapturedPacket, TransportProtocol};

/// SIP signaling port (UDP and TCP)
pub const SIP_PORT: u16 = 5060;
/// SIP-over-TLS signaling port (TCP only)
pub const SIPS_PORT: u16 = 5061;

/// True iff either endpoint of the packet uses a signaling port
pub fn uses_signaling_ports(pkt: &CapturedPacket) -> bool {
    match pkt.transport {
        TransportProtocol::Udp => pkt.src_port == SIP_PORT || pkt.dst_port == SIP_PORT,
        TransportProtocol::Tcp => {
            pkt.src_port == SIP_PORT
                || pkt.dst_port == SIP_PORT
                || pkt.src_port == SIPS_PORT
                || pkt.dst_port == SIPS_PORT
        }
    }
}

/// Extract the signaling payload from a packet, or skip it.
///
/// Returns `None` when the destination is not the monitored host, neither
/// endpoint uses the signaling ports, or the payload is empty.
pub fn extract<'a>(pkt: &'a CapturedPacket, classifier: &TargetClassifier) -> Option<&'a [u8]> {
    if !classifier.is_relevant(pkt.dst_ip) {
        return None;
    }

    if !uses_signaling_ports(pkt) {
        return None;
    }

    if pkt.payload.is_empty() {
        return None;
    }

    Some(&pkt.payload)
}
