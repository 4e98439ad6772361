//! Raw frame decoding
//!
//! Decodes captured ethernet frames into `CapturedPacket`s using etherparse.
//! Only IPv4/IPv6 over TCP or UDP is of interest here; anything else (ARP,
//! ICMP, unparseable frames) is skipped by returning `None`.

use chrono::{DateTime, Utc};
use etherparse::SlicedPacket;
use std::net::IpAddr;

use super::packet::{CapturedPacket, TransportProtocol};

/// Decode one ethernet frame into a `CapturedPacket`.
///
/// Returns `None` for frames that are not IP/TCP or IP/UDP.
pub fn parse_frame(data: &[u8], timestamp: DateTime<Utc>) -> Option<CapturedPacket> {
    let sliced = SlicedPacket::from_ethernet(data).ok()?;

    let (src_ip, dst_ip) = match &sliced.net {
        Some(etherparse::NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            (
                IpAddr::from(header.source_addr()),
                IpAddr::from(header.destination_addr()),
            )
        }
        Some(etherparse::NetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            (
                IpAddr::from(header.source_addr()),
                IpAddr::from(header.destination_addr()),
            )
        }
        _ => return None,
    };

    let (transport, src_port, dst_port, payload) = match &sliced.transport {
        Some(etherparse::TransportSlice::Udp(udp)) => (
            TransportProtocol::Udp,
            udp.source_port(),
            udp.destination_port(),
            udp.payload().to_vec(),
        ),
        Some(etherparse::TransportSlice::Tcp(tcp)) => (
            TransportProtocol::Tcp,
            tcp.source_port(),
            tcp.destination_port(),
            tcp.payload().to_vec(),
        ),
        _ => return None,
    };

    Some(CapturedPacket {
        src_ip,
        dst_ip,
        transport,
        src_port,
        dst_port,
        payload,
        timestamp,
    })
}
