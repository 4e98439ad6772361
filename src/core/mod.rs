//! Packet representation and frame decoding

pub mod packet;
pub mod parser;

pub use packet::{CapturedPacket, TransportProtocol};
pub use parser::parse_frame;
