//! Offline stream processing: destination filtering, SIP vs. generic
//! classification, and record shapes, driven with fakes end to end.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use sipwatch::classify::TargetClassifier;
use sipwatch::core::{CapturedPacket, TransportProtocol};
use sipwatch::enrich::{Enricher, IntelProvider, IpCache};
use sipwatch::pipeline::Pipeline;
use sipwatch::sink::RecordSink;

const TARGET: &str = "203.0.113.5";

struct CountingProvider {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl IntelProvider for CountingProvider {
    fn name(&self) -> &str {
        "geoip"
    }

    async fn query(&self, ip: &str) -> sipwatch::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"query": ip, "country": "DE"}))
    }
}

#[derive(Default)]
struct MemorySink {
    docs: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn emit(&self, index: &str, document: &Value) {
        self.docs.lock().push((index.to_string(), document.clone()));
    }
}

fn packet(dst: &str, dst_port: u16, payload: &[u8]) -> CapturedPacket {
    CapturedPacket::new(
        "198.51.100.7".parse().unwrap(),
        dst.parse().unwrap(),
        TransportProtocol::Udp,
        49152,
        dst_port,
        payload.to_vec(),
    )
}

fn build_pipeline(
    dir: &tempfile::TempDir,
    calls: Arc<AtomicUsize>,
) -> (Pipeline, Arc<MemorySink>) {
    let enricher = Arc::new(Enricher::new(
        vec![Box::new(CountingProvider { calls })],
        IpCache::load(dir.path().join("cache.json")),
    ));
    let sink = Arc::new(MemorySink::default());

    let pipeline = Pipeline::new(
        TargetClassifier::new(TARGET.parse().unwrap()),
        enricher,
        sink.clone(),
        "sip_data".to_string(),
        "pcap-data".to_string(),
    );

    (pipeline, sink)
}

#[tokio::test]
async fn test_offline_stream_filters_counts_and_classifies() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let (pipeline, sink) = build_pipeline(&dir, calls.clone());

    let (tx, rx) = mpsc::channel(8192);

    // 4999 SIP probes to the target
    for i in 0..4999u32 {
        let payload = format!("OPTIONS sip:100@{TARGET} SIP/2.0\r\nCSeq: {i} OPTIONS\r\n");
        tx.send(packet(TARGET, 5060, payload.as_bytes())).await.unwrap();
    }
    // One empty payload: qualifies for the count, produces nothing
    tx.send(packet(TARGET, 5060, b"")).await.unwrap();
    // One undecodable non-signaling payload: generic record with hex fallback
    tx.send(packet(TARGET, 8080, &[0xff, 0xfe, 0x00])).await.unwrap();
    // Packets for other destinations are not counted at all
    tx.send(packet("203.0.113.99", 5060, b"CSeq: 1 OPTIONS\r\n")).await.unwrap();
    tx.send(packet("8.8.8.8", 5060, b"CSeq: 2 OPTIONS\r\n")).await.unwrap();
    drop(tx);

    let target: IpAddr = TARGET.parse().unwrap();
    let processed = pipeline.process_offline_stream(rx, target).await;

    // 4999 SIP + 1 empty + 1 binary passed the destination filter, so the
    // single progress notification fired at packet 5000
    assert_eq!(processed, 5001);

    let docs = sink.docs.lock();
    let sip_docs: Vec<_> = docs.iter().filter(|(idx, _)| idx == "sip_data").collect();
    let pcap_docs: Vec<_> = docs.iter().filter(|(idx, _)| idx == "pcap-data").collect();

    // The empty payload produced no record of either kind
    assert_eq!(sip_docs.len(), 4999);
    assert_eq!(pcap_docs.len(), 1);

    // SIP records carry decoded headers plus the enrichment object
    let (_, sip) = sip_docs[0];
    assert_eq!(sip["CSeq"], "0 OPTIONS");
    assert_eq!(sip["Source_IP"], "198.51.100.7");
    assert_eq!(sip["Source_IP_Details"]["geoip"]["country"], "DE");
    assert!(sip["Timestamp"].is_string());

    // The generic record fell back to hex with the explicit marker
    let (_, analyzed) = pcap_docs[0];
    assert_eq!(analyzed["hexadecimalString"], "fffe00");
    assert!(analyzed["decodingError"].is_string());
    assert!(analyzed.get("decodedString").is_none());
    assert_eq!(analyzed["srcIPDetails"]["geoip"]["country"], "DE");

    // One source address, one external lookup across all 5000 records
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_payload_triggers_no_enrichment() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let (pipeline, sink) = build_pipeline(&dir, calls.clone());

    let (tx, rx) = mpsc::channel(8);
    tx.send(packet(TARGET, 5060, b"")).await.unwrap();
    drop(tx);

    let processed = pipeline
        .process_offline_stream(rx, TARGET.parse().unwrap())
        .await;

    assert_eq!(processed, 1);
    assert!(sink.docs.lock().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
