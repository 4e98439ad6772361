//! Capture pipeline
//!
//! Drives packets from a live interface or a stored capture file through
//! extraction, parsing, enrichment and sinking. Capture runs on a dedicated
//! thread feeding a bounded channel; processing happens on the async side.
//! A failure on one packet is logged and the stream continues; only a
//! capture-source open failure aborts a run.

use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use pcap::{Capture, Device};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::analyze::AnalyzedRecord;
use crate::classify::TargetClassifier;
use crate::core::{parse_frame, CapturedPacket};
use crate::enrich::Enricher;
use crate::error::{PipelineError, Result};
use crate::extract;
use crate::sink::RecordSink;
use crate::sip::SipParser;

/// Offline progress notification interval, in qualifying packets
const PROGRESS_INTERVAL: u64 = 5000;

/// Capacity of the capture-thread → processing-loop channel
const CHANNEL_CAPACITY: usize = 1024;

pub struct Pipeline {
    classifier: TargetClassifier,
    parser: SipParser,
    enricher: Arc<Enricher>,
    sink: Arc<dyn RecordSink>,
    sip_index: String,
    packet_index: String,
}

impl Pipeline {
    pub fn new(
        classifier: TargetClassifier,
        enricher: Arc<Enricher>,
        sink: Arc<dyn RecordSink>,
        sip_index: String,
        packet_index: String,
    ) -> Self {
        Self {
            classifier,
            parser: SipParser::new(),
            enricher,
            sink,
            sip_index,
            packet_index,
        }
    }

    /// Live capture: process signaling packets until interrupted, then stop
    /// the capture thread and drain what it already handed off.
    pub async fn run_live(&self, interface: Option<&str>, bpf_filter: &str) -> Result<()> {
        let device = match interface {
            Some(name) => Device::list()?
                .into_iter()
                .find(|d| d.name == name)
                .ok_or(PipelineError::NoDevice)?,
            None => Device::lookup()?.ok_or(PipelineError::NoDevice)?,
        };
        info!("starting live capture on {} ({})", device.name, bpf_filter);

        let mut cap = Capture::from_device(device)?
            .promisc(true)
            .snaplen(65535)
            .timeout(100)
            .open()?;
        cap.filter(bpf_filter, true)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = spawn_capture_thread(cap, tx, stop.clone());

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, stopping capture");
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
                pkt = rx.recv() => match pkt {
                    Some(pkt) => self.handle_signaling_packet(&pkt).await,
                    None => break,
                }
            }
        }

        // In-flight packets are finished before exit
        while let Some(pkt) = rx.recv().await {
            self.handle_signaling_packet(&pkt).await;
        }

        if handle.join().is_err() {
            error!("capture thread panicked");
        }
        info!("live capture stopped");
        Ok(())
    }

    /// Offline analysis of a stored capture file: keep packets aimed at the
    /// target, index a record per packet, report progress periodically.
    pub async fn run_offline(&self, path: &Path, target: IpAddr) -> Result<()> {
        let cap = Capture::from_file(path)?;
        info!("processing capture file {} for {}", path.display(), target);

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = spawn_capture_thread(cap, tx, stop);

        let processed = self.process_offline_stream(rx, target).await;

        if handle.join().is_err() {
            error!("capture thread panicked");
        }
        info!("finished capture file: {} qualifying packets", processed);
        Ok(())
    }

    /// Drain a packet stream in offline mode. Returns the number of packets
    /// that passed the destination filter.
    pub async fn process_offline_stream(
        &self,
        mut rx: mpsc::Receiver<CapturedPacket>,
        target: IpAddr,
    ) -> u64 {
        let mut processed = 0u64;

        while let Some(pkt) = rx.recv().await {
            if pkt.dst_ip != target {
                continue;
            }
            processed += 1;

            self.handle_capture_packet(&pkt).await;

            if processed % PROGRESS_INTERVAL == 0 {
                info!("processed {} packets", processed);
            }
        }

        processed
    }

    /// Live path: relevance gate, signaling ports, SIP parse.
    async fn handle_signaling_packet(&self, pkt: &CapturedPacket) {
        let Some(payload) = extract::extract(pkt, &self.classifier) else {
            return;
        };

        let mut record = self
            .parser
            .parse(payload, pkt.src_ip, pkt.dst_ip, pkt.timestamp);

        let Some(intel) = self.enrich_source(pkt.src_ip).await else {
            return;
        };
        record.set_enrichment(intel);

        self.sink_record(&self.sip_index, &record, pkt.src_ip).await;
    }

    /// Offline path: SIP on the signaling ports, generic analysis otherwise.
    /// The destination filter has already matched.
    async fn handle_capture_packet(&self, pkt: &CapturedPacket) {
        if pkt.payload.is_empty() {
            return;
        }

        if extract::uses_signaling_ports(pkt) {
            let mut record = self
                .parser
                .parse(&pkt.payload, pkt.src_ip, pkt.dst_ip, pkt.timestamp);

            let Some(intel) = self.enrich_source(pkt.src_ip).await else {
                return;
            };
            record.set_enrichment(intel);

            self.sink_record(&self.sip_index, &record, pkt.src_ip).await;
        } else {
            let mut record = AnalyzedRecord::from_packet(pkt);

            let Some(intel) = self.enrich_source(pkt.src_ip).await else {
                return;
            };
            record.set_enrichment(intel);

            self.sink_record(&self.packet_index, &record, pkt.src_ip)
                .await;
        }
    }

    async fn enrich_source(&self, src_ip: IpAddr) -> Option<Value> {
        match self.enricher.lookup(&src_ip.to_string()).await {
            Ok(intel) => Some(Value::Object(intel)),
            Err(e) => {
                warn!("enrichment failed for {}: {}", src_ip, e);
                None
            }
        }
    }

    async fn sink_record<T: Serialize>(&self, index: &str, record: &T, src_ip: IpAddr) {
        match serde_json::to_value(record) {
            Ok(doc) => self.sink.emit(index, &doc).await,
            Err(e) => warn!("failed to serialize record from {}: {}", src_ip, e),
        }
    }
}

/// Read frames on a dedicated thread and hand decoded packets to the
/// processing loop. Stops on the flag, end-of-file, or a closed channel.
fn spawn_capture_thread<T>(
    mut cap: Capture<T>,
    tx: mpsc::Sender<CapturedPacket>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    T: pcap::Activated + Send + 'static,
{
    std::thread::spawn(move || loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        match cap.next_packet() {
            Ok(frame) => {
                let ts = capture_timestamp(frame.header.ts.tv_sec as i64, frame.header.ts.tv_usec as i64);
                if let Some(pkt) = parse_frame(frame.data, ts) {
                    if tx.blocking_send(pkt).is_err() {
                        break;
                    }
                }
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                warn!("capture read error: {}", e);
                continue;
            }
        }
    })
}

fn capture_timestamp(sec: i64, usec: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(sec, (usec * 1000) as u32).unwrap_or_else(Utc::now)
}
