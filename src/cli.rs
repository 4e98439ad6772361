use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sipwatch::classify::{discover_external_ip, TargetClassifier};
use sipwatch::config::Config;
use sipwatch::enrich::{build_providers, Enricher, IpCache};
use sipwatch::pipeline::Pipeline;
use sipwatch::sink::EsSink;

#[derive(Parser)]
#[command(name = "sipwatch")]
#[command(author, version, about = "passive SIP honeypot traffic monitor")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture SIP signaling from a live interface
    Live {
        /// Interface to capture on (default: first available device)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Analyze a stored capture file
    Pcap {
        /// Path to the capture file
        file: PathBuf,

        /// Destination address to keep (default: configured target)
        #[arg(short, long)]
        target: Option<IpAddr>,
    },

    /// Look up intelligence for an IP through the cache
    Intel {
        /// IP address to investigate
        ip: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Live { interface } => {
            let pipeline = build_pipeline(&config, None).await?;
            let interface = interface.or_else(|| config.capture.interface.clone());
            pipeline
                .run_live(interface.as_deref(), &config.capture.bpf_filter)
                .await?;
        }

        Commands::Pcap { file, target } => {
            let target = target.or(config.capture.target_ip).context(
                "no target address: pass --target or set capture.target_ip in the config",
            )?;
            let pipeline = build_pipeline(&config, Some(target)).await?;
            pipeline.run_offline(&file, target).await?;
        }

        Commands::Intel { ip, json } => {
            let ip: IpAddr = ip.parse().context("invalid IP address")?;
            let enricher = build_enricher(&config)?;
            let result = enricher.lookup(&ip.to_string()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Intelligence for {}:", ip);
                for (provider, response) in &result {
                    if response.is_null() {
                        println!("  {}: unavailable", provider.red());
                    } else {
                        println!("  {}:", provider.green());
                        println!("{}", serde_json::to_string_pretty(response)?);
                    }
                }
            }
        }
    }

    Ok(())
}

fn build_enricher(config: &Config) -> Result<Arc<Enricher>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.enrich.timeout_secs))
        .user_agent(concat!("sipwatch/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let providers = build_providers(&config.enrich, &client);
    let cache = IpCache::load(&config.enrich.cache_path);

    Ok(Arc::new(Enricher::new(providers, cache)))
}

async fn build_pipeline(config: &Config, target: Option<IpAddr>) -> Result<Pipeline> {
    let enricher = build_enricher(config)?;

    let external = match config.capture.external_ip.or(target) {
        Some(ip) => ip,
        None => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.enrich.timeout_secs))
                .build()?;
            discover_external_ip(&client, &config.capture.discovery_url).await
        }
    };
    tracing::info!("monitoring external address {}", external);

    let classifier = TargetClassifier::new(external);
    let sink = Arc::new(EsSink::new(&config.sink)?);

    Ok(Pipeline::new(
        classifier,
        enricher,
        sink,
        config.sink.sip_index.clone(),
        config.sink.packet_index.clone(),
    ))
}
