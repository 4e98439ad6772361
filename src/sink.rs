//! Record sink
//!
//! Appends enriched records to the document store through a single
//! "index one document" call. The sink never fails its caller: any error is
//! logged together with the full record payload, so the pipeline's forward
//! progress is independent of the store being reachable.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::SinkConfig;
use crate::error::{PipelineError, Result};

/// Destination for structured records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Index one document. Failures are logged, never raised.
    async fn emit(&self, index: &str, document: &Value);
}

/// Document-store sink speaking the single-document index API
pub struct EsSink {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    enabled: bool,
}

impl EsSink {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("sipwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            enabled: config.enabled,
        })
    }

    async fn index_document(&self, index: &str, document: &Value) -> Result<()> {
        let url = format!("{}/{}/_doc", self.base_url, index);

        let mut req = self.client.post(&url).json(document);
        if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_deref());
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(PipelineError::Sink(format!(
                "{} returned {}",
                url,
                resp.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl RecordSink for EsSink {
    async fn emit(&self, index: &str, document: &Value) {
        if !self.enabled {
            debug!("sink disabled, dropping record for index {}", index);
            return;
        }

        if let Err(e) = self.index_document(index, document).await {
            // Log the full record so the enrichment work is not lost
            error!("failed to index record into {}: {} record={}", index, e, document);
        }
    }
}
