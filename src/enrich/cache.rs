//! Persistent enrichment cache
//!
//! Maps an IP address to previously retrieved intelligence so external
//! lookups are paid at most once per address. The whole mapping lives in a
//! single JSON file, loaded at startup and rewritten atomically after each
//! new entry.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Composed enrichment for one address: provider name → raw response, with
/// `null` as the explicit marker for a provider that was unavailable
pub type EnrichmentResult = Map<String, Value>;

/// Durable IP → enrichment mapping
#[derive(Debug)]
pub struct IpCache {
    path: PathBuf,
    entries: HashMap<String, EnrichmentResult>,
}

impl IpCache {
    /// Load the cache file, starting empty when it is absent or unreadable
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();

        let entries = match File::open(&path) {
            Ok(file) => match serde_json::from_reader(BufReader::new(file)) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        "cache file {} is unreadable ({}), starting empty",
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(_) => {
                debug!("no cache file at {}, starting empty", path.display());
                HashMap::new()
            }
        };

        if !entries.is_empty() {
            info!(
                "loaded {} cached enrichments from {}",
                entries.len(),
                path.display()
            );
        }

        Self { path, entries }
    }

    pub fn get(&self, ip: &str) -> Option<&EnrichmentResult> {
        self.entries.get(ip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry and persist the cache before returning.
    ///
    /// On a failed write the entry is evicted again, so a later lookup
    /// retries the external queries instead of silently losing the
    /// enrichment across a restart.
    pub fn insert_durable(&mut self, ip: &str, result: EnrichmentResult) -> Result<()> {
        self.entries.insert(ip.to_string(), result);

        if let Err(e) = self.persist() {
            self.entries.remove(ip);
            return Err(PipelineError::CacheWrite(e.to_string()));
        }

        Ok(())
    }

    /// Write the full mapping to a temp file and rename it over the cache
    /// path, so a crash mid-write can never truncate the previous file.
    fn persist(&self) -> std::io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, &self.entries).map_err(std::io::Error::other)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }
}
