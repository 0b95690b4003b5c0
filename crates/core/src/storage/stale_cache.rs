use crate::domain::quote::{Snapshot, Symbol};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub type CacheRecord = BTreeMap<Symbol, f64>;

#[derive(Debug)]
pub enum CacheError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Malformed(serde_json::Error),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cache io error at {}: {source}", path.display()),
            Self::Malformed(e) => write!(f, "cache file is malformed: {e}"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Last known-good value per symbol, persisted as a JSON object between runs.
#[derive(Debug, Clone)]
pub struct StaleValueCache {
    path: PathBuf,
}

impl StaleValueCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state is treated as an empty history.
    pub async fn load(&self) -> CacheRecord {
        match self.try_load().await {
            Ok(Some(record)) => {
                tracing::info!(path = %self.path.display(), entries = record.len(), "loaded quote cache");
                record
            }
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "no quote cache yet");
                CacheRecord::new()
            }
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable quote cache");
                CacheRecord::new()
            }
        }
    }

    pub async fn try_load(&self) -> Result<Option<CacheRecord>, CacheError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let record = serde_json::from_slice::<CacheRecord>(&bytes).map_err(CacheError::Malformed)?;
        Ok(Some(record))
    }

    /// Replaces the stored record with `record` (write to a sibling temp file, then rename).
    pub async fn save(&self, record: &CacheRecord) -> Result<(), CacheError> {
        let finite: CacheRecord = record
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let json = serde_json::to_vec_pretty(&finite).map_err(CacheError::Malformed)?;

        let io_err = |source: std::io::Error| CacheError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), entries = finite.len(), "saved quote cache");
        Ok(())
    }
}

/// Record to persist after a cycle: this cycle's live values, plus the previous value of
/// each configured symbol that fell back (carried forward untouched). Symbols no longer
/// configured are dropped.
pub fn next_record(previous: &CacheRecord, snapshot: &Snapshot) -> CacheRecord {
    let mut out: CacheRecord = snapshot
        .live_values()
        .map(|(symbol, value)| (symbol.clone(), value))
        .collect();

    for quote in snapshot.quotes().iter().filter(|q| q.is_fallback) {
        if let Some(prev) = previous.get(&quote.symbol) {
            out.insert(quote.symbol.clone(), *prev);
        }
    }
    out
}
