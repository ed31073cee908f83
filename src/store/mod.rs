mod sanitize;

pub use sanitize::safe_name;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::StoreConfig;
use crate::registry::DeviceRegistry;
use crate::util::fs::safe_write_all;

/// Errors that can occur on local log operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("unknown device id: {0}")]
    UnknownDevice(String),
}

/// Size and last-modified metadata for one device's log file.
#[derive(Clone, Debug, Serialize)]
pub struct LogFileInfo {
    pub device: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Tail-read line counts are clamped into this range.
const TAIL_MIN_LINES: usize = 1;
const TAIL_MAX_LINES: usize = 10_000;

/// Placeholder returned when tailing a device that has no log file yet.
const EMPTY_PLACEHOLDER: &str = "(empty)\n";

/// Append-only per-device log files with size-bounded trimming.
///
/// Files live under a single configured directory, one `<name>.log` per
/// logical device, where `name` is passed through [`safe_name`] for every
/// path construction.
pub struct LogStore {
    dir: PathBuf,
    max_bytes: u64,
    trim_tail_lines: usize,
    registry: Arc<DeviceRegistry>,
    /// Per-device guards serializing append+trim and clear. The trim
    /// rewrite is a read-modify-write over the whole file and must not
    /// interleave with another writer on the same path. Tail and list
    /// stay lock-free; the trim replaces the file atomically.
    guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LogStore {
    pub fn new(config: StoreConfig, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            dir: config.dir,
            max_bytes: config.max_bytes,
            trim_tail_lines: config.trim_tail_lines,
            registry,
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Appends the non-empty lines to the device's log file, each
    /// formatted with a timestamp and the sanitized device name.
    ///
    /// Appending zero non-empty lines is a no-op, not an error. When the
    /// write pushes the file past the size threshold, it is trimmed to
    /// its most recent lines before returning.
    pub async fn append(&self, name: &str, lines: &[String]) -> Result<(), StoreError> {
        let now = Utc::now();
        let safe = safe_name(name);
        let formatted: Vec<String> = lines
            .iter()
            .filter_map(|line| format_line(&safe, now, line))
            .collect();
        if formatted.is_empty() {
            return Ok(());
        }

        let guard = self.guard_for(&safe);
        let _locked = guard.lock().await;

        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{safe}.log"));

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut buf = formatted.join("\n");
        buf.push('\n');
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        self.trim_if_needed(&path).await?;
        Ok(())
    }

    /// Resolves a cloud device id to its logical name, then appends.
    pub async fn append_by_device_id(
        &self,
        device_id: &str,
        lines: &[String],
    ) -> Result<(), StoreError> {
        let device_id = device_id.trim();
        let name = self
            .registry
            .id_to_name(device_id)
            .await
            .ok_or_else(|| StoreError::UnknownDevice(device_id.to_string()))?;
        self.append(&name, lines).await
    }

    /// Returns up to `max_lines` most recent non-empty lines with a
    /// trailing newline, or a placeholder when the file does not exist.
    /// `max_lines` is clamped to `1..=10000`.
    pub async fn tail(&self, name: &str, max_lines: usize) -> Result<String, StoreError> {
        let n = max_lines.clamp(TAIL_MIN_LINES, TAIL_MAX_LINES);
        let path = self.path_for(name);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(EMPTY_PLACEHOLDER.to_string())
            }
            Err(err) => return Err(err.into()),
        };

        let lines: Vec<&str> = content.lines().filter(|line| !line.is_empty()).collect();
        let start = lines.len().saturating_sub(n);
        let mut out = lines[start..].join("\n");
        out.push('\n');
        Ok(out)
    }

    /// Truncates the device's log file to empty without deleting it.
    pub async fn clear(&self, name: &str) -> Result<(), StoreError> {
        let safe = safe_name(name);
        let guard = self.guard_for(&safe);
        let _locked = guard.lock().await;

        fs::create_dir_all(&self.dir).await?;
        fs::write(self.dir.join(format!("{safe}.log")), b"").await?;
        Ok(())
    }

    /// Metadata for every log file, sorted most recently modified first.
    pub async fn list(&self) -> Result<Vec<LogFileInfo>, StoreError> {
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            let Some(device) = file_name.to_str().and_then(|f| f.strip_suffix(".log")) else {
                continue;
            };
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            entries.push(LogFileInfo {
                device: device.to_string(),
                size_bytes: meta.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(entries)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.log", safe_name(name)))
    }

    fn guard_for(&self, safe: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guards = match self.guards.lock() {
            Ok(guards) => guards,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(guards.entry(safe.to_string()).or_default())
    }

    async fn trim_if_needed(&self, path: &Path) -> Result<(), io::Error> {
        let meta = fs::metadata(path).await?;
        if meta.len() <= self.max_bytes {
            return Ok(());
        }

        let content = fs::read_to_string(path).await?;
        let lines: Vec<&str> = content.lines().collect();
        let keep_from = lines.len().saturating_sub(self.trim_tail_lines);
        let mut tail = lines[keep_from..].join("\n");
        tail.push('\n');

        debug!(
            path = %path.display(),
            dropped = keep_from,
            "trimming log file"
        );
        safe_write_all(path, tail).await
    }
}

fn format_line(safe: &str, now: DateTime<Utc>, line: &str) -> Option<String> {
    let msg = line.trim();
    if msg.is_empty() {
        return None;
    }
    let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let clock = now.format("%H:%M:%S");
    Some(format!("{stamp} [{clock}] {safe} {msg}"))
}
