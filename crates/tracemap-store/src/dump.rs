//! JSONL dumps of exported link records
//!
//! One JSON object per line, tagged by `kind`:
//!
//! ```text
//! {"kind":"caller","source":{...},"destination":{...},"timestamp":1200,"elapsed":50}
//! {"kind":"callee","source":{...},"destination":{...},"timestamp":1201,"elapsed":45}
//! {"kind":"accept","host":"10.0.0.5","caller":{...},"resolved":{...}}
//! ```
//!
//! Blank lines and `#` comments are skipped.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracemap_core::{Application, RawLinkRecord, StoreError, StoreResult};
use tracing::{debug, info};

/// One line of a dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DumpEntry {
    /// Observed by the source application's agent
    Caller(RawLinkRecord),

    /// Observed by the destination application's agent
    Callee(RawLinkRecord),

    /// `resolved` accepted calls from `caller` on `host`
    Accept {
        host: String,
        caller: Application,
        resolved: Application,
    },
}

/// Load every entry of a dump file
pub async fn load_dump(path: impl AsRef<Path>) -> StoreResult<Vec<DumpEntry>> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await?;
    let entries = load_from_reader(BufReader::new(file)).await?;
    info!("Loaded {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Parse dump lines from any buffered reader. Line numbers start at 1.
pub async fn load_from_reader<R>(reader: R) -> StoreResult<Vec<DumpEntry>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut entries = Vec::new();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let entry = serde_json::from_str(line).map_err(|source| StoreError::Parse {
            line: line_number,
            source,
        })?;
        entries.push(entry);
    }

    debug!("parsed {} dump lines", line_number);
    Ok(entries)
}
