//! Snapshot persistence for the session table.

use crate::manager::SessionTable;
use crate::record::SessionRecord;
use crate::Result;
use qqbot_core::Scope;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Reads and writes one bot's snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize a table the way it is written to disk.
    pub fn encode(table: &SessionTable) -> Result<String> {
        Ok(serde_json::to_string(table)?)
    }

    /// Overwrite the snapshot with `json` (write temp, then rename).
    pub async fn write(&self, json: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, json).await?;
        fs::rename(&temp, &self.path).await?;

        debug!("Committed session snapshot to {:?}", self.path);
        Ok(())
    }

    /// Read the snapshot, skipping any record that fails to decode.
    ///
    /// Returns `None` when no snapshot exists yet.
    pub async fn read(&self) -> Result<Option<SessionTable>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let root: Value = serde_json::from_str(&content)?;
        Ok(Some(decode_lenient(root)))
    }
}

/// Decode a snapshot value record by record.
pub(crate) fn decode_lenient(root: Value) -> SessionTable {
    let mut table = SessionTable::new();

    let Value::Object(scopes) = root else {
        warn!("Session snapshot is not an object, ignoring it");
        return table;
    };

    for (scope_name, buckets) in scopes {
        let scope: Scope = match serde_json::from_value(Value::String(scope_name.clone())) {
            Ok(scope) => scope,
            Err(_) => {
                warn!("Skipping unknown session scope {:?}", scope_name);
                continue;
            }
        };
        let Value::Object(buckets) = buckets else {
            warn!("Skipping malformed scope {}", scope);
            continue;
        };

        for (identity, records) in buckets {
            let Value::Object(records) = records else {
                warn!("Skipping malformed identity bucket {}/{}", scope, identity);
                continue;
            };

            for (key, value) in records {
                match serde_json::from_value::<SessionRecord>(value) {
                    Ok(record) => {
                        table
                            .entry(scope)
                            .or_default()
                            .entry(identity.clone())
                            .or_default()
                            .insert(key, record);
                    }
                    Err(e) => warn!("Skipping session {}/{}/{}: {}", scope, identity, key, e),
                }
            }
        }
    }

    table
}
