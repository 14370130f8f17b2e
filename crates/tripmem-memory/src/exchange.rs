//! Bulk export and import of semantic memory
//!
//! The portable document is a JSON array of
//! `{ "id", "text", "metadata": { "user_id", "timestamp" } }` records in
//! insertion order. Embeddings are never serialized: import recomputes them
//! from the text with the store's own provider.

use crate::semantic::{SemanticMemoryStore, UpsertOutcome};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tripmem_core::{EntryId, Error, Result, Timestamp, UserId};

/// Metadata carried by an exported entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Owner of the entry
    pub user_id: String,

    /// Creation time, RFC 3339
    pub timestamp: String,
}

/// Portable form of a memory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: String,
    pub text: String,
    pub metadata: ExportMetadata,
}

/// A record that import could not apply
#[derive(Debug, Clone)]
pub struct SkippedRecord {
    /// Id as it appeared in the document
    pub id: String,

    /// Why the record was skipped
    pub reason: String,
}

/// Outcome of an import
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Records whose id was new to the store
    pub inserted: usize,

    /// Records that replaced an entry with the same id
    pub updated: usize,

    /// Records rejected individually
    pub skipped: Vec<SkippedRecord>,
}

impl ImportReport {
    /// Number of records applied
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Export/import over one semantic memory store
pub struct MemoryExchange {
    store: Arc<SemanticMemoryStore>,
}

impl MemoryExchange {
    /// Create an exchange for `store`
    pub fn new(store: Arc<SemanticMemoryStore>) -> Self {
        Self { store }
    }

    /// Snapshot every entry, all users, in insertion order
    pub fn export(&self) -> Result<Vec<ExportRecord>> {
        let records: Vec<ExportRecord> = self
            .store
            .snapshot()?
            .into_iter()
            .map(|entry| ExportRecord {
                text: entry.payload(),
                id: entry.id.into(),
                metadata: ExportMetadata {
                    user_id: entry.user_id.into(),
                    timestamp: entry.created_at.to_rfc3339(),
                },
            })
            .collect();

        info!("Exported {} memory entries", records.len());
        Ok(records)
    }

    /// Upsert every record, keyed by id
    ///
    /// Re-importing the same document replaces entries in place instead of
    /// duplicating them. Records that fail on their own (malformed id or
    /// timestamp, provider failure, dimension mismatch) are skipped and
    /// reported; a storage failure aborts the import.
    pub async fn import(&self, records: Vec<ExportRecord>) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        for record in records {
            let id = record.id.clone();
            match self.import_record(record).await {
                Ok(UpsertOutcome::Inserted) => report.inserted += 1,
                Ok(UpsertOutcome::Updated) => report.updated += 1,
                Err(e) if e.is_entry_level() => {
                    warn!("Skipping import record {}: {}", id, e);
                    report.skipped.push(SkippedRecord {
                        id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Imported {} memory entries ({} new, {} replaced, {} skipped)",
            report.applied(),
            report.inserted,
            report.updated,
            report.skipped.len()
        );
        Ok(report)
    }

    async fn import_record(&self, record: ExportRecord) -> Result<UpsertOutcome> {
        let id = EntryId::parse(&record.id)?;
        let user = UserId::parse(&record.metadata.user_id)?;
        let created_at = Timestamp::parse(&record.metadata.timestamp)?;

        debug!("Importing entry {} for user {}", id, user);
        self.store
            .upsert_imported(id, user, record.text, created_at)
            .await
    }

    /// Export the store to a JSON document at `path`
    pub fn export_to_file(&self, path: &Path) -> Result<usize> {
        let records = self.export()?;
        write_export(path, &records)?;
        Ok(records.len())
    }

    /// Import a JSON document from `path`
    pub async fn import_from_file(&self, path: &Path) -> Result<ImportReport> {
        let records = read_export(path)?;
        self.import(records).await
    }
}

/// Write records as pretty JSON, replacing `path` atomically
pub fn write_export(path: &Path, records: &[ExportRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .map_err(|e| Error::Serialization(format!("Failed to serialize export: {}", e)))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(&json)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;

    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Read an export document
pub fn read_export(path: &Path) -> Result<Vec<ExportRecord>> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        Error::Deserialization(format!("Invalid export document {}: {}", path.display(), e))
    })
}
