//! Command implementations
//!
//! Each command returns the text to print so it can be tested without
//! capturing stdout.

use anyhow::{Context, Result};
use std::path::Path;
use tripmem_core::Timestamp;
use tripmem_memory::MemoryFacade;

/// Write every memory entry to a JSON document
pub fn export(facade: &MemoryFacade, path: &Path) -> Result<String> {
    let count = facade
        .exchange()
        .export_to_file(path)
        .with_context(|| format!("Failed to export to {}", path.display()))?;
    Ok(format!("Exported {} entries to {}", count, path.display()))
}

/// Upsert every record of a JSON document
pub async fn import(facade: &MemoryFacade, path: &Path) -> Result<String> {
    let report = facade
        .exchange()
        .import_from_file(path)
        .await
        .with_context(|| format!("Failed to import {}", path.display()))?;

    let mut lines = vec![format!(
        "Imported {} entries ({} new, {} replaced, {} skipped)",
        report.applied(),
        report.inserted,
        report.updated,
        report.skipped.len()
    )];
    for skipped in &report.skipped {
        lines.push(format!("  skipped {}: {}", skipped.id, skipped.reason));
    }
    Ok(lines.join("\n"))
}

/// Drop a user's memories, and with `erase` their preferences too
pub fn forget(facade: &MemoryFacade, user_id: &str, erase: bool) -> Result<String> {
    let removed = if erase {
        facade.forget_user_completely(user_id)?
    } else {
        facade.forget(user_id)?
    };

    Ok(if erase {
        format!("Removed {} memories and the preferences of {}", removed, user_id)
    } else {
        format!("Removed {} memories of {}", removed, user_id)
    })
}

/// Context block for a user and query
pub async fn context(
    facade: &MemoryFacade,
    user_id: &str,
    query: &str,
    top_k: Option<usize>,
    since: Option<&str>,
) -> Result<String> {
    let since = since
        .map(Timestamp::parse)
        .transpose()
        .context("Invalid --since timestamp")?;
    Ok(facade.build_context(user_id, query, top_k, since).await?)
}

/// A user's preferences as context lines
pub fn prefs(facade: &MemoryFacade, user_id: &str) -> Result<String> {
    Ok(facade.format_preferences(user_id))
}

/// Set one preference
pub fn set(facade: &MemoryFacade, user_id: &str, key: &str, value: &str) -> Result<String> {
    facade.update_preference(user_id, key, value)?;
    Ok(format!("Set {} for {}", key, user_id))
}

/// Record a memory
pub async fn remember(
    facade: &MemoryFacade,
    user_id: &str,
    text: &str,
    reply: Option<&str>,
) -> Result<String> {
    let id = facade.remember(user_id, text, reply).await?;
    Ok(format!("Stored {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tripmem_memory::MemoryConfig;

    fn create_test_facade(root: &Path) -> MemoryFacade {
        MemoryFacade::open(&MemoryConfig::for_testing(root)).unwrap()
    }

    #[tokio::test]
    async fn test_set_and_prefs() {
        let temp_dir = TempDir::new().unwrap();
        let facade = create_test_facade(temp_dir.path());

        set(&facade, "alice", "departure_city", "Madrid").unwrap();
        assert_eq!(prefs(&facade, "alice").unwrap(), "Departure city: Madrid");
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let temp_dir = TempDir::new().unwrap();
        let backup = temp_dir.path().join("backup.json");

        {
            let facade = create_test_facade(&temp_dir.path().join("source"));
            remember(&facade, "alice", "Trip to Porto", None).await.unwrap();
            assert_eq!(
                export(&facade, &backup).unwrap(),
                format!("Exported 1 entries to {}", backup.display())
            );
        }

        let facade = create_test_facade(&temp_dir.path().join("target"));
        let first = import(&facade, &backup).await.unwrap();
        assert!(first.starts_with("Imported 1 entries (1 new, 0 replaced, 0 skipped)"));
        let second = import(&facade, &backup).await.unwrap();
        assert!(second.starts_with("Imported 1 entries (0 new, 1 replaced, 0 skipped)"));
    }

    #[tokio::test]
    async fn test_context_and_forget() {
        let temp_dir = TempDir::new().unwrap();
        let facade = create_test_facade(temp_dir.path());
        set(&facade, "alice", "budget", "low").unwrap();
        remember(&facade, "alice", "Trip to Porto", Some("Loved it"))
            .await
            .unwrap();

        let block = context(&facade, "alice", "Porto", Some(1), None).await.unwrap();
        assert!(block.contains("Budget: low"));
        assert!(block.contains("- Trip to Porto\nLoved it"));

        assert!(context(&facade, "alice", "Porto", None, Some("last week"))
            .await
            .is_err());

        forget(&facade, "alice", true).unwrap();
        assert!(facade.preferences("alice").is_empty());
        assert_eq!(facade.memory_store().user_entry_count("alice").unwrap(), 0);
    }
}
