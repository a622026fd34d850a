//! Stash: single-slot-plus-history persistent store.
//!
//! Layout:
//! ```text
//! {location}/
//! ├── contents.json      # {"items": [ {metadata...}, ... ]}, oldest first
//! ├── <file>             # payload file per item, named by its "file" key
//! └── <sha1-hex>         # content-addressed when no explicit name was given
//! ```
//!
//! The manifest is the single source of truth for ordering; the last entry is
//! the most recently pushed item. Every mutating operation persists the
//! manifest before returning, so the manifest and the payload files stay
//! consistent across the fresh open/mutate/persist cycle each caller runs.

use std::fs;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::StashConfig;
use crate::item::{Item, ItemInfo};

/// The manifest file contents.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    items: Vec<ItemInfo>,
}

/// Status summary: item count plus a summary of the latest item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashStatus {
    pub items_count: usize,
    pub last: LastSummary,
}

/// Summary of the most recent item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSummary {
    pub bytes: u64,
    #[serde(rename = "content-type")]
    pub content_type: String,
}

/// A stash opened at a directory.
///
/// Single-writer contract: no file lock is held, callers must not mutate the
/// same directory from two processes at once.
#[derive(Debug)]
pub struct Stash {
    config: StashConfig,
    items: Vec<ItemInfo>,
}

impl Stash {
    /// Open the stash, creating the directory on first use and loading the
    /// manifest if one exists.
    pub fn open(config: StashConfig) -> Result<Self> {
        fs::create_dir_all(&config.location).with_context(|| {
            format!(
                "failed to create stash directory: {}",
                config.location.display()
            )
        })?;

        let manifest_path = config.manifest_path();
        let manifest = if manifest_path.exists() {
            let json = fs::read_to_string(&manifest_path)
                .with_context(|| format!("failed to read manifest: {}", manifest_path.display()))?;
            serde_json::from_str::<Manifest>(&json)
                .with_context(|| format!("failed to parse manifest: {}", manifest_path.display()))?
        } else {
            Manifest::default()
        };

        Ok(Self {
            config,
            items: manifest.items,
        })
    }

    /// Open a stash at a specific directory.
    pub fn at_path(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::open(StashConfig::with_location(path))
    }

    pub fn location(&self) -> &std::path::Path {
        &self.config.location
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn persist_manifest(&self) -> Result<()> {
        let manifest = Manifest {
            items: self.items.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")?;
        let path = self.config.manifest_path();
        fs::write(&path, json)
            .with_context(|| format!("failed to write manifest: {}", path.display()))?;
        Ok(())
    }

    /// Append an item: persist its payload file, then the updated manifest.
    pub fn push(&mut self, mut item: Item) -> Result<()> {
        item.ensure_filename(None);
        item.persist(&self.config.location)
            .context("failed to persist item payload")?;
        self.items.push(item.info);
        self.persist_manifest()
    }

    /// Remove and return the most recent item, deleting its payload file.
    /// An empty stash yields `Ok(None)`.
    pub fn pull(&mut self) -> Result<Option<Item>> {
        let Some(info) = self.items.pop() else {
            return Ok(None);
        };
        let item = Item::from_file(info, &self.config.location);
        item.delete_file(&self.config.location);
        self.persist_manifest()?;
        Ok(Some(item))
    }

    /// Return the most recent item without removing it.
    pub fn last(&self) -> Option<Item> {
        self.items
            .last()
            .map(|info| Item::from_file(info.clone(), &self.config.location))
    }

    /// Item count plus a summary of the latest item. An empty stash reports
    /// zero bytes and content type `"empty"`.
    pub fn status(&self) -> StashStatus {
        let last = match self.last() {
            Some(item) => LastSummary {
                bytes: item.byte_len(),
                content_type: item.info.content_type.clone(),
            },
            None => LastSummary {
                bytes: 0,
                content_type: "empty".to_string(),
            },
        };
        StashStatus {
            items_count: self.items.len(),
            last,
        }
    }

    /// Delete every payload file, reset the manifest to empty, persist.
    /// Idempotent.
    pub fn clear(&mut self) -> Result<()> {
        for info in self.items.drain(..) {
            Item::from_file(info, &self.config.location).delete_file(&self.config.location);
        }
        self.persist_manifest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemInfo;
    use tempfile::TempDir;

    fn text_item(text: &str) -> Item {
        Item::from_text(text, ItemInfo::new("text/plain"))
    }

    #[test]
    fn test_push_then_last_and_pull_ordering() -> Result<()> {
        let dir = TempDir::new()?;
        let mut stash = Stash::at_path(dir.path())?;

        stash.push(text_item("A"))?;
        stash.push(text_item("B"))?;
        stash.push(text_item("C"))?;

        assert_eq!(stash.last().unwrap().as_text().as_deref(), Some("C"));

        // Pull drains newest-first
        assert_eq!(stash.pull()?.unwrap().as_text().as_deref(), Some("C"));
        assert_eq!(stash.pull()?.unwrap().as_text().as_deref(), Some("B"));
        assert_eq!(stash.pull()?.unwrap().as_text().as_deref(), Some("A"));
        assert!(stash.pull()?.is_none());

        Ok(())
    }

    #[test]
    fn test_status_increments_per_push() -> Result<()> {
        let dir = TempDir::new()?;
        let mut stash = Stash::at_path(dir.path())?;

        for n in 1..=3 {
            stash.push(text_item("x"))?;
            assert_eq!(stash.status().items_count, n);
        }
        Ok(())
    }

    #[test]
    fn test_empty_status_shape() -> Result<()> {
        let dir = TempDir::new()?;
        let stash = Stash::at_path(dir.path())?;

        let status = stash.status();
        assert_eq!(status.items_count, 0);
        assert_eq!(status.last.bytes, 0);
        assert_eq!(status.last.content_type, "empty");

        // Wire shape uses the hyphenated key
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["last"]["content-type"], "empty");
        assert_eq!(json["items_count"], 0);
        Ok(())
    }

    #[test]
    fn test_status_reports_latest_item() -> Result<()> {
        let dir = TempDir::new()?;
        let mut stash = Stash::at_path(dir.path())?;
        stash.push(text_item("hello"))?;

        let status = stash.status();
        assert_eq!(status.items_count, 1);
        assert_eq!(status.last.bytes, 5);
        assert_eq!(status.last.content_type, "text/plain");
        Ok(())
    }

    #[test]
    fn test_pull_deletes_payload_file() -> Result<()> {
        let dir = TempDir::new()?;
        let mut stash = Stash::at_path(dir.path())?;
        stash.push(text_item("gone soon"))?;

        let file = stash.last().unwrap().info.file.unwrap();
        let path = dir.path().join(&file);
        assert!(path.exists());

        stash.pull()?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_clear_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let mut stash = Stash::at_path(dir.path())?;

        stash.push(text_item("one"))?;
        stash.push(text_item("two"))?;

        stash.clear()?;
        assert_eq!(stash.status().items_count, 0);

        // Clearing an already-empty stash is fine
        stash.clear()?;
        assert_eq!(stash.status().items_count, 0);

        // Only the manifest remains on disk
        let entries: Vec<_> = fs::read_dir(dir.path())?.collect();
        assert_eq!(entries.len(), 1);
        Ok(())
    }

    #[test]
    fn test_manifest_survives_reopen() -> Result<()> {
        let dir = TempDir::new()?;
        {
            let mut stash = Stash::at_path(dir.path())?;
            stash.push(text_item("persisted"))?;
        }

        let stash = Stash::at_path(dir.path())?;
        assert_eq!(stash.len(), 1);
        assert_eq!(stash.last().unwrap().as_text().as_deref(), Some("persisted"));
        Ok(())
    }

    #[test]
    fn test_manifest_layout() -> Result<()> {
        let dir = TempDir::new()?;
        let mut stash = Stash::at_path(dir.path())?;
        stash.push(text_item("layout"))?;

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("contents.json"))?)?;
        let items = json["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["content-type"], "text/plain");
        assert!(items[0]["file"].is_string());
        Ok(())
    }

    #[test]
    fn test_missing_payload_file_hydrates_metadata_only() -> Result<()> {
        let dir = TempDir::new()?;
        let mut stash = Stash::at_path(dir.path())?;
        stash.push(text_item("fragile"))?;

        // Someone removed the payload file behind our back
        let file = stash.last().unwrap().info.file.unwrap();
        fs::remove_file(dir.path().join(&file))?;

        let stash = Stash::at_path(dir.path())?;
        let item = stash.last().unwrap();
        assert!(!item.has_payload());
        assert_eq!(item.info.content_type, "text/plain");
        Ok(())
    }

    #[test]
    fn test_binary_round_trip_through_store() -> Result<()> {
        let dir = TempDir::new()?;
        let mut stash = Stash::at_path(dir.path())?;

        let payload = vec![0u8, 159, 146, 150];
        stash.push(Item::from_bytes(
            payload.clone(),
            ItemInfo::new("application/octet-stream"),
        ))?;

        let item = stash.pull()?.unwrap();
        assert_eq!(item.as_bytes(), Some(payload));
        assert!(stash.is_empty());
        Ok(())
    }
}
