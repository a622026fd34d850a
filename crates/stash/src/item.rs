//! Item: one unit of stashed content plus its metadata.
//!
//! An item carries a typed metadata record (content type, optional bare
//! filename, an open extension map) and at most one payload representation:
//! raw bytes or decoded text. Items serialize their metadata into the stash
//! manifest and their payload into a sibling file named by the `file` key;
//! when no explicit name was given the name is derived from the payload's
//! SHA-1 digest, so unnamed content is content-addressed.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from item persistence.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("item has no filename; call ensure_filename before persisting")]
    NoFilename,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Metadata for one item. Keys are always stored lower-case; the two
/// well-known keys get typed fields, anything else lands in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    /// MIME type, optionally with a `charset` parameter.
    #[serde(rename = "content-type", default)]
    pub content_type: String,

    /// Bare filename of the payload file inside the stash directory. No path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Open extension map for forward-compatible properties.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ItemInfo {
    /// Create metadata with the given content type.
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            file: None,
            extra: BTreeMap::new(),
        }
    }

    /// Builder-style filename.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Set a metadata key. The key is lower-cased; the well-known keys are
    /// routed to their typed fields.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let key = key.to_lowercase();
        match key.as_str() {
            "content-type" => self.content_type = value.into(),
            "file" => self.file = Some(value.into()),
            _ => {
                self.extra.insert(key, value.into());
            }
        }
    }

    /// Primary MIME type, without parameters, lower-cased.
    pub fn mime_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }

    /// Resolve the text encoding for this content type.
    ///
    /// Explicit `charset` parameter wins; else `utf-8` for `text/*`; else
    /// `utf-8` for types ending in `xml` or `json`; else none, and only byte
    /// access is valid. Only UTF-8-compatible charsets are decodable here.
    pub fn resolved_charset(&self) -> Option<&'static str> {
        if self.content_type.is_empty() {
            warn!("item has no content-type; cannot resolve an encoding");
            return None;
        }

        for param in self.content_type.split(';').skip(1) {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case("charset") {
                    let charset = value.trim().trim_matches('"').to_ascii_lowercase();
                    return match charset.as_str() {
                        "utf-8" | "utf8" | "us-ascii" | "ascii" => Some("utf-8"),
                        other => {
                            debug!(charset = other, "unsupported charset, byte access only");
                            None
                        }
                    };
                }
            }
        }

        let mime = self.mime_type();
        if mime.starts_with("text/") || mime.ends_with("xml") || mime.ends_with("json") {
            Some("utf-8")
        } else {
            None
        }
    }
}

/// Payload of an item: raw bytes or decoded text, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// No payload at all (metadata-only item).
    Empty,
    /// Raw bytes.
    Data(Vec<u8>),
    /// Decoded text.
    Text(String),
}

/// One piece of stashed content plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub info: ItemInfo,
    payload: Payload,
}

impl Item {
    /// Construct from raw bytes.
    pub fn from_bytes(data: Vec<u8>, info: ItemInfo) -> Self {
        Self {
            info,
            payload: Payload::Data(data),
        }
    }

    /// Construct from text.
    pub fn from_text(text: impl Into<String>, info: ItemInfo) -> Self {
        Self {
            info,
            payload: Payload::Text(text.into()),
        }
    }

    /// Construct by reading a stream to the end.
    pub fn from_reader(info: ItemInfo, reader: &mut impl Read) -> io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::from_bytes(data, info))
    }

    /// Hydrate from a manifest entry and its payload file in `location`.
    ///
    /// A missing filename or a missing payload file yields a metadata-only
    /// item, not an error.
    pub fn from_file(info: ItemInfo, location: &Path) -> Self {
        let payload = match info.file.as_deref() {
            Some(file) => {
                let path = location.join(file);
                match std::fs::read(&path) {
                    Ok(data) => Payload::Data(data),
                    Err(e) => {
                        warn!(file, error = %e, "payload file unreadable, item is metadata-only");
                        Payload::Empty
                    }
                }
            }
            None => {
                warn!("manifest entry has no filename, item is metadata-only");
                Payload::Empty
            }
        };
        Self { info, payload }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn has_payload(&self) -> bool {
        !matches!(self.payload, Payload::Empty)
    }

    /// Payload as bytes: direct for a byte payload, encoded per the resolved
    /// charset for a text payload. `None` when there is no payload or no
    /// resolvable encoding.
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match &self.payload {
            Payload::Empty => None,
            Payload::Data(data) => Some(data.clone()),
            Payload::Text(text) => self
                .info
                .resolved_charset()
                .map(|_| text.as_bytes().to_vec()),
        }
    }

    /// Payload as text: direct for a text payload, decoded per the resolved
    /// charset for a byte payload. `None` when decoding is not possible.
    pub fn as_text(&self) -> Option<String> {
        match &self.payload {
            Payload::Empty => None,
            Payload::Text(text) => Some(text.clone()),
            Payload::Data(data) => {
                self.info.resolved_charset()?;
                String::from_utf8(data.clone()).ok()
            }
        }
    }

    /// Payload size in bytes.
    pub fn byte_len(&self) -> u64 {
        match &self.payload {
            Payload::Empty => 0,
            Payload::Data(data) => data.len() as u64,
            Payload::Text(text) => text.len() as u64,
        }
    }

    /// Set the `file` metadata key: the explicit name when given, else the
    /// lowercase hex SHA-1 digest of the payload bytes. Stable across calls.
    pub fn ensure_filename(&mut self, explicit: Option<&str>) {
        if let Some(name) = explicit {
            self.info.file = Some(name.to_string());
            return;
        }
        if self.info.file.is_some() {
            return;
        }
        match self.as_bytes() {
            Some(bytes) => {
                self.info.file = Some(hex::encode(Sha1::digest(&bytes)));
            }
            None => {
                warn!("item has no payload to hash and no explicit name, leaving filename unset");
            }
        }
    }

    /// Write the payload to `location/<file>`.
    pub fn persist(&self, location: &Path) -> Result<(), ItemError> {
        let file = self.info.file.as_deref().ok_or(ItemError::NoFilename)?;
        let path = location.join(file);
        match &self.payload {
            Payload::Data(data) => std::fs::write(&path, data)?,
            Payload::Text(text) => std::fs::write(&path, text)?,
            Payload::Empty => std::fs::write(&path, [])?,
        }
        Ok(())
    }

    /// Remove the backing payload file if it exists. Silent no-op otherwise.
    pub fn delete_file(&self, location: &Path) {
        if let Some(file) = self.info.file.as_deref() {
            let path = location.join(file);
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(file, error = %e, "failed to remove payload file");
                }
            }
        }
    }

    /// Write the payload to a sink: raw bytes in binary mode, decoded text
    /// otherwise. When text is requested but undecodable, writes a
    /// human-readable summary instead. No-op without a payload.
    pub fn write_to(&self, sink: &mut impl Write, binary: bool) -> io::Result<()> {
        if !self.has_payload() {
            return Ok(());
        }
        if binary {
            if let Some(bytes) = self.as_bytes() {
                sink.write_all(&bytes)?;
            }
            return Ok(());
        }
        match self.as_text() {
            Some(text) => sink.write_all(text.as_bytes()),
            None => write!(
                sink,
                "{} bytes of type {}",
                self.byte_len(),
                self.info.content_type
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_info_keys_are_lowercased() {
        let mut info = ItemInfo::new("text/plain");
        info.set("Content-Type", "text/html");
        info.set("FILE", "page.html");
        info.set("X-Origin", "laptop");

        assert_eq!(info.content_type, "text/html");
        assert_eq!(info.file.as_deref(), Some("page.html"));
        assert_eq!(info.extra.get("x-origin").map(String::as_str), Some("laptop"));
    }

    #[test]
    fn test_charset_resolution_chain() {
        // Explicit charset wins
        let info = ItemInfo::new("application/octet-stream; charset=utf-8");
        assert_eq!(info.resolved_charset(), Some("utf-8"));

        // Unsupported explicit charset means byte access only
        let info = ItemInfo::new("text/plain; charset=latin-1");
        assert_eq!(info.resolved_charset(), None);

        // text/* defaults to utf-8
        assert_eq!(ItemInfo::new("text/plain").resolved_charset(), Some("utf-8"));

        // xml/json subtypes default to utf-8
        assert_eq!(
            ItemInfo::new("application/json").resolved_charset(),
            Some("utf-8")
        );
        assert_eq!(
            ItemInfo::new("image/svg+xml").resolved_charset(),
            Some("utf-8")
        );

        // Everything else has no encoding
        assert_eq!(ItemInfo::new("image/png").resolved_charset(), None);
    }

    #[test]
    fn test_as_text_degrades_without_raising() {
        // Binary payload with no resolvable encoding: text access yields the
        // unavailable sentinel, never a panic.
        let item = Item::from_bytes(
            vec![0xde, 0xad, 0xbe, 0xef],
            ItemInfo::new("application/octet-stream"),
        );
        assert_eq!(item.as_text(), None);
        assert_eq!(item.as_bytes(), Some(vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn test_from_reader() {
        let mut source: &[u8] = b"streamed content";
        let item = Item::from_reader(ItemInfo::new("text/plain"), &mut source).unwrap();
        assert_eq!(item.as_text().as_deref(), Some("streamed content"));
    }

    #[test]
    fn test_text_round_trip() {
        let item = Item::from_text("héllo", ItemInfo::new("text/plain"));
        assert_eq!(item.as_text().as_deref(), Some("héllo"));
        assert_eq!(item.as_bytes(), Some("héllo".as_bytes().to_vec()));
    }

    #[test]
    fn test_ensure_filename_is_sha1_and_stable() {
        let mut item = Item::from_bytes(b"hello".to_vec(), ItemInfo::new("text/plain"));
        item.ensure_filename(None);
        assert_eq!(
            item.info.file.as_deref(),
            Some("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")
        );

        // Repeated calls do not change the name
        item.ensure_filename(None);
        assert_eq!(
            item.info.file.as_deref(),
            Some("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")
        );
    }

    #[test]
    fn test_ensure_filename_explicit_wins() {
        let mut item = Item::from_bytes(b"hello".to_vec(), ItemInfo::new("text/plain"));
        item.ensure_filename(Some("greeting.txt"));
        assert_eq!(item.info.file.as_deref(), Some("greeting.txt"));
    }

    #[test]
    fn test_ensure_filename_without_payload_is_noop() {
        let mut item = Item::from_file(ItemInfo::new("text/plain"), Path::new("/nonexistent"));
        item.ensure_filename(None);
        assert!(item.info.file.is_none());
    }

    #[test]
    fn test_persist_requires_filename() {
        let item = Item::from_bytes(b"data".to_vec(), ItemInfo::new("text/plain"));
        let dir = TempDir::new().unwrap();
        let result = item.persist(dir.path());
        assert!(matches!(result, Err(ItemError::NoFilename)));
    }

    #[test]
    fn test_persist_and_hydrate_round_trip() {
        let dir = TempDir::new().unwrap();
        let payload = vec![1u8, 2, 3, 0, 255];
        let mut item = Item::from_bytes(payload.clone(), ItemInfo::new("application/octet-stream"));
        item.ensure_filename(None);
        item.persist(dir.path()).unwrap();

        let restored = Item::from_file(item.info.clone(), dir.path());
        assert_eq!(restored.as_bytes(), Some(payload));
    }

    #[test]
    fn test_from_file_missing_payload_is_metadata_only() {
        let dir = TempDir::new().unwrap();
        let info = ItemInfo::new("text/plain").with_file("gone.txt");
        let item = Item::from_file(info, dir.path());
        assert!(!item.has_payload());
        assert_eq!(item.as_bytes(), None);
        assert_eq!(item.info.content_type, "text/plain");
    }

    #[test]
    fn test_delete_file_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut item = Item::from_text("bye", ItemInfo::new("text/plain"));
        item.ensure_filename(None);
        item.persist(dir.path()).unwrap();

        let path = dir.path().join(item.info.file.as_deref().unwrap());
        assert!(path.exists());

        item.delete_file(dir.path());
        assert!(!path.exists());

        // Second delete is a silent no-op
        item.delete_file(dir.path());
    }

    #[test]
    fn test_write_to_binary_and_text() {
        let item = Item::from_text("hello", ItemInfo::new("text/plain"));

        let mut out = Vec::new();
        item.write_to(&mut out, true).unwrap();
        assert_eq!(out, b"hello");

        let mut out = Vec::new();
        item.write_to(&mut out, false).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_write_to_text_fallback_summary() {
        let item = Item::from_bytes(vec![0u8; 16], ItemInfo::new("image/png"));
        let mut out = Vec::new();
        item.write_to(&mut out, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "16 bytes of type image/png");
    }

    #[test]
    fn test_write_to_without_payload_is_noop() {
        let item = Item::from_file(ItemInfo::new("text/plain"), Path::new("/nonexistent"));
        let mut out = Vec::new();
        item.write_to(&mut out, false).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_info_manifest_serde() {
        let mut info = ItemInfo::new("text/plain; charset=utf-8").with_file("note.txt");
        info.set("x-origin", "laptop");

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"content-type\""));

        let restored: ItemInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, restored);
    }
}
