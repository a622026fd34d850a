//! Persistent stash for RemoteStash.
//!
//! A stash is a single-slot-plus-history store on local disk: an ordered list
//! of item metadata records in a JSON manifest (`contents.json`), with one
//! payload file per item next to it. The last manifest entry is the "latest"
//! item that a RemoteStash server hands out.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stash::{Item, ItemInfo, Stash, StashConfig};
//!
//! // Open the default per-user stash (~/.remotestash)
//! let mut stash = Stash::open(StashConfig::default()).unwrap();
//!
//! // Push some content
//! let item = Item::from_text("hello", ItemInfo::new("text/plain"));
//! stash.push(item).unwrap();
//!
//! // Peek at the latest item
//! if let Some(item) = stash.last() {
//!     println!("{}", item.as_text().unwrap());
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `REMOTESTASH_PATH`: Base path for the stash (default: `~/.remotestash`)
//!
//! # Concurrency
//!
//! Single-writer contract: every operation is a fresh open/mutate/persist
//! cycle and no file lock is held. The RemoteStash server serializes its
//! requests; running two local-mode mutations against the same directory at
//! once is unsupported.

pub mod config;
pub mod item;
pub mod store;

// Re-exports for convenience
pub use config::StashConfig;
pub use item::{Item, ItemError, ItemInfo, Payload};
pub use store::{LastSummary, Stash, StashStatus};
