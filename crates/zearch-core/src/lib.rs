//! Zearch Core Library
//!
//! This crate provides the engine behind the Zearch browser extension, which
//! filters unwanted domains out of search result pages. The browser-facing
//! glue (DOM access, extension storage, notifications) lives in the extension
//! itself; everything that can be expressed independently of the platform
//! lives here.
//!
//! # Architecture
//!
//! The engine is a set of small, explicitly-wired pieces:
//!
//! - `rules`: turns free-form user input into validated regex rules and
//!   evaluates hostnames against the active rule set
//! - `settings`: the settings store, the single source of truth for
//!   configuration, persisted through a pluggable backend, with an explicit
//!   subscription registry for change notification
//! - `scanner`: the page-scan decision loop that classifies result containers,
//!   decides display treatments, debounces re-scans and batches notifications
//! - `relay`: the inter-context message vocabulary and best-effort delivery
//! - `debounce`: the one scheduling primitive, modeled as a state machine
//! - `url`: hostname extraction and search-URL helpers
//! - `storage`: the persistence backend trait and an in-memory implementation

pub mod clock;
pub mod debounce;
pub mod relay;
pub mod rules;
pub mod scanner;
pub mod settings;
pub mod storage;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use relay::{Delivery, Message, Relay};
pub use rules::{evaluate, generate, GeneratedRule};
pub use scanner::{PageSnapshot, ScanTrigger, Scanner, SearchPage, Treatment};
pub use settings::{Error, SettingsStore};
pub use storage::{MemoryBackend, SettingsBackend, StorageError};
pub use types::{BlockMode, BlockRule, ResultsPerPage, Settings};
