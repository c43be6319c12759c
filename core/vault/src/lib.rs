//! Vault engine for framevault.
//!
//! This module provides:
//! - The frame wire codec with authenticated and content-hash layouts
//! - The segment cipher pipeline (chunking, per-segment encryption, rebuild)
//! - The in-memory object store with replica merging
//! - The virtual name index and its persistence as a bookkeeping object
//! - Session handling and the vault manager that ties them together
//!
//! # Architecture
//! Load runs bytes -> frames -> segments -> objects -> plaintext; save runs
//! the same chain backwards. Only [`VaultManager`] touches the filesystem.

pub mod config;
pub mod frame;
pub mod manager;
pub mod report;
pub mod segment;
pub mod session;
pub mod store;
pub mod vvfs;

pub use config::{FormatVersion, VaultConfig};
pub use frame::{Frame, FrameCodec, FrameLayout};
pub use manager::VaultManager;
pub use report::{DroppedObject, ExtractReport, LoadReport, SaveReport};
pub use segment::{decrypt_object, encrypt_object, Segment};
pub use session::{SessionHandle, SessionState, VaultSession};
pub use store::{ObjectStore, VaultObject};
pub use vvfs::{Vvfs, VvfsSnapshot};
