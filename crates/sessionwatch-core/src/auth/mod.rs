//! Authentication module for managing credentials and their storage.
//!
//! This module provides:
//! - `StorageBackend`: pluggable durable key-value storage with in-memory,
//!   file, and OS-keychain implementations
//! - `CredentialStore`: typed access to the persisted credential record
//!
//! Credential reads fail open: a missing or unreadable record means "not
//! signed in", never an error the UI has to handle.

pub mod credentials;
pub mod storage;

pub use credentials::{CredentialStore, Credentials, Role};
pub use storage::{FileStore, KeyringStore, MemoryStore, StorageBackend};
