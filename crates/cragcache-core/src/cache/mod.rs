//! Versioned cache namespaces.
//!
//! This module provides:
//! - `NamespaceStore` / `Namespace`: the storage contract strategies read and write through
//! - `MemoryStore`: in-process store, used by tests and short-lived embeddings
//! - `DiskStore`: persistent store, one directory per namespace
//! - `NamespaceManager`: owns the current static and dynamic namespaces,
//!   provisions them on install and evicts old generations on activation

pub mod disk;
pub mod manager;
pub mod memory;
pub mod store;

pub use disk::DiskStore;
pub use manager::{InstallReport, NamespaceManager, NamespaceRole};
pub use memory::MemoryStore;
pub use store::{CachedEntry, Namespace, NamespaceHandle, NamespaceStore};
