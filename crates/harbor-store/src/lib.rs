//! # harbor-store: Local Store Abstractions for Harbor
//!
//! The sync engine treats its durable collaborators as interfaces:
//!
//! - [`LocalStore`] / [`StoreTransaction`] - a transactional document store
//!   exposing tables, lookups, writes, and soft-delete;
//! - [`ScratchStore`] - a string-keyed blob store for small scratch values
//!   such as the pull watermark.
//!
//! This crate defines those traits and ships in-memory reference
//! implementations ([`MemoryStore`], [`MemoryScratch`]) that are real,
//! transactional, and insertion-ordered - suitable for tests and for
//! ephemeral embedding. Production deployments implement the traits over
//! their database of choice.

pub mod error;
pub mod kv;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use kv::{MemoryScratch, ScratchStore};
pub use memory::MemoryStore;
pub use store::{LocalStore, StoreTransaction};
