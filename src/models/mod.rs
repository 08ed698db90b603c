//! Data models for the sync engine.
//!
//! Descriptors are per-file snapshots that live for one sync pass only; the
//! content table and credentials are built once per process and shared
//! read-only across every sync task.

pub mod content_table;
pub mod credentials;
pub mod decision;
pub mod descriptor;

pub use content_table::ContentTable;
pub use credentials::Credentials;
pub use decision::{Mismatch, SyncDecision};
pub use descriptor::{LocalDescriptor, RemoteDescriptor};
