//! Engines: the build pipeline and the incremental sync to the store.

pub mod build_service;
pub mod diff;
pub mod signer;
pub mod store_client;
pub mod sync_service;
