//! Static-site build pipeline and incremental deployment to an S3-style
//! object store.
//!
//! `build` turns a source tree into a build tree (copy, compile, gzip,
//! timestamp normalization); `deploy` pushes only the files whose content
//! changed, using HEAD probes and signed PUTs.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
