//! oaamonitor-storage - S3-compatible backup and restore for the oaamonitor database
//!
//! Other subsystems call [`Storage::download`] and [`Storage::upload`]; the
//! `s3` module underneath implements SigV4 signing from primitives.

pub mod cli;
pub mod config;
pub mod s3;
pub mod storage;

pub use config::StorageConfig;
pub use s3::StorageError;
pub use storage::Storage;
