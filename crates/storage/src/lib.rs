//! Durable backends (File, S3, Hybrid) and the WAL ingestion pipeline that
//! sits in front of them.

pub mod file_backend;
pub mod hybrid;
pub mod s3_backend;
pub mod wal_processor;

pub use file_backend::FileBackend;
pub use hybrid::{HybridBackend, HybridMetrics};
pub use s3_backend::S3Backend;
pub use wal_processor::{IngestReport, WalProcessor};
