//! # Tickvault Core
//!
//! Lifecycle management for daily tick partitions.
//!
//! ## Overview
//!
//! Every calendar day of ticks lives in `<root>/YYYY/MM/ticks_YYYY-MM-DD.db`.
//! This crate moves those partitions through their lifecycle:
//!
//! - **Rotation** at the day boundary: close and back up yesterday, activate today, pre-create tomorrow
//! - **Compression** of partitions older than the age threshold into `.db.zst` siblings
//! - **Retention** that archives or deletes partitions past the retention horizon
//! - **Validation** of every configured directory and every filename before anything is mutated
//!
//! Mutating operations hold an advisory lease on the root and record each
//! partition's state in a persisted ledger.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Raw and validated configuration |
//! | [`validation`] | Path containment and filename allowlists |
//! | [`naming`] | Partition paths and date parsing |
//! | [`ledger`] | Persisted partition states |
//! | [`metadata`] | `rotation_metadata.json` |
//! | [`lock`] | Advisory lease lock |
//! | [`codec`] | Compression codecs |
//! | [`rotation`] | Day-boundary rotation |
//! | [`compression`] | Compression and decompression |
//! | [`retention`] | Retention tiers and purge |
//! | [`inventory`] | `status`, `list` and `inspect` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tickvault_core::{ConfigSpec, RotationController};
//! use tickvault_warehouse::DuckDbEngine;
//! use time::OffsetDateTime;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigSpec::default().validate()?;
//!     let controller = RotationController::new(config, Arc::new(DuckDbEngine::default()));
//!
//!     let report = controller.rotate(OffsetDateTime::now_utc().date())?;
//!     eprintln!("{}", report.summary.summary_line("rotate"));
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod compression;
pub mod config;
pub mod error;
pub mod files;
pub mod inventory;
pub mod ledger;
pub mod lock;
pub mod metadata;
pub mod naming;
pub mod observability;
pub mod report;
pub mod retention;
pub mod rotation;
pub mod validation;

pub use codec::{Codec, CodecError, ZstdCli};
pub use compression::{
    CompressedFile, CompressionController, CompressionReport, DecompressionReport,
};
pub use config::{ConfigSpec, ValidatedConfig};
pub use error::{LifecycleError, Severity, ValidationError};
pub use inventory::{InspectReport, Inventory, PartitionListing, StatusReport};
pub use ledger::{Partition, PartitionLedger, PartitionState};
pub use lock::{LeaseGuard, LeaseInfo, LeaseLock};
pub use metadata::{MetadataStore, RotationMetadata};
pub use observability::{init_logging, LogFormat};
pub use report::{BatchSummary, ItemReport, Outcome};
pub use retention::{RetentionController, RetentionReport, RetentionTier};
pub use rotation::{RotationController, RotationReport};
pub use validation::FilenameValidator;
