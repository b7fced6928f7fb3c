//! Behavior-driven tests for retention and inventory
//!
//! These tests verify which partitions a purge removes or archives, and
//! what `list`, `status` and `inspect` report about the tree.

mod support;

use std::sync::Arc;

use support::{engine, RecordingCodec, Workspace};
use tickvault_core::naming::relative_path;
use tickvault_core::{
    CompressionController, Inventory, LeaseLock, PartitionLedger, PartitionState,
    RetentionController, RetentionTier, RotationController,
};
use time::macros::date;
use time::Date;

const TODAY: Date = date!(2026 - 10 - 19);
// today - 180 days
const HORIZON: Date = date!(2026 - 04 - 22);
const EXPIRED: Date = date!(2026 - 04 - 21);

// =============================================================================
// Retention: Purge
// =============================================================================

#[test]
fn when_purging_only_partitions_before_the_horizon_are_deleted() {
    // Given: Compressed partitions one day past the horizon and on it
    let workspace = Workspace::new();
    let expired = workspace.write_file(
        relative_path(EXPIRED).with_extension("db.zst"),
        b"compressed",
    );
    let boundary = workspace.write_file(
        relative_path(HORIZON).with_extension("db.zst"),
        b"compressed",
    );
    let controller = RetentionController::new(workspace.config());

    // When: Purge runs with the default 180-day retention
    let report = controller.purge(TODAY).expect("purge runs");

    // Then: Only the expired partition is gone
    assert_eq!(report.horizon, "2026-04-22");
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.skipped, 1);
    assert!(!expired.exists());
    assert!(boundary.is_file());
    assert_eq!(report.bytes_released, 10);

    // And: The ledger records the deletion
    let ledger = PartitionLedger::load(&workspace.root).expect("ledger");
    assert_eq!(
        ledger.get(EXPIRED).expect("entry").state,
        PartitionState::Deleted
    );
}

#[test]
fn when_an_archive_dir_is_configured_expired_partitions_are_moved_there() {
    // Given: An archive directory outside the root and an expired partition
    let workspace = Workspace::new();
    let archive = workspace.base.join("archive");
    let expired = workspace.write_file(relative_path(EXPIRED), b"raw partition");
    let controller = RetentionController::new(
        workspace.config_with(|spec| spec.archive_dir = Some(archive.clone())),
    );

    // When: Purge runs
    let report = controller.purge(TODAY).expect("purge runs");

    // Then: The file now lives under the archive with the same relative path
    assert_eq!(report.summary.succeeded, 1);
    assert!(!expired.exists());
    let archived = archive.join(relative_path(EXPIRED));
    assert_eq!(std::fs::read(&archived).expect("archived"), b"raw partition");

    let ledger = PartitionLedger::load(&workspace.root).expect("ledger");
    let entry = ledger.get(EXPIRED).expect("entry");
    assert_eq!(entry.state, PartitionState::Archived);
    assert_eq!(entry.path, archived);
}

#[test]
fn when_dry_run_is_enabled_purge_deletes_nothing() {
    // Given: A dry-run configuration and an expired partition
    let workspace = Workspace::new();
    let expired = workspace.write_file(relative_path(EXPIRED), b"raw");
    let controller =
        RetentionController::new(workspace.config_with(|spec| spec.dry_run = true));

    // When: Purge runs
    let report = controller.purge(TODAY).expect("dry run");

    // Then: The summary counts it but the file remains
    assert_eq!(report.summary.succeeded, 1);
    assert!(expired.is_file());
}

#[test]
fn when_retention_does_not_exceed_the_threshold_purge_refuses() {
    // Given: A controller with the default 7-day threshold
    let workspace = Workspace::new();
    let recent = workspace.write_file(relative_path(date!(2026 - 10 - 15)), b"raw");
    let controller = RetentionController::new(workspace.config());

    // When: Purge is asked to keep only 7 days
    let error = controller.purge_with(TODAY, 7).expect_err("rejected");

    // Then: It is a configuration error and nothing was removed
    assert_eq!(error.kind(), "ConfigurationError");
    assert!(recent.is_file());
}

#[test]
fn when_configured_threshold_exceeds_retention_only_purge_refuses() {
    // Given: A configuration that compresses after a year but keeps 180 days
    let workspace = Workspace::new();
    let old = workspace.write_file(relative_path(date!(2026 - 01 - 05)), b"raw");
    let config = workspace.config_with(|spec| {
        spec.age_threshold_days = 365;
        spec.retention_days = 180;
    });

    // When: Purge runs with the configured retention
    let error = RetentionController::new(config)
        .purge(TODAY)
        .expect_err("rejected");

    // Then: Purge reports the conflicting settings and removes nothing
    assert_eq!(error.kind(), "ConfigurationError");
    assert!(error.to_string().contains("180"));
    assert!(old.is_file());
}

// =============================================================================
// Inventory: list, status, inspect
// =============================================================================

#[test]
fn when_listing_partitions_each_reports_state_and_tier() {
    // Given: A rotated tree with an old compressed partition and an expired raw one
    let workspace = Workspace::new();
    workspace.seed_partition(date!(2026 - 10 - 01), 4);
    workspace.write_file(relative_path(EXPIRED), b"raw");
    RotationController::new(workspace.config(), engine())
        .rotate(TODAY)
        .expect("rotate");
    CompressionController::new(
        workspace.config(),
        engine(),
        Arc::new(RecordingCodec::default()),
    )
    .compress_with(TODAY, 7, 3)
    .expect("compress");

    // When: Partitions are listed
    let listings = Inventory::new(workspace.config(), engine())
        .list(TODAY)
        .expect("list");

    // Then: Each partition carries the expected state and tier
    let find = |date: &str| {
        listings
            .iter()
            .find(|listing| listing.date == date)
            .unwrap_or_else(|| panic!("missing {date}"))
    };
    assert_eq!(find("2026-10-19").state, PartitionState::Active);
    assert_eq!(find("2026-10-19").tier, RetentionTier::Hot);
    assert_eq!(find("2026-10-20").state, PartitionState::Created);
    assert_eq!(find("2026-10-01").state, PartitionState::Compressed);
    assert!(find("2026-10-01").compressed);
    assert_eq!(find("2026-10-01").tier, RetentionTier::Warm);
    assert_eq!(find("2026-04-21").tier, RetentionTier::Cold);

    // And: The listing is ordered by date
    let dates: Vec<&str> = listings.iter().map(|listing| listing.date.as_str()).collect();
    let mut sorted = dates.clone();
    sorted.sort_unstable();
    assert_eq!(dates, sorted);
}

#[test]
fn when_asking_for_status_it_summarizes_the_tree() {
    // Given: A rotated tree and a live lease
    let workspace = Workspace::new();
    let config = workspace.config();
    RotationController::new(config.clone(), engine())
        .rotate(TODAY)
        .expect("rotate");
    let _lease = LeaseLock::for_config(&config)
        .acquire("compress")
        .expect("lease");

    // When: Status is requested
    let status = Inventory::new(config, engine())
        .status(TODAY)
        .expect("status");

    // Then: It reports both partitions, the last rotation and the lease holder
    assert!(status.today_partition.exists);
    assert!(status.tomorrow_partition.exists);
    assert_eq!(
        status
            .last_rotation
            .as_ref()
            .map(|metadata| metadata.current_date.as_str()),
        Some("2026-10-19")
    );
    assert_eq!(status.partitions_by_state.get(&PartitionState::Active), Some(&1));
    assert_eq!(status.partitions_by_tier.get(&RetentionTier::Hot), Some(&2));
    assert!(status.uncompressed_bytes > 0);
    assert_eq!(
        status.lease.as_ref().map(|lease| lease.operation.as_str()),
        Some("compress")
    );
}

#[test]
fn when_inspecting_a_partition_it_reports_tick_statistics() {
    // Given: A partition with ticks
    let workspace = Workspace::new();
    let path = workspace.seed_partition(date!(2026 - 10 - 18), 9);

    // When: It is inspected
    let report = Inventory::new(workspace.config(), engine())
        .inspect(&path)
        .expect("inspect");

    // Then: The consistency check passes with the seeded statistics
    assert!(report.integrity.ok);
    assert_eq!(report.integrity.tick_count, 9);
    assert_eq!(report.integrity.symbol_count, 1);
    assert_eq!(report.date.as_deref(), Some("2026-10-18"));
    assert!(report.size_bytes > 0);
}
