//! Shared fixtures for the behavior tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tickvault_core::naming::{compressed_path, partition_path};
use tickvault_core::{Codec, CodecError, ConfigSpec, ValidatedConfig};
use tickvault_warehouse::{DuckDbEngine, StorageEngine, TickRecord};
use time::Date;

/// A partition tree at `<temp>/data/ticks` with `<temp>/data` as the allowed base.
pub struct Workspace {
    pub temp: TempDir,
    pub base: PathBuf,
    pub root: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().join("data");
        let root = base.join("ticks");
        fs::create_dir_all(&root).expect("root dir");
        let base = fs::canonicalize(&base).expect("canonical base");
        let root = fs::canonicalize(&root).expect("canonical root");
        Self { temp, base, root }
    }

    pub fn spec(&self) -> ConfigSpec {
        let mut spec = ConfigSpec::for_root(&self.root, &self.base);
        spec.lock_wait = Duration::ZERO;
        spec
    }

    pub fn config(&self) -> ValidatedConfig {
        self.spec().validate().expect("valid config")
    }

    pub fn config_with(&self, adjust: impl FnOnce(&mut ConfigSpec)) -> ValidatedConfig {
        let mut spec = self.spec();
        adjust(&mut spec);
        spec.validate().expect("valid config")
    }

    pub fn partition(&self, date: Date) -> PathBuf {
        partition_path(&self.root, date)
    }

    pub fn compressed(&self, date: Date) -> PathBuf {
        compressed_path(&self.partition(date))
    }

    /// Create a real, checkpointed partition holding `ticks` quotes.
    pub fn seed_partition(&self, date: Date, ticks: usize) -> PathBuf {
        let path = self.partition(date);
        fs::create_dir_all(path.parent().expect("parent")).expect("month dir");
        let engine = DuckDbEngine::default();
        let report = engine.create_partition(&path).expect("create partition");
        assert!(report.ok, "seeded partition must be healthy");

        let rows: Vec<TickRecord> = (0..ticks)
            .map(|index| {
                let offset = i64::try_from(index).expect("index fits");
                TickRecord::quote("EURUSD", 1_760_000_000_000 + offset, 1.0712, 1.0714)
            })
            .collect();
        engine.insert_ticks(&path, &rows).expect("insert ticks");
        engine.checkpoint(&path).expect("checkpoint");
        path
    }

    /// A file with a partition name whose content is not a database.
    pub fn corrupt_partition(&self, date: Date) -> PathBuf {
        let path = self.partition(date);
        fs::create_dir_all(path.parent().expect("parent")).expect("month dir");
        fs::write(&path, b"this is not a database file at all").expect("garbage");
        path
    }

    pub fn write_file(&self, relative: impl AsRef<Path>, bytes: &[u8]) -> PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("parent dir");
        fs::write(&path, bytes).expect("write");
        path
    }
}

pub fn engine() -> Arc<DuckDbEngine> {
    Arc::new(DuckDbEngine::default())
}

const MAGIC: &[u8] = b"TVZ1";

/// Reversible in-process codec that counts invocations.
#[derive(Default)]
pub struct RecordingCodec {
    pub compress_calls: AtomicUsize,
    pub decompress_calls: AtomicUsize,
    pub fail: bool,
}

impl RecordingCodec {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.compress_calls.load(Ordering::SeqCst) + self.decompress_calls.load(Ordering::SeqCst)
    }

    fn failure(&self) -> CodecError {
        CodecError::Failed {
            program: String::from("recording-codec"),
            status: String::from("exit status: 1"),
            stderr: String::from("simulated failure"),
        }
    }
}

impl Codec for RecordingCodec {
    fn compress(&self, input: &Path, output: &Path, _level: u8) -> Result<(), CodecError> {
        self.compress_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            fs::write(output, b"half").expect("partial output");
            return Err(self.failure());
        }
        let mut bytes = MAGIC.to_vec();
        bytes.extend(fs::read(input).expect("read input"));
        fs::write(output, bytes).expect("write output");
        Ok(())
    }

    fn decompress(&self, input: &Path, output: &Path) -> Result<(), CodecError> {
        self.decompress_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = fs::read(input).expect("read input");
        match bytes.strip_prefix(MAGIC) {
            Some(body) if !self.fail => {
                fs::write(output, body).expect("write output");
                Ok(())
            }
            _ => Err(self.failure()),
        }
    }
}

pub fn zstd_available() -> bool {
    std::process::Command::new("zstd")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}
