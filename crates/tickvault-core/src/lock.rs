//! Advisory lease lock serializing mutating operations on one root.
//!
//! The lease is the file `<root>/.tickvault.lock`, created with
//! `create_new` so exactly one process wins. It records the holder and an
//! expiry; an expired lease may be taken over. Takeover first renames the
//! lease aside and only deletes it if it still names the expired holder, so
//! a racing process can never remove a freshly created lease. Acquisition retries with
//! exponential backoff until the configured wait elapses, then fails with
//! [`LifecycleError::LockHeld`].
//!
//! Dry runs never take the lease.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ValidatedConfig, MAX_LOCK_DURATION};
use crate::error::{LifecycleError, ValidationError};
use crate::metadata::format_rfc3339;

pub const LOCK_FILE_NAME: &str = ".tickvault.lock";

const BACKOFF_BASE: Duration = Duration::from_millis(50);
const BACKOFF_MAX: Duration = Duration::from_secs(2);

/// Lease file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseInfo {
    pub holder_id: String,
    pub pid: u32,
    pub operation: String,
    pub acquired_at: String,
    pub expires_at: String,
}

impl LeaseInfo {
    fn new(holder_id: &str, operation: &str, ttl: Duration) -> Result<Self, ValidationError> {
        let now = OffsetDateTime::now_utc();
        let expires = time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| out_of_range("lock ttl", ttl))?;
        Ok(Self {
            holder_id: holder_id.to_string(),
            pid: std::process::id(),
            operation: operation.to_string(),
            acquired_at: format_rfc3339(now),
            expires_at: format_rfc3339(expires),
        })
    }

    /// An unparsable expiry counts as expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::parse(&self.expires_at, &Rfc3339)
            .map_or(true, |expires| OffsetDateTime::now_utc() >= expires)
    }
}

#[derive(Debug, Clone)]
pub struct LeaseLock {
    path: PathBuf,
    wait: Duration,
    ttl: Duration,
}

impl LeaseLock {
    pub fn new(root: &Path, wait: Duration, ttl: Duration) -> Self {
        Self {
            path: root.join(LOCK_FILE_NAME),
            wait,
            ttl,
        }
    }

    pub fn for_config(config: &ValidatedConfig) -> Self {
        Self::new(config.root(), config.lock_wait(), config.lock_ttl())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The lease currently on disk, if any and readable.
    pub fn current(&self) -> Option<LeaseInfo> {
        read_lease(&self.path)
    }

    /// Acquire the lease for `operation`, waiting up to the configured duration.
    ///
    /// # Errors
    /// [`LifecycleError::LockHeld`] when a live lease outlasts the wait.
    pub fn acquire(&self, operation: &str) -> Result<LeaseGuard, LifecycleError> {
        let holder_id = Uuid::new_v4().to_string();
        let deadline = Instant::now()
            .checked_add(self.wait)
            .ok_or_else(|| out_of_range("lock wait", self.wait))?;
        let mut backoff = BACKOFF_BASE;

        loop {
            match self.try_create(&holder_id, operation)? {
                Some(guard) => return Ok(guard),
                None if self.take_over_if_expired() => continue,
                None => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.held_error());
            }
            debug!(lock = %self.path.display(), ?backoff, "lease held, backing off");
            std::thread::sleep(backoff.min(deadline - now));
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }
    }

    fn held_error(&self) -> LifecycleError {
        let unknown = || String::from("unknown");
        let (holder, operation, expires_at) = match self.current() {
            Some(info) => (
                format!("{} (pid {})", info.holder_id, info.pid),
                info.operation,
                info.expires_at,
            ),
            None => (unknown(), unknown(), unknown()),
        };
        LifecycleError::LockHeld {
            lock_path: self.path.clone(),
            holder,
            operation,
            expires_at,
        }
    }

    fn try_create(
        &self,
        holder_id: &str,
        operation: &str,
    ) -> Result<Option<LeaseGuard>, LifecycleError> {
        let info = LeaseInfo::new(holder_id, operation, self.ttl)?;
        let bytes = serde_json::to_vec_pretty(&info)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(error) => return Err(LifecycleError::io(&self.path, error)),
        };
        let written = file.write_all(&bytes).and_then(|()| file.sync_all());
        if let Err(error) = written {
            let _ = fs::remove_file(&self.path);
            return Err(LifecycleError::io(&self.path, error));
        }
        debug!(lock = %self.path.display(), holder = holder_id, operation, "lease acquired");
        Ok(Some(LeaseGuard {
            path: self.path.clone(),
            holder_id: holder_id.to_string(),
            released: false,
        }))
    }

    /// Remove an expired lease. An unreadable lease expires one TTL after its last write.
    ///
    /// Returns whether the caller should retry creating the lease.
    fn take_over_if_expired(&self) -> bool {
        self.expired_holder()
            .is_some_and(|observed| self.take_over(observed.as_deref()))
    }

    /// Remove the lease if it still names `observed`, the holder seen expired.
    fn take_over(&self, observed: Option<&str>) -> bool {
        let aside = self
            .path
            .with_file_name(format!("{LOCK_FILE_NAME}.{}.stale", Uuid::new_v4().simple()));
        if let Err(error) = fs::rename(&self.path, &aside) {
            return error.kind() == std::io::ErrorKind::NotFound;
        }

        let moved = read_lease(&aside).map(|info| info.holder_id);
        if moved.as_deref() == observed {
            warn!(lock = %self.path.display(), holder = ?observed, "took over expired lease");
            let _ = fs::remove_file(&aside);
            return true;
        }

        // Another process replaced the lease after we looked; put it back.
        debug!(lock = %self.path.display(), "lease changed during takeover, restoring");
        self.restore(&aside);
        false
    }

    /// Holder id of an expired lease, `Some(None)` for an expired unreadable one.
    fn expired_holder(&self) -> Option<Option<String>> {
        match self.current() {
            Some(info) => info.is_expired().then_some(Some(info.holder_id)),
            None => {
                let modified = fs::metadata(&self.path)
                    .and_then(|metadata| metadata.modified())
                    .ok()?;
                let age = SystemTime::now().duration_since(modified).ok()?;
                (age >= self.ttl).then_some(None)
            }
        }
    }

    /// Move a lease renamed aside back into place without clobbering a newer one.
    fn restore(&self, aside: &Path) {
        match fs::hard_link(aside, &self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(lock = %self.path.display(), "lease recreated while restoring, dropping the older one");
            }
            Err(_) => {
                if !self.path.exists() {
                    let _ = fs::rename(aside, &self.path);
                    return;
                }
            }
        }
        let _ = fs::remove_file(aside);
    }
}

fn read_lease(path: &Path) -> Option<LeaseInfo> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn out_of_range(setting: &'static str, value: Duration) -> ValidationError {
    ValidationError::DurationOutOfRange {
        setting,
        secs: value.as_secs(),
        max_secs: MAX_LOCK_DURATION.as_secs(),
    }
}

/// Take the lease for `operation` unless the configuration is a dry run.
pub fn lease_for(
    config: &ValidatedConfig,
    operation: &str,
) -> Result<Option<LeaseGuard>, LifecycleError> {
    if config.dry_run() {
        return Ok(None);
    }
    LeaseLock::for_config(config).acquire(operation).map(Some)
}

/// Held lease. Released on [`LeaseGuard::release`] or drop.
#[derive(Debug)]
pub struct LeaseGuard {
    path: PathBuf,
    holder_id: String,
    released: bool,
}

impl LeaseGuard {
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn release(mut self) -> Result<(), LifecycleError> {
        self.released = true;
        self.remove_if_owned()
    }

    fn remove_if_owned(&self) -> Result<(), LifecycleError> {
        let owned = read_lease(&self.path).is_some_and(|info| info.holder_id == self.holder_id);
        if !owned {
            warn!(lock = %self.path.display(), "lease was taken over before release");
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(LifecycleError::io(&self.path, error)),
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.remove_if_owned();
        }
    }
}
