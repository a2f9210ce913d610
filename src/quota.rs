//! Durable per-identity send quotas with a rolling 24 hour window.
//!
//! The store owns a single JSON ledger mapping each sender identity to a
//! [`QuotaRecord`]. All mutation happens inside [`QuotaStore::reserve`], which
//! is linearized behind one async mutex: two concurrent reservations for the
//! same identity can never jointly overshoot the daily limit. The ledger is
//! rewritten in full after every mutation and survives process restarts.
//!
//! Records are never evicted. The ledger grows with the number of distinct
//! sender identities, which is acceptable at this tool's scale.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How long a window lasts before a record's count resets.
fn window() -> Duration {
    Duration::hours(24)
}

/// Per-identity usage inside the current rolling window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// Sends reserved against this identity since `last_reset`.
    pub count: u32,
    /// Start of the current window, RFC 3339 in the ledger.
    pub last_reset: DateTime<Utc>,
}

impl QuotaRecord {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            last_reset: now,
        }
    }
}

/// Errors touching the durable ledger.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// The ledger file exists but cannot be parsed.
    #[error("Quota ledger is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Reading or writing the ledger failed.
    #[error("Quota ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a reservation was refused.
#[derive(Debug, Error)]
pub enum ReserveError {
    /// Granting the request would exceed the daily limit. `remaining` is the
    /// exact allowance left in the current window.
    #[error("Daily limit of {limit} reached, {remaining} sends remaining")]
    Exceeded { remaining: u32, limit: u32 },

    /// The ledger could not be persisted; the reservation did not happen.
    #[error(transparent)]
    Storage(#[from] QuotaError),
}

type Records = AHashMap<String, QuotaRecord>;

/// Durable mapping from sender identity to [`QuotaRecord`].
#[derive(Debug)]
pub struct QuotaStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl QuotaStore {
    /// Load the ledger at `path`, or start with an empty one.
    ///
    /// A missing file is a normal first run. A corrupt file degrades to empty
    /// history with a logged warning rather than blocking all future sends.
    ///
    /// # Errors
    /// Returns an error only if the file exists but cannot be read at all.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, QuotaError> {
        let path = path.into();
        let records = match Self::load(&path).await {
            Ok(records) => records,
            Err(QuotaError::Corrupt(e)) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Quota ledger is corrupt, starting with empty history"
                );
                Records::default()
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Read and parse the ledger, returning an empty mapping if none exists.
    ///
    /// # Errors
    /// [`QuotaError::Corrupt`] if the content cannot be parsed,
    /// [`QuotaError::Io`] if it cannot be read.
    async fn load(path: &Path) -> Result<Records, QuotaError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Records::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Durably overwrite the whole ledger.
    ///
    /// Writes to a sibling file first and renames over the ledger so a crash
    /// mid-write never leaves a half-written file behind.
    async fn save(&self, records: &Records) -> Result<(), QuotaError> {
        let bytes = serde_json::to_vec_pretty(records).map_err(QuotaError::Corrupt)?;
        let staging = self.path.with_extension("json.tmp");

        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        Ok(())
    }

    /// Zero every record whose window started 24h or more ago.
    ///
    /// Returns whether anything changed, so callers persist only on change.
    fn apply_rolling_reset(records: &mut Records, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        for record in records.values_mut() {
            if now - record.last_reset >= window() {
                record.count = 0;
                record.last_reset = now;
                changed = true;
            }
        }

        changed
    }

    /// Atomically reserve `requested` sends for `identity` against `limit`.
    ///
    /// On success the ledger is persisted before returning, and the returned
    /// value is the allowance left after this reservation. On
    /// [`ReserveError::Exceeded`] the record is untouched: there are no
    /// partial reservations.
    ///
    /// # Errors
    /// [`ReserveError::Exceeded`] when `requested` overshoots the remaining
    /// allowance, [`ReserveError::Storage`] when the ledger cannot be
    /// persisted (in which case the reservation is rolled back).
    pub async fn reserve(
        &self,
        identity: &str,
        requested: u32,
        limit: u32,
    ) -> Result<u32, ReserveError> {
        self.reserve_at(identity, Utc::now(), requested, limit).await
    }

    /// [`Self::reserve`] with an explicit clock, for tests and replay.
    pub async fn reserve_at(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        requested: u32,
        limit: u32,
    ) -> Result<u32, ReserveError> {
        let mut records = self.records.lock().await;

        let rolled = Self::apply_rolling_reset(&mut records, now);

        let record = records
            .entry(identity.to_string())
            .or_insert_with(|| QuotaRecord::fresh(now));

        let remaining = limit.saturating_sub(record.count);
        if requested > remaining {
            debug!(identity, requested, remaining, "Reservation refused");
            // The reset still has to reach the ledger even though the
            // reservation itself failed
            if rolled {
                self.save(&records).await?;
            }
            return Err(ReserveError::Exceeded { remaining, limit });
        }

        let previous = record.count;
        record.count += requested;

        if let Err(e) = self.save(&records).await {
            // A reservation that never reached durable storage must not be
            // considered granted
            if let Some(record) = records.get_mut(identity) {
                record.count = previous;
            }
            return Err(e.into());
        }

        let remaining = remaining - requested;
        debug!(identity, requested, remaining, "Reservation granted");

        Ok(remaining)
    }

    /// Current usage for `identity`, if it has ever reserved anything.
    pub async fn usage(&self, identity: &str) -> Option<QuotaRecord> {
        self.records.lock().await.get(identity).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;

    use super::*;

    async fn store_in(dir: &tempfile::TempDir) -> QuotaStore {
        QuotaStore::open(dir.path().join("quota.json"))
            .await
            .expect("open store")
    }

    #[tokio::test]
    async fn reserve_accumulates_and_refuses_exactly_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        let remaining = store
            .reserve_at("user@example.com", now, 5, 410)
            .await
            .expect("first reservation");
        assert_eq!(remaining, 405);

        // Asking for one more than remains must fail and report the exact
        // allowance, without mutating the record
        let err = store
            .reserve_at("user@example.com", now, 406, 410)
            .await
            .expect_err("over-limit reservation");
        match err {
            ReserveError::Exceeded { remaining, limit } => {
                assert_eq!(remaining, 405);
                assert_eq!(limit, 410);
            }
            other => panic!("Unexpected error: {other}"),
        }

        // Asking for exactly the remainder succeeds
        let remaining = store
            .reserve_at("user@example.com", now, 405, 410)
            .await
            .expect("exact remainder");
        assert_eq!(remaining, 0);

        let record = store.usage("user@example.com").await.unwrap();
        assert_eq!(record.count, 410);
    }

    #[tokio::test]
    async fn reset_happens_at_exactly_24h_and_not_one_second_before() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let start = Utc::now();

        store
            .reserve_at("user@example.com", start, 400, 410)
            .await
            .expect("fill most of the window");

        // 24h minus one second: the old window still applies
        let almost = start + TimeDelta::hours(24) - TimeDelta::seconds(1);
        let err = store
            .reserve_at("user@example.com", almost, 11, 410)
            .await
            .expect_err("still inside the window");
        assert!(matches!(err, ReserveError::Exceeded { remaining: 10, .. }));

        // Exactly 24h: count resets and the full limit is available again
        let exactly = start + TimeDelta::hours(24);
        let remaining = store
            .reserve_at("user@example.com", exactly, 11, 410)
            .await
            .expect("fresh window");
        assert_eq!(remaining, 399);

        let record = store.usage("user@example.com").await.unwrap();
        assert_eq!(record.count, 11);
        assert_eq!(record.last_reset, exactly);
    }

    #[tokio::test]
    async fn ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.json");
        let now = Utc::now();

        {
            let store = QuotaStore::open(&path).await.unwrap();
            store
                .reserve_at("user@example.com", now, 7, 410)
                .await
                .unwrap();
        }

        let reopened = QuotaStore::open(&path).await.unwrap();
        let record = reopened.usage("user@example.com").await.unwrap();
        assert_eq!(record.count, 7);
        assert_eq!(record.last_reset, now);
    }

    #[tokio::test]
    async fn corrupt_ledger_degrades_to_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let store = QuotaStore::open(&path).await.expect("corrupt ledger opens");
        assert!(store.usage("user@example.com").await.is_none());

        // And it is usable (and persistable) from there
        store
            .reserve_at("user@example.com", Utc::now(), 1, 410)
            .await
            .expect("reserve after corrupt read");
    }

    #[tokio::test]
    async fn failed_persist_rolls_the_reservation_back() {
        let dir = tempfile::tempdir().unwrap();
        // The parent directory does not exist, so every save must fail
        let path = dir.path().join("missing").join("quota.json");

        let store = QuotaStore::open(&path).await.expect("absent ledger opens empty");
        let err = store
            .reserve_at("user@example.com", Utc::now(), 5, 410)
            .await
            .expect_err("persist cannot succeed");
        assert!(matches!(err, ReserveError::Storage(_)));

        // The in-memory count must not pretend the reservation happened
        let record = store.usage("user@example.com").await.unwrap();
        assert_eq!(record.count, 0);
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        store.reserve_at("a@example.com", now, 410, 410).await.unwrap();

        // A different identity still has its full allowance
        let remaining = store.reserve_at("b@example.com", now, 1, 410).await.unwrap();
        assert_eq!(remaining, 409);
    }

    #[tokio::test]
    async fn concurrent_reservations_never_overshoot() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(store_in(&dir).await);
        let now = Utc::now();

        // 100 tasks each asking for 5 against a limit of 410: at most 82 can
        // succeed (82 * 5 = 410)
        let mut handles = Vec::new();
        for _ in 0..100 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.reserve_at("user@example.com", now, 5, 410).await
            }));
        }

        let mut granted = 0u32;
        for handle in handles {
            if handle.await.expect("task panicked").is_ok() {
                granted += 1;
            }
        }

        assert_eq!(granted, 82);
        let record = store.usage("user@example.com").await.unwrap();
        assert_eq!(record.count, 410);
    }
}
