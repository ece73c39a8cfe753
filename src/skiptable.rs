//! Skip-table storage (§4.5): the abstract append-only
//! `{row_no -> (input_hash, row_hash)}` store, plus an in-memory reference
//! implementation.
//!
//! The trait is async so a SQL- or network-backed implementation can
//! suspend at I/O boundaries per §5; a purely in-memory implementation
//! simply never awaits anything interesting.

use crate::error::{Result, SldgError};
use crate::hash::Hash;
use async_trait::async_trait;

/// One persisted row: its input hash (the salted source-row hash) and its
/// row hash (the skip-ledger commitment hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipRow {
    pub row_no: u64,
    pub input_hash: Hash,
    pub row_hash: Hash,
}

/// Abstract append-only skip-table storage.
///
/// Implementations must uphold the ordering guarantees of §5: appends are
/// totally ordered and persisted before `append` returns; `read` after a
/// successful `append` covering that row returns the appended bytes;
/// `trim` is ordered after all prior appends.
#[async_trait]
pub trait SkipTable: Send + Sync {
    /// The current number of rows, i.e. the highest populated `row_no`.
    async fn size(&self) -> Result<u64>;

    /// Reads row `n`. Fails with `OutOfBounds` if `n` is outside `[1, size]`.
    async fn read(&self, n: u64) -> Result<SkipRow>;

    /// Appends `batch`, whose first element is row number `start`.
    ///
    /// `start` must be in `[1, size() + 1]`. Rows in `batch` whose row
    /// number already exists must byte-equal the stored row (idempotent
    /// re-submission of a known prefix); a mismatch fails with
    /// `HashConflict` and leaves the table at its previous size. Rows
    /// beyond the current size are appended. Returns the new size.
    async fn append(&self, start: u64, batch: &[(Hash, Hash)]) -> Result<u64>;

    /// Truncates the table to `new_size` rows, if the implementation
    /// permits trimming. Fails `Unsupported` otherwise; rejects
    /// `new_size > size()`.
    async fn trim(&self, new_size: u64) -> Result<()>;
}

/// A dependency-free, single-process in-memory [`SkipTable`].
///
/// This is the reference implementation used by tests, demos, and
/// embedders who do not need durable storage. It supports trimming
/// unconditionally; storage adapters with capability flags (§6.3) gate
/// `trim` behind `allow_rollback` themselves.
#[derive(Debug, Default)]
pub struct MemSkipTable {
    rows: tokio::sync::RwLock<Vec<SkipRow>>,
}

impl MemSkipTable {
    pub fn new() -> Self {
        Self {
            rows: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SkipTable for MemSkipTable {
    async fn size(&self) -> Result<u64> {
        Ok(self.rows.read().await.len() as u64)
    }

    async fn read(&self, n: u64) -> Result<SkipRow> {
        let rows = self.rows.read().await;
        if n == 0 || n as usize > rows.len() {
            return Err(SldgError::out_of_bounds(format!(
                "row {n} outside [1, {}]",
                rows.len()
            )));
        }
        Ok(rows[(n - 1) as usize])
    }

    #[tracing::instrument(level = "debug", skip(self, batch), fields(count = batch.len()))]
    async fn append(&self, start: u64, batch: &[(Hash, Hash)]) -> Result<u64> {
        if batch.is_empty() {
            return Ok(self.rows.read().await.len() as u64);
        }
        let mut rows = self.rows.write().await;
        if start == 0 || start > rows.len() as u64 + 1 {
            return Err(SldgError::out_of_bounds(format!(
                "append start {start} is not in [1, {}]",
                rows.len() + 1
            )));
        }

        // Validate the whole batch against any existing rows *before*
        // mutating anything, so a conflict never leaves a partial write
        // visible.
        for (i, (input_hash, row_hash)) in batch.iter().enumerate() {
            let row_no = start + i as u64;
            if (row_no as usize) <= rows.len() {
                let existing = rows[(row_no - 1) as usize];
                if existing.input_hash != *input_hash || existing.row_hash != *row_hash {
                    tracing::warn!(row_no, "append batch disagrees with an already-committed row");
                    return Err(SldgError::hash_conflict(format!(
                        "append batch disagrees with existing row {row_no}"
                    )));
                }
            }
        }

        for (i, (input_hash, row_hash)) in batch.iter().enumerate() {
            let row_no = start + i as u64;
            if (row_no as usize) > rows.len() {
                rows.push(SkipRow {
                    row_no,
                    input_hash: *input_hash,
                    row_hash: *row_hash,
                });
            }
        }
        tracing::debug!(new_size = rows.len(), "skip-table append committed");
        Ok(rows.len() as u64)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn trim(&self, new_size: u64) -> Result<()> {
        let mut rows = self.rows.write().await;
        if new_size > rows.len() as u64 {
            return Err(SldgError::out_of_bounds(
                "trim target exceeds current size",
            ));
        }
        rows.truncate(new_size as usize);
        Ok(())
    }
}

/// Appends `batch` at the table's current tail (`size() + 1`). The common
/// case of [`SkipTable::append`] when the caller isn't resuming a retry.
pub async fn append_tail(table: &dyn SkipTable, batch: &[(Hash, Hash)]) -> Result<u64> {
    let size = table.size().await?;
    table.append(size + 1, batch).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::hash::hash;

    fn h(b: u8) -> Hash {
        hash(&[&[b]])
    }

    #[tokio::test]
    async fn append_and_read_roundtrip() {
        let t = MemSkipTable::new();
        let batch = vec![(h(1), h(2)), (h(3), h(4))];
        assert_eq!(append_tail(&t, &batch).await.unwrap(), 2);
        let r1 = t.read(1).await.unwrap();
        assert_eq!(r1.input_hash, h(1));
        assert_eq!(r1.row_hash, h(2));
    }

    #[tokio::test]
    async fn read_out_of_bounds() {
        let t = MemSkipTable::new();
        assert!(t.read(1).await.is_err());
        append_tail(&t, &[(h(1), h(2))]).await.unwrap();
        assert!(t.read(2).await.is_err());
        assert!(t.read(0).await.is_err());
    }

    /// S2: idempotent append of an identical prefix succeeds and leaves
    /// size unchanged; re-appending a *different* prefix is a conflict and
    /// also leaves size unchanged.
    #[tokio::test]
    async fn s2_idempotent_append_and_conflict() {
        let t = MemSkipTable::new();
        let batch = vec![(h(1), h(2)), (h(3), h(4)), (h(5), h(6))];
        t.append(1, &batch).await.unwrap();
        assert_eq!(t.size().await.unwrap(), 3);

        // Re-append the identical three rows starting at index 1: success,
        // size unchanged.
        t.append(1, &batch).await.unwrap();
        assert_eq!(t.size().await.unwrap(), 3);

        // Re-append three *different* hashes starting at index 1: conflict,
        // size unchanged.
        let different = vec![(h(7), h(8)), (h(9), h(10)), (h(11), h(12))];
        let err = t.append(1, &different).await;
        assert!(err.is_err());
        assert_eq!(t.size().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn trim_rejects_growth() {
        let t = MemSkipTable::new();
        append_tail(&t, &[(h(1), h(2))]).await.unwrap();
        assert!(t.trim(5).await.is_err());
        assert!(t.trim(0).await.is_ok());
        assert_eq!(t.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_rejects_gap() {
        let t = MemSkipTable::new();
        assert!(t.append(2, &[(h(1), h(2))]).await.is_err());
    }
}
