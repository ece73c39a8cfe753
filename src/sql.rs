//! SQL adapter (§6.2): a `sqlx`-backed [`SkipTable`] implementing the
//! reference relational mapping, plus idempotent creation of the
//! surrounding registry tables (`{prefix}_sldg_tr`, `{prefix}_sldg_ch`,
//! `{prefix}_chain_infos`, `{prefix}_microchains`, `{prefix}_ledger_salts`).
//!
//! Every write-capable operation consults the caller's [`Env`] first, per
//! §6.3: a read-only env fails `append`/`trim` before touching the
//! database at all.

use crate::config::Env;
use crate::error::{Result, SldgError};
use crate::hash::{b64_32_decode, b64_32_encode, Hash};
use crate::skiptable::{SkipRow, SkipTable};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// `sqlx`-backed [`SkipTable`] over the `{prefix}_sldg` table.
pub struct SqlSkipTable {
    pool: SqlitePool,
    env: Env,
}

impl SqlSkipTable {
    /// Connects to `database_url` and creates the reference schema (§6.2)
    /// if it does not already exist.
    pub async fn connect(database_url: &str, env: Env) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let table = Self { pool, env };
        table.ensure_schema().await?;
        Ok(table)
    }

    /// Wraps an already-open pool, e.g. one shared with other tables in the
    /// same database. Does not itself run [`Self::ensure_schema`].
    pub fn from_pool(pool: SqlitePool, env: Env) -> Self {
        Self { pool, env }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    fn prefix(&self) -> &str {
        self.env.table_prefix()
    }

    /// Idempotently creates the core hash table and the surrounding
    /// registry tables named in §6.2, each via `CREATE TABLE IF NOT
    /// EXISTS`. Soft-deletion on the registry tables is a `deleted` flag
    /// column, per §6.2's note; the row-hash table itself is truncated for
    /// real by [`SkipTable::trim`] since appends must be able to resume
    /// past a trimmed tail.
    pub async fn ensure_schema(&self) -> Result<()> {
        let p = self.prefix();

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {p}_sldg (
                row_num BIGINT PRIMARY KEY,
                src_hash CHAR(43) NOT NULL,
                row_hash CHAR(43) NOT NULL
            )"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {p}_sldg_tr (
                trl_id INTEGER PRIMARY KEY AUTOINCREMENT,
                row_num BIGINT NOT NULL REFERENCES {p}_sldg(row_num),
                utc BIGINT NOT NULL,
                mrkl_idx INTEGER NOT NULL,
                mrkl_cnt INTEGER NOT NULL,
                chain_len INTEGER NOT NULL
            )"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {p}_sldg_ch (
                chn_id INTEGER PRIMARY KEY AUTOINCREMENT,
                trl_id INTEGER NOT NULL REFERENCES {p}_sldg_tr(trl_id),
                n_hash CHAR(43) NOT NULL
            )"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {p}_chain_infos (
                ledger_id INTEGER PRIMARY KEY,
                ledger_type INTEGER NOT NULL,
                name TEXT NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT 0
            )"
        ))
        .execute(&self.pool)
        .await?;

        // `mc_id` is the primary key: microchains are listed as owning
        // their own identity, distinct from the ledger they subdivide
        // (§9's open question on the microchain key is resolved here and
        // recorded in the design ledger).
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {p}_microchains (
                mc_id INTEGER PRIMARY KEY AUTOINCREMENT,
                ledger_id INTEGER NOT NULL REFERENCES {p}_chain_infos(ledger_id),
                start_row BIGINT NOT NULL,
                end_row BIGINT,
                deleted BOOLEAN NOT NULL DEFAULT 0
            )"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {p}_ledger_salts (
                ledger_id INTEGER NOT NULL,
                start_row BIGINT NOT NULL,
                seed CHAR(43) NOT NULL,
                deleted BOOLEAN NOT NULL DEFAULT 0,
                PRIMARY KEY (ledger_id, start_row)
            )"
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Registers a ledger in `{prefix}_chain_infos`, gated by the env's
    /// write capability.
    pub async fn register_ledger(&self, ledger_id: u32, ledger_type: u8, name: &str) -> Result<()> {
        self.env.require_writable()?;
        let p = self.prefix();
        sqlx::query(&format!(
            "INSERT INTO {p}_chain_infos (ledger_id, ledger_type, name, deleted)
             VALUES (?, ?, ?, 0)
             ON CONFLICT(ledger_id) DO UPDATE SET ledger_type = excluded.ledger_type, name = excluded.name"
        ))
        .bind(ledger_id)
        .bind(ledger_type as i64)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Soft-deletes a ledger registration. `Unsupported` unless the env
    /// allows delete.
    pub async fn delete_ledger(&self, ledger_id: u32) -> Result<()> {
        self.env.require_delete()?;
        let p = self.prefix();
        sqlx::query(&format!("UPDATE {p}_chain_infos SET deleted = 1 WHERE ledger_id = ?"))
            .bind(ledger_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a salt epoch (§4.2) for `ledger_id` starting at `start_row`.
    pub async fn register_salt_epoch(&self, ledger_id: u32, start_row: u64, seed: [u8; 32]) -> Result<()> {
        self.env.require_writable()?;
        let p = self.prefix();
        sqlx::query(&format!(
            "INSERT INTO {p}_ledger_salts (ledger_id, start_row, seed, deleted)
             VALUES (?, ?, ?, 0)"
        ))
        .bind(ledger_id)
        .bind(start_row as i64)
        .bind(b64_32_encode(&seed))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SkipTable for SqlSkipTable {
    async fn size(&self) -> Result<u64> {
        let p = self.prefix();
        let row = sqlx::query(&format!("SELECT COALESCE(MAX(row_num), 0) AS n FROM {p}_sldg"))
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    async fn read(&self, n: u64) -> Result<SkipRow> {
        let p = self.prefix();
        let row = sqlx::query(&format!(
            "SELECT src_hash, row_hash FROM {p}_sldg WHERE row_num = ?"
        ))
        .bind(n as i64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SldgError::out_of_bounds(format!("row {n} not present")))?;

        let src_hash: String = row.try_get("src_hash")?;
        let row_hash: String = row.try_get("row_hash")?;
        Ok(SkipRow {
            row_no: n,
            input_hash: Hash::new(b64_32_decode(&src_hash)?),
            row_hash: Hash::new(b64_32_decode(&row_hash)?),
        })
    }

    #[tracing::instrument(skip(self, batch), fields(table_prefix = self.prefix()))]
    async fn append(&self, start: u64, batch: &[(Hash, Hash)]) -> Result<u64> {
        self.env.require_writable()?;
        self.env.require_commit()?;
        if batch.is_empty() {
            return self.size().await;
        }
        let p = self.prefix().to_string();
        let mut tx = self.pool.begin().await?;

        for (i, (input_hash, row_hash)) in batch.iter().enumerate() {
            let row_no = start + i as u64;
            let existing = sqlx::query(&format!(
                "SELECT src_hash, row_hash FROM {p}_sldg WHERE row_num = ?"
            ))
            .bind(row_no as i64)
            .fetch_optional(&mut *tx)
            .await?;

            match existing {
                Some(row) => {
                    let existing_src: String = row.try_get("src_hash")?;
                    let existing_row: String = row.try_get("row_hash")?;
                    if existing_src != b64_32_encode(input_hash.as_bytes())
                        || existing_row != b64_32_encode(row_hash.as_bytes())
                    {
                        return Err(SldgError::hash_conflict(format!(
                            "append batch disagrees with stored row {row_no}"
                        )));
                    }
                }
                None => {
                    let inserted = sqlx::query(&format!(
                        "INSERT INTO {p}_sldg (row_num, src_hash, row_hash) VALUES (?, ?, ?)"
                    ))
                    .bind(row_no as i64)
                    .bind(b64_32_encode(input_hash.as_bytes()))
                    .bind(b64_32_encode(row_hash.as_bytes()))
                    .execute(&mut *tx)
                    .await;

                    // A unique-key violation here means a concurrent writer
                    // inserted this row between our existence check and our
                    // insert — an invariant the single-writer model of §5
                    // assumes does not happen.
                    if let Err(e) = inserted {
                        tracing::warn!(row_no, error = %e, "concurrent writer raced this append");
                        return Err(SldgError::concurrent_modification(format!(
                            "row {row_no} was inserted concurrently during append"
                        )));
                    }
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(start, count = batch.len(), "skip-table append committed");
        self.size().await
    }

    #[tracing::instrument(skip(self), fields(table_prefix = self.prefix()))]
    async fn trim(&self, new_size: u64) -> Result<()> {
        self.env.require_writable()?;
        self.env.require_rollback()?;
        let current = self.size().await?;
        if new_size > current {
            return Err(SldgError::out_of_bounds("trim target exceeds current size"));
        }
        let p = self.prefix();
        sqlx::query(&format!("DELETE FROM {p}_sldg WHERE row_num > ?"))
            .bind(new_size as i64)
            .execute(&self.pool)
            .await?;
        tracing::debug!(new_size, "skip-table trimmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::hash::hash;

    fn h(b: u8) -> Hash {
        hash(&[&[b]])
    }

    async fn table() -> SqlSkipTable {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let env = Env::read_write("sldg_test").unwrap();
        let table = SqlSkipTable::from_pool(pool, env);
        table.ensure_schema().await.unwrap();
        table
    }

    #[tokio::test]
    async fn append_and_read_roundtrip() {
        let t = table().await;
        let n = t.append(1, &[(h(1), h(2)), (h(3), h(4))]).await.unwrap();
        assert_eq!(n, 2);
        let r = t.read(1).await.unwrap();
        assert_eq!(r.input_hash, h(1));
        assert_eq!(r.row_hash, h(2));
    }

    #[tokio::test]
    async fn idempotent_reappend_succeeds() {
        let t = table().await;
        let batch = vec![(h(1), h(2)), (h(3), h(4))];
        t.append(1, &batch).await.unwrap();
        t.append(1, &batch).await.unwrap();
        assert_eq!(t.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn conflicting_reappend_fails() {
        let t = table().await;
        t.append(1, &[(h(1), h(2))]).await.unwrap();
        let err = t.append(1, &[(h(9), h(9))]).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn read_only_env_rejects_append() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let env = Env::read_only("sldg_test").unwrap();
        let t = SqlSkipTable::from_pool(pool, env);
        t.ensure_schema().await.unwrap();
        assert!(t.append(1, &[(h(1), h(2))]).await.is_err());
    }

    #[tokio::test]
    async fn trim_then_append_resumes() {
        let t = table().await;
        t.append(1, &[(h(1), h(2)), (h(3), h(4)), (h(5), h(6))])
            .await
            .unwrap();
        t.trim(1).await.unwrap();
        assert_eq!(t.size().await.unwrap(), 1);
        t.append(2, &[(h(7), h(8))]).await.unwrap();
        assert_eq!(t.size().await.unwrap(), 2);
    }
}
