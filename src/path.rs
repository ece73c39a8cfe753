//! Commitment path (§4.6): a connected sequence of rows linked by skip
//! pointers, sufficient to prove the row hash of its endpoints.

use crate::error::{Result, SldgError};
use crate::hash::{hash, Hash, SENTINEL_HASH};
use crate::topology::back_references;
use std::collections::BTreeMap;

/// One row as recorded in a path: its row hash, and — unless it's the
/// path's terminal (first, lowest-numbered) row — the input hash needed to
/// reconstruct that row hash from its referenced predecessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRow {
    pub row_no: u64,
    pub row_hash: Hash,
    pub input_hash: Option<Hash>,
}

/// A non-empty, strictly increasing sequence of rows linked by skip
/// pointers, with the row hash of each listed row and the input hash of
/// each non-terminal row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    rows: Vec<PathRow>,
}

impl Path {
    /// Builds a path from rows in ascending row-number order. Validates
    /// that each consecutive pair is actually linked by a skip pointer
    /// (`r_i` is one of `r_{i+1}`'s back-references) — but does *not* by
    /// itself recompute hashes; call [`Path::validate`] for that.
    pub fn new(rows: Vec<PathRow>) -> Result<Self> {
        if rows.is_empty() {
            return Err(SldgError::config("path must contain at least one row"));
        }
        for w in rows.windows(2) {
            if w[0].row_no >= w[1].row_no {
                return Err(SldgError::config(
                    "path rows must be strictly increasing by row number",
                ));
            }
            let refs = back_references(w[1].row_no);
            if !refs.contains(&(w[0].row_no as i128)) {
                return Err(SldgError::config(format!(
                    "row {} does not reach row {} via a skip pointer",
                    w[1].row_no, w[0].row_no
                )));
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[PathRow] {
        &self.rows
    }

    pub fn first(&self) -> PathRow {
        self.rows[0]
    }

    pub fn last(&self) -> PathRow {
        self.rows[self.rows.len() - 1]
    }

    /// Every row number listed in the path plus every row number any
    /// listed row references via its skip pointers.
    pub fn covered_row_numbers(&self) -> Vec<u64> {
        let mut set: Vec<u64> = Vec::new();
        for row in &self.rows {
            set.push(row.row_no);
            for r in back_references(row.row_no) {
                if r > 0 {
                    set.push(r as u64);
                }
            }
        }
        set.sort_unstable();
        set.dedup();
        set
    }

    /// The row hash recorded for `n`, if `n` is explicitly listed in this path.
    pub fn row_hash(&self, n: u64) -> Option<Hash> {
        self.rows
            .iter()
            .find(|r| r.row_no == n)
            .map(|r| r.row_hash)
    }

    /// Validates the path: for each row after the first, recomputes its
    /// row hash from its input hash and the referenced hashes — each
    /// looked up among earlier rows of this path, or the sentinel for a
    /// reference to row 0 — and compares against the stored hash.
    ///
    /// A reference to a row not covered this way is a `FormatError`; a
    /// hash mismatch is a `HashConflict`.
    pub fn validate(&self) -> Result<()> {
        let mut known: BTreeMap<u64, Hash> = BTreeMap::new();
        known.insert(self.rows[0].row_no, self.rows[0].row_hash);

        for row in self.rows.iter().skip(1) {
            let input_hash = row.input_hash.ok_or_else(|| {
                SldgError::format(format!(
                    "row {} is non-terminal in its path but carries no input hash",
                    row.row_no
                ))
            })?;
            let refs = back_references(row.row_no);
            let mut parts: Vec<Hash> = Vec::with_capacity(refs.len() + 1);
            parts.push(input_hash);
            for r in &refs {
                let referenced = if *r <= 0 {
                    SENTINEL_HASH
                } else {
                    *known.get(&(*r as u64)).ok_or_else(|| {
                        SldgError::format(format!(
                            "row {} references row {r} which is not covered by this path",
                            row.row_no
                        ))
                    })?
                };
                parts.push(referenced);
            }
            let byte_parts: Vec<&[u8]> = parts.iter().map(|h| h.as_bytes().as_slice()).collect();
            let recomputed = hash(&byte_parts);
            if recomputed != row.row_hash {
                return Err(SldgError::hash_conflict(format!(
                    "row {} hash mismatch: stored {} recomputed {}",
                    row.row_no, row.row_hash, recomputed
                )));
            }
            known.insert(row.row_no, row.row_hash);
        }
        Ok(())
    }

    /// The row numbers shared between `self` and `other`, in ascending order.
    pub fn intersection(&self, other: &Path) -> Vec<u64> {
        let a = self.covered_row_numbers();
        let b: std::collections::BTreeSet<u64> = other.covered_row_numbers().into_iter().collect();
        a.into_iter().filter(|n| b.contains(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::frontier::HashFrontier;

    fn input_hash(k: u64) -> Hash {
        hash(&[b"row", &k.to_be_bytes()])
    }

    /// Builds a path densely covering every row `[1..=n]`. A sparse
    /// skip-linked path only needs the O(log n) rows a real emitter would
    /// pick, but every row back-referenced by any listed row must itself be
    /// listed for `validate()` to replay it — the dense form trivially
    /// satisfies that for any `n` and is what these tests need.
    fn build_path(n: u64) -> Path {
        let mut frontiers = vec![HashFrontier::empty()];
        for k in 1..=n {
            let prev = frontiers.last().unwrap().clone();
            let next = if k == 1 {
                HashFrontier::first_row(input_hash(k))
            } else {
                prev.next_row(input_hash(k))
            };
            frontiers.push(next);
        }
        let row_hash_of = |k: u64| frontiers[k as usize].row_hash().unwrap();

        let rows: Vec<PathRow> = (1..=n)
            .map(|k| PathRow {
                row_no: k,
                row_hash: row_hash_of(k),
                input_hash: Some(input_hash(k)),
            })
            .collect();
        Path::new(rows).unwrap()
    }

    #[test]
    fn single_row_path_is_valid() {
        let frontier = HashFrontier::first_row(input_hash(1));
        let path = Path::new(vec![PathRow {
            row_no: 1,
            row_hash: frontier.row_hash().unwrap(),
            input_hash: None,
        }])
        .unwrap();
        path.validate().unwrap();
    }

    #[test]
    fn multi_row_path_validates() {
        let path = build_path(8);
        path.validate().unwrap();
        assert_eq!(path.first().row_no, 1);
        assert_eq!(path.last().row_no, 8);
    }

    #[test]
    fn tampered_hash_fails_validation() {
        let mut path = build_path(8);
        let bad = Hash::new([0xAAu8; 32]);
        let last_idx = path.rows.len() - 1;
        path.rows[last_idx].row_hash = bad;
        assert!(path.validate().is_err());
    }

    #[test]
    fn rejects_unlinked_consecutive_rows() {
        let rows = vec![
            PathRow {
                row_no: 1,
                row_hash: Hash::new([1; 32]),
                input_hash: None,
            },
            PathRow {
                row_no: 5,
                row_hash: Hash::new([2; 32]),
                input_hash: Some(Hash::new([3; 32])),
            },
        ];
        assert!(Path::new(rows).is_err());
    }

    #[test]
    fn covered_row_numbers_include_skip_targets() {
        let path = build_path(8);
        let covered = path.covered_row_numbers();
        for n in 1..=8u64 {
            assert!(covered.contains(&n), "missing row {n}");
        }
    }
}
