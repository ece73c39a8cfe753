//! Multi-path (§4.6/§4.8): a set of mutually consistent commitment paths
//! covering disjoint-but-linkable row ranges.

use crate::error::{Result, SldgError};
use crate::hash::Hash;
use crate::path::{Path, PathRow};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct MergedRow {
    row_hash: Hash,
    input_hash: Option<Hash>,
}

/// A bundle of paths that, pairwise, agree on every row number they both
/// cover. Rows shared across paths deduplicate to one record.
#[derive(Debug, Clone, Default)]
pub struct MultiPath {
    paths: Vec<Path>,
    merged: BTreeMap<u64, MergedRow>,
}

impl MultiPath {
    /// Builds a multi-path from its first path. The first path is never
    /// rejected for "not intersecting" — there's nothing yet to intersect.
    pub fn new(first: Path) -> Result<Self> {
        first.validate()?;
        let mut mp = MultiPath {
            paths: Vec::new(),
            merged: BTreeMap::new(),
        };
        mp.merge_in(first)?;
        Ok(mp)
    }

    fn merge_in(&mut self, path: Path) -> Result<()> {
        for row in path.rows() {
            match self.merged.get(&row.row_no) {
                Some(existing) => {
                    if existing.row_hash != row.row_hash {
                        return Err(SldgError::hash_conflict(format!(
                            "row {} hash disagrees across paths",
                            row.row_no
                        )));
                    }
                }
                None => {
                    self.merged.insert(
                        row.row_no,
                        MergedRow {
                            row_hash: row.row_hash,
                            input_hash: row.input_hash,
                        },
                    );
                }
            }
            // A row might be non-terminal on this path but terminal
            // (input_hash absent) on the path that first introduced it;
            // either is fine as long as at least one path supplies the
            // input hash when the row isn't a path terminus anywhere.
            if let Some(ih) = row.input_hash {
                if let Some(entry) = self.merged.get_mut(&row.row_no) {
                    if entry.input_hash.is_none() {
                        entry.input_hash = Some(ih);
                    }
                }
            }
        }
        self.paths.push(path);
        Ok(())
    }

    /// Adds a path to the multi-path.
    ///
    /// `p` must intersect the existing covered set on at least one row
    /// number (`UnlinkedPath` otherwise); the row hash of every shared row
    /// number must match (`HashConflict` otherwise).
    pub fn add_path(&mut self, p: Path) -> Result<()> {
        p.validate()?;
        let intersects = p
            .covered_row_numbers()
            .iter()
            .any(|n| self.merged.contains_key(n));
        if !intersects {
            return Err(SldgError::unlinked_path(
                "path does not intersect the multi-path's existing covered set",
            ));
        }
        self.merge_in(p)
    }

    /// The row numbers covered by at least one path, ascending.
    pub fn covered_row_numbers(&self) -> Vec<u64> {
        self.merged.keys().copied().collect()
    }

    /// The row hash for `n`, if `n` is in the covered set.
    pub fn row_hash(&self, n: u64) -> Option<Hash> {
        self.merged.get(&n).map(|r| r.row_hash)
    }

    /// The input hash recorded for `n` by whichever path supplied it, if any.
    pub fn input_hash(&self, n: u64) -> Option<Hash> {
        self.merged.get(&n).and_then(|r| r.input_hash)
    }

    /// The full row record for `n`, if some path lists it explicitly
    /// (rather than only referencing it via a skip pointer).
    pub fn find_row(&self, n: u64) -> Option<PathRow> {
        self.paths
            .iter()
            .flat_map(|p| p.rows())
            .find(|r| r.row_no == n)
            .copied()
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::frontier::HashFrontier;
    use crate::hash::hash;
    use crate::path::PathRow;

    fn input_hash(k: u64) -> Hash {
        hash(&[b"row", &k.to_be_bytes()])
    }

    fn row_hashes_up_to(n: u64) -> Vec<Hash> {
        let mut out = vec![Hash::new([0; 32])]; // index 0 unused placeholder
        let mut frontier = HashFrontier::empty();
        for k in 1..=n {
            frontier = if k == 1 {
                HashFrontier::first_row(input_hash(k))
            } else {
                frontier.next_row(input_hash(k))
            };
            out.push(frontier.row_hash().unwrap());
        }
        out
    }

    /// Builds a dense path covering every row `[1..=end]`, so every row any
    /// listed row back-references is itself listed (required for
    /// `validate()`, and for testing coverage against arbitrary endpoints).
    fn path_from_chain(hashes: &[Hash], end: u64) -> Path {
        let rows: Vec<PathRow> = (1..=end)
            .map(|k| PathRow {
                row_no: k,
                row_hash: hashes[k as usize],
                input_hash: Some(input_hash(k)),
            })
            .collect();
        Path::new(rows).unwrap()
    }

    /// S4: two overlapping paths merge; covered set is the union; shared
    /// rows agree. Replacing a shared row's hash then triggers HashConflict.
    #[tokio::test]
    async fn s4_multipath_merges_overlapping_paths() {
        let hashes = row_hashes_up_to(8);
        let path_a = path_from_chain(&hashes, 8); // covers {8,7,6,4,...,1}
        let path_b = path_from_chain(&hashes, 4); // covers {4,3,2,1}

        let mut mp = MultiPath::new(path_a).unwrap();
        mp.add_path(path_b).unwrap();

        let covered = mp.covered_row_numbers();
        for n in [1u64, 2, 4, 6, 7, 8] {
            assert!(covered.contains(&n));
        }
        assert!(mp.row_hash(1).is_some());
        assert!(mp.row_hash(4).is_some());
        assert!(mp.row_hash(8).is_some());

        // Now build a path B' with a tampered hash at row 4 and confirm
        // add_path rejects it.
        let mut tampered_hashes = hashes.clone();
        tampered_hashes[4] = Hash::new([0xFFu8; 32]);
        let mut rows = path_from_chain(&tampered_hashes, 4).rows().to_vec();
        // path_from_chain would fail validate() internally via Path::new
        // only if skip-linkage breaks; hash tampering doesn't break
        // linkage, so construct directly and rely on MultiPath's own
        // equality check against the already-merged row 4.
        rows[rows.len() - 1].row_hash = Hash::new([0xFFu8; 32]);
        let bad_path = Path::new(rows).unwrap();
        let err = mp.add_path(bad_path);
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn add_path_rejects_unlinked() {
        let hashes = row_hashes_up_to(16);
        let path_a = path_from_chain(&hashes, 4);
        let mut mp = MultiPath::new(path_a).unwrap();

        // A path over rows far away with no shared row number.
        let rows = vec![PathRow {
            row_no: 9,
            row_hash: hashes[9],
            input_hash: None,
        }];
        let unrelated = Path::new(rows).unwrap();
        assert!(mp.add_path(unrelated).is_err());
    }

    #[tokio::test]
    async fn find_row_only_for_explicitly_listed_rows() {
        let hashes = row_hashes_up_to(8);
        // A single-row terminal path at row 8 (valid since row 8's own
        // linkage is never checked against anything earlier): explicitly
        // lists only row 8, even though row 8 back-references 7, 6, 4 and 0.
        let path = Path::new(vec![PathRow {
            row_no: 8,
            row_hash: hashes[8],
            input_hash: None,
        }])
        .unwrap();
        let mp = MultiPath::new(path).unwrap();
        assert!(mp.find_row(8).is_some());
        assert!(mp.find_row(7).is_none());
        assert_eq!(mp.covered_row_numbers(), vec![8]);
    }
}
