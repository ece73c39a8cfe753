//! Table-salt engine (§4.2): deterministic per-row and per-cell salt
//! derivation from a secret seed, with epoched seed rotation.

use crate::error::{Result, SldgError};
use crate::hash::hash;
use std::collections::BTreeSet;

/// One segment of a rotating salt seed, effective from `start_row` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochSeed {
    pub start_row: u64,
    pub seed: [u8; 32],
}

impl EpochSeed {
    pub fn new(start_row: u64, seed: [u8; 32]) -> Self {
        Self { start_row, seed }
    }
}

/// A non-empty, strictly-increasing-by-`start_row` list of [`EpochSeed`]s,
/// the first of which must start at row 1.
#[derive(Debug, Clone)]
pub struct EpochedTableSalt {
    epochs: Vec<EpochSeed>,
}

impl EpochedTableSalt {
    /// Builds an epoch list, validating the invariants from §3: non-empty,
    /// first `start_row` exactly 1, all `start_row`s strictly increasing.
    pub fn new(mut epochs: Vec<EpochSeed>) -> Result<Self> {
        if epochs.is_empty() {
            return Err(SldgError::config("epoch list must not be empty"));
        }
        epochs.sort_by_key(|e| e.start_row);
        if epochs[0].start_row != 1 {
            return Err(SldgError::config(format!(
                "first epoch must start at row 1, got {}",
                epochs[0].start_row
            )));
        }
        for w in epochs.windows(2) {
            if w[0].start_row >= w[1].start_row {
                return Err(SldgError::config(
                    "epoch start_row values must be strictly increasing",
                ));
            }
        }
        Ok(Self { epochs })
    }

    /// A single, non-rotating seed effective for all rows.
    pub fn single(seed: [u8; 32]) -> Self {
        Self {
            epochs: vec![EpochSeed::new(1, seed)],
        }
    }

    /// The seed in effect for row `n`: the epoch with the greatest
    /// `start_row <= n`.
    fn seed_for(&self, n: u64) -> [u8; 32] {
        self.epochs
            .iter()
            .rev()
            .find(|e| e.start_row <= n)
            .map(|e| e.seed)
            .unwrap_or(self.epochs[0].seed)
    }

    pub fn row_salt(&self, n: u64) -> [u8; 32] {
        row_salt(&self.seed_for(n), n)
    }
}

/// `row_salt(seed, n) = H(seed ‖ big_endian_u64(n))`.
pub fn row_salt(seed: &[u8; 32], n: u64) -> [u8; 32] {
    *hash(&[seed, &n.to_be_bytes()]).as_bytes()
}

/// `cell_salt(row_salt, col) = H(row_salt ‖ big_endian_i32(col))`.
pub fn cell_salt(row_salt: &[u8; 32], col: i32) -> [u8; 32] {
    *hash(&[row_salt, &col.to_be_bytes()]).as_bytes()
}

/// Upper bound, in encoded text bytes, on a [`SaltScheme`]'s column-index list.
pub const SALT_SCHEME_MAX_ENCODED_LEN: usize = 4096;

/// Whether a [`SaltScheme`] salts exactly the listed columns, or every
/// column except the listed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Include,
    Exclude,
}

/// A finite set of column indices plus a polarity, describing which cells
/// in a row receive a salt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltScheme {
    indices: BTreeSet<i32>,
    polarity: Polarity,
}

impl SaltScheme {
    /// Builds a scheme, validating: non-negative, unique (a `BTreeSet`
    /// already guarantees this), sorted, and that the encoded index list
    /// fits the bounded length.
    pub fn new(indices: impl IntoIterator<Item = i32>, polarity: Polarity) -> Result<Self> {
        let indices: BTreeSet<i32> = indices.into_iter().collect();
        for &c in &indices {
            if c < 0 {
                return Err(SldgError::config(format!(
                    "salt scheme column index must be non-negative, got {c}"
                )));
            }
        }
        let scheme = Self { indices, polarity };
        if scheme.encoded_len() > SALT_SCHEME_MAX_ENCODED_LEN {
            return Err(SldgError::config(format!(
                "salt scheme encoded length {} exceeds bound {}",
                scheme.encoded_len(),
                SALT_SCHEME_MAX_ENCODED_LEN
            )));
        }
        Ok(scheme)
    }

    /// The scheme under which no column is ever salted: an empty `INCLUDE`
    /// set salts exactly zero columns (`(col ∈ {}) XOR (INCLUDE == EXCLUDE)`
    /// is always false). An empty `EXCLUDE` set is the opposite — it
    /// excludes nothing, so it salts every column.
    pub fn all_excluded() -> Self {
        Self {
            indices: BTreeSet::new(),
            polarity: Polarity::Include,
        }
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn indices(&self) -> impl Iterator<Item = i32> + '_ {
        self.indices.iter().copied()
    }

    /// A *mixed* scheme is a non-empty index list with `Include` polarity —
    /// disallowed for LOG-type ledgers per §3.
    pub fn is_mixed(&self) -> bool {
        !self.indices.is_empty() && self.polarity == Polarity::Include
    }

    fn encoded_len(&self) -> usize {
        // Comma-separated decimal column indices, as stored in SOURCE_PACK /
        // relational metadata text form.
        self.indices
            .iter()
            .map(|c| c.to_string().len() + 1)
            .sum::<usize>()
            .saturating_sub(1)
            .max(0)
    }

    /// `(col ∈ indices) XOR (polarity == Exclude)`.
    pub fn salts_column(&self, col: i32) -> bool {
        let in_set = self.indices.contains(&col);
        in_set ^ (self.polarity == Polarity::Exclude)
    }
}

/// `effective_cell_salt(scheme, n, col)`: `Some` salt iff `col` is salted
/// under `scheme`, using the table-salt engine's row salt for row `n`.
pub fn effective_cell_salt(
    scheme: &SaltScheme,
    table_salt: &EpochedTableSalt,
    n: u64,
    col: i32,
) -> Option<[u8; 32]> {
    if scheme.salts_column(col) {
        let rs = table_salt.row_salt(n);
        Some(cell_salt(&rs, col))
    } else {
        None
    }
}

/// A single-threaded table-salt engine handle.
///
/// Caches the most recently computed row salt so hashing every cell of one
/// row does not re-derive `row_salt` per column. Not `Sync`: a
/// multi-threaded caller must use one handle per thread, or bypass the
/// cache by calling [`row_salt`]/[`cell_salt`] directly.
pub struct TableSaltEngine {
    table_salt: EpochedTableSalt,
    cache: Option<(u64, [u8; 32])>,
}

impl TableSaltEngine {
    pub fn new(table_salt: EpochedTableSalt) -> Self {
        Self {
            table_salt,
            cache: None,
        }
    }

    pub fn row_salt(&mut self, n: u64) -> [u8; 32] {
        if let Some((cached_n, cached)) = self.cache {
            if cached_n == n {
                return cached;
            }
        }
        let rs = self.table_salt.row_salt(n);
        self.cache = Some((n, rs));
        rs
    }

    pub fn effective_cell_salt(&mut self, scheme: &SaltScheme, n: u64, col: i32) -> Option<[u8; 32]> {
        if scheme.salts_column(col) {
            Some(cell_salt(&self.row_salt(n), col))
        } else {
            None
        }
    }
}

impl Drop for TableSaltEngine {
    fn drop(&mut self) {
        // The root seed(s) are secrets; zero any cached derivation before
        // the handle goes away. `EpochedTableSalt` itself is dropped right
        // after, taking the seeds with it.
        if let Some((_, ref mut cached)) = self.cache {
            cached.fill(0);
        }
    }
}
