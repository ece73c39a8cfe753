//! Source pack (§4.7, §6.1): a collection of source rows keyed by row
//! number, plus the salt-scheme metadata they were hashed under.

use crate::cell::SourceRow;
use crate::error::{Result, SldgError};
use crate::salt::SaltScheme;
use std::collections::BTreeMap;

/// Source rows keyed by row number, plus the [`SaltScheme`] that was in
/// effect when their input hashes were computed.
#[derive(Debug)]
pub struct SourcePack {
    salt_scheme: SaltScheme,
    rows: BTreeMap<u64, SourceRow>,
}

impl SourcePack {
    pub fn new(salt_scheme: SaltScheme) -> Self {
        Self {
            salt_scheme,
            rows: BTreeMap::new(),
        }
    }

    pub fn salt_scheme(&self) -> &SaltScheme {
        &self.salt_scheme
    }

    /// Inserts a row, replacing any existing row at the same number.
    pub fn insert(&mut self, row: SourceRow) {
        self.rows.insert(row.number(), row);
    }

    pub fn get(&self, row_no: u64) -> Option<&SourceRow> {
        self.rows.get(&row_no)
    }

    pub fn contains(&self, row_no: u64) -> bool {
        self.rows.contains_key(&row_no)
    }

    pub fn row_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.keys().copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &SourceRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Validates that every row number in `pack` lies within `covered`. Used by
/// the nugget builder (§4.7) to enforce "every source row's number lies
/// within the multi-path's covered set".
pub fn require_rows_covered(pack: &SourcePack, covered: &[u64]) -> Result<()> {
    let covered: std::collections::BTreeSet<u64> = covered.iter().copied().collect();
    for n in pack.row_numbers() {
        if !covered.contains(&n) {
            return Err(SldgError::out_of_bounds(format!(
                "source row {n} is not within the multi-path's covered set"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::cell::Cell;
    use crate::salt::Polarity;

    #[test]
    fn insert_and_get() {
        let mut pack = SourcePack::new(SaltScheme::all_excluded());
        let row = SourceRow::unsalted(3, vec![Cell::Long(1)]).unwrap();
        pack.insert(row);
        assert!(pack.contains(3));
        assert!(!pack.contains(4));
        assert_eq!(pack.get(3).unwrap().number(), 3);
    }

    #[test]
    fn require_rows_covered_detects_gap() {
        let mut pack = SourcePack::new(SaltScheme::new([], Polarity::Exclude).unwrap());
        pack.insert(SourceRow::unsalted(5, vec![Cell::Null]).unwrap());
        assert!(require_rows_covered(&pack, &[1, 2, 3]).is_err());
        assert!(require_rows_covered(&pack, &[1, 5]).is_ok());
    }
}
