//! Source cell / source row (§4.3): the typed cell model, canonical
//! per-cell hashing with optional salt, and row-level input hashing.

use crate::error::{Result, SldgError};
use crate::hash::hash;

/// Discriminant byte for each [`Cell`] variant, mixed into the cell hash so
/// that e.g. `Null` and an empty `String` never collide.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Null = 0,
    Long = 1,
    Double = 2,
    String = 3,
    Date = 4,
    Bytes = 5,
    HashOnly = 6,
}

/// A typed cell value.
///
/// `HashOnly` represents a redacted cell: its hash is already final and
/// carries no salt (salting a hash that already stands in for a value
/// would just be redundant indirection).
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Long(i64),
    Double(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Bytes(Vec<u8>),
    HashOnly([u8; 32]),
}

impl Cell {
    fn tag(&self) -> Tag {
        match self {
            Cell::Null => Tag::Null,
            Cell::Long(_) => Tag::Long,
            Cell::Double(_) => Tag::Double,
            Cell::String(_) => Tag::String,
            Cell::Date(_) => Tag::Date,
            Cell::Bytes(_) => Tag::Bytes,
            Cell::HashOnly(_) => Tag::HashOnly,
        }
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Cell::Null => Vec::new(),
            Cell::Long(v) => v.to_be_bytes().to_vec(),
            Cell::Double(v) => v.to_be_bytes().to_vec(),
            Cell::String(s) => s.as_bytes().to_vec(),
            Cell::Date(v) => v.to_be_bytes().to_vec(),
            Cell::Bytes(b) => b.clone(),
            Cell::HashOnly(_) => Vec::new(),
        }
    }

    /// `cell_hash = HashOnly ? h : H(tag_byte ‖ canonical_bytes ‖ salt)`.
    pub fn cell_hash(&self, salt: Option<&[u8; 32]>) -> [u8; 32] {
        if let Cell::HashOnly(h) = self {
            return *h;
        }
        let tag = [self.tag() as u8];
        let canonical = self.canonical_bytes();
        let parts: Vec<&[u8]> = match salt {
            Some(s) => vec![&tag, &canonical, s],
            None => vec![&tag, &canonical],
        };
        *hash(&parts).as_bytes()
    }

    pub fn is_hash_only(&self) -> bool {
        matches!(self, Cell::HashOnly(_))
    }

    /// Replaces this cell with `HashOnly(cell_hash)`, preserving its hash.
    /// Idempotent: redacting an already-redacted cell is a no-op.
    pub fn redact(&self, salt: Option<&[u8; 32]>) -> Cell {
        Cell::HashOnly(self.cell_hash(salt))
    }
}

/// An ordered vector of cells plus a positive row number.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    number: u64,
    cells: Vec<Cell>,
    /// Per-column salts used when this row's cells were hashed, aligned by
    /// index with `cells`. `None` at index `i` means column `i` was not
    /// salted (or the cell is `HashOnly` and salting is moot).
    salts: Vec<Option<[u8; 32]>>,
}

impl SourceRow {
    /// Validates column count > 0 and builds the row. `salts` must be the
    /// same length as `cells` (pass `None` for unsalted columns).
    pub fn new(number: u64, cells: Vec<Cell>, salts: Vec<Option<[u8; 32]>>) -> Result<Self> {
        if cells.is_empty() {
            return Err(SldgError::config("source row must have at least one column"));
        }
        if number == 0 {
            return Err(SldgError::out_of_bounds("row number must be positive"));
        }
        if salts.len() != cells.len() {
            return Err(SldgError::internal(
                "salts vector length must match cell count",
            ));
        }
        Ok(Self {
            number,
            cells,
            salts,
        })
    }

    /// Builds a row with no per-cell salts applied.
    pub fn unsalted(number: u64, cells: Vec<Cell>) -> Result<Self> {
        let n = cells.len();
        Self::new(number, cells, vec![None; n])
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn column_count(&self) -> usize {
        self.cells.len()
    }

    /// Per-column salts used when this row's cells were hashed, aligned by
    /// index with [`SourceRow::cells`]. A morsel writer needs these to
    /// serialize cells so a verifier without the table-salt seed can still
    /// recompute `cell_hash` and check it against the committed input hash.
    pub fn salts(&self) -> &[Option<[u8; 32]>] {
        &self.salts
    }

    pub fn has_redactions(&self) -> bool {
        self.cells.iter().any(Cell::is_hash_only)
    }

    fn cell_hashes(&self) -> Vec<[u8; 32]> {
        self.cells
            .iter()
            .zip(self.salts.iter())
            .map(|(c, s)| c.cell_hash(s.as_ref()))
            .collect()
    }

    /// `input_hash = H(cell_hash_0 ‖ cell_hash_1 ‖ … ‖ cell_hash_{c-1})`.
    pub fn input_hash(&self) -> [u8; 32] {
        let hashes = self.cell_hashes();
        let parts: Vec<&[u8]> = hashes.iter().map(|h| h.as_slice()).collect();
        *hash(&parts).as_bytes()
    }

    /// Replaces column `col` with `HashOnly(cell_hash)`. Preserves
    /// `input_hash` and is idempotent.
    pub fn redact(&self, col: usize) -> Result<SourceRow> {
        if col >= self.cells.len() {
            return Err(SldgError::out_of_bounds(format!(
                "column {col} out of range for {}-column row",
                self.cells.len()
            )));
        }
        let mut cells = self.cells.clone();
        let mut salts = self.salts.clone();
        cells[col] = cells[col].redact(salts[col].as_ref());
        salts[col] = None;
        Ok(SourceRow {
            number: self.number,
            cells,
            salts,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn row() -> SourceRow {
        SourceRow::unsalted(
            1,
            vec![
                Cell::Long(42),
                Cell::String("hello".into()),
                Cell::Null,
            ],
        )
        .unwrap()
    }

    #[test]
    fn identical_rows_hash_identically() {
        let a = row();
        let b = row();
        assert_eq!(a.input_hash(), b.input_hash());
    }

    #[test]
    fn redaction_preserves_input_hash() {
        let r = row();
        let before = r.input_hash();
        let redacted = r.redact(1).unwrap();
        assert_eq!(redacted.input_hash(), before);
        assert!(redacted.has_redactions());
    }

    #[test]
    fn redaction_is_idempotent() {
        let r = row();
        let once = r.redact(0).unwrap();
        let twice = once.redact(0).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn different_values_hash_differently() {
        let a = SourceRow::unsalted(1, vec![Cell::Long(1)]).unwrap();
        let b = SourceRow::unsalted(1, vec![Cell::Long(2)]).unwrap();
        assert_ne!(a.input_hash(), b.input_hash());
    }

    #[test]
    fn salt_changes_cell_hash_but_not_value_identity() {
        let unsalted = Cell::Long(7).cell_hash(None);
        let salted = Cell::Long(7).cell_hash(Some(&[1u8; 32]));
        assert_ne!(unsalted, salted);
    }

    #[test]
    fn rejects_zero_columns() {
        assert!(SourceRow::unsalted(1, vec![]).is_err());
    }

    #[test]
    fn rejects_row_number_zero() {
        assert!(SourceRow::unsalted(0, vec![Cell::Null]).is_err());
    }

    #[test]
    fn hash_only_ignores_salt() {
        let h = [3u8; 32];
        let c = Cell::HashOnly(h);
        assert_eq!(c.cell_hash(None), h);
        assert_eq!(c.cell_hash(Some(&[9u8; 32])), h);
    }
}
