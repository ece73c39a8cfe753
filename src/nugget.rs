//! Nugget builder (§4.7, §C12): one ledger's evidence bundle — id,
//! multi-path, source rows, notarizations, foreign refs, and named assets.

use crate::cell::{Cell, SourceRow};
use crate::error::{Result, SldgError};
use crate::foreign::{ForeignRef, RefKind};
use crate::hash::Hash;
use crate::ledger::{LedgerId, LedgerType};
use crate::multipath::MultiPath;
use crate::notary::{NotarizedRow, NotaryPack};
use crate::path::Path;
use crate::salt::{EpochedTableSalt, SaltScheme, TableSaltEngine};
use crate::sourcepack::SourcePack;
use std::collections::{BTreeMap, BTreeSet};

/// Asset names starting with this prefix are reserved for library-defined
/// keys; embedders must not write assets under it.
pub const RESERVED_ASSET_PREFIX: &str = "sldg:";

/// Derives the effective salt for each column of a row under `scheme`, and
/// the resulting input hash, the way the nugget builder verifies a source
/// row: applying the engine's fresh derivation rather than trusting
/// whatever salt a caller-supplied `SourceRow` happens to carry.
///
/// The salts are returned alongside the hash (not discarded) because the
/// morsel format stores them per cell, letting a verifier without the
/// table-salt seed still recompute `cell_hash` from a plain cell value.
fn salt_and_hash_row(
    cells: &[Cell],
    row_no: u64,
    scheme: &SaltScheme,
    engine: &mut TableSaltEngine,
) -> (Vec<Option<[u8; 32]>>, Hash) {
    let salts: Vec<Option<[u8; 32]>> = (0..cells.len())
        .map(|col| engine.effective_cell_salt(scheme, row_no, col as i32))
        .collect();
    let hashes: Vec<[u8; 32]> = cells
        .iter()
        .zip(salts.iter())
        .map(|(cell, salt)| cell.cell_hash(salt.as_ref()))
        .collect();
    let parts: Vec<&[u8]> = hashes.iter().map(|h| h.as_slice()).collect();
    (salts, crate::hash::hash(&parts))
}

/// Mutable builder that accumulates one ledger's evidence bundle before
/// freezing it into an immutable [`Nugget`].
pub struct NuggetBuilder {
    id: LedgerId,
    multi_path: MultiPath,
    salt_engine: TableSaltEngine,
    salt_scheme: Option<SaltScheme>,
    source_pack: Option<SourcePack>,
    notary_packs: BTreeMap<u32, NotaryPack>,
    foreign_refs: BTreeMap<u32, Vec<ForeignRef>>,
    assets: BTreeMap<String, Vec<u8>>,
}

impl NuggetBuilder {
    pub fn new(id: LedgerId, first_path: Path, table_salt: EpochedTableSalt) -> Result<Self> {
        let multi_path = MultiPath::new(first_path)?;
        Ok(Self {
            id,
            multi_path,
            salt_engine: TableSaltEngine::new(table_salt),
            salt_scheme: None,
            source_pack: None,
            notary_packs: BTreeMap::new(),
            foreign_refs: BTreeMap::new(),
            assets: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &LedgerId {
        &self.id
    }

    /// Adds a path to the multi-path; returns the row numbers it shared
    /// with the existing covered set.
    pub fn add_path(&mut self, p: Path) -> Result<Vec<u64>> {
        let covered: BTreeSet<u64> = self.multi_path.covered_row_numbers().into_iter().collect();
        let intersect: Vec<u64> = p
            .covered_row_numbers()
            .into_iter()
            .filter(|n| covered.contains(n))
            .collect();
        self.multi_path.add_path(p)?;
        Ok(intersect)
    }

    /// Sets the salt scheme this nugget's source rows are hashed under.
    ///
    /// Legal only before the first source row is added, and only for
    /// ledger types that carry source rows at all. LOG ledgers reject a
    /// *mixed* scheme (non-empty index list with `Include` polarity).
    pub fn set_salt_scheme(&mut self, scheme: SaltScheme) -> Result<()> {
        if self.id.ledger_type().is_commits_only() {
            return Err(SldgError::unsupported(
                "commits-only ledgers do not carry a salt scheme",
            ));
        }
        if self.source_pack.is_some() {
            return Err(SldgError::unsupported(
                "salt scheme must be set before the first source row is added",
            ));
        }
        if matches!(self.id.ledger_type(), LedgerType::Log) && scheme.is_mixed() {
            return Err(SldgError::config(
                "mixed salt schemes are disallowed for LOG ledgers",
            ));
        }
        self.salt_scheme = Some(scheme);
        Ok(())
    }

    /// Adds a source row, after verifying that its (re-salted) input hash
    /// matches the multi-path's recorded input hash for that row number.
    pub fn add_source_row(&mut self, row_no: u64, cells: Vec<Cell>) -> Result<bool> {
        let scheme = self
            .salt_scheme
            .clone()
            .ok_or_else(|| SldgError::config("no salt scheme set on this nugget"))?;
        let expected = self.multi_path.input_hash(row_no).ok_or_else(|| {
            SldgError::out_of_bounds(format!(
                "row {row_no} has no recorded input hash in the multi-path"
            ))
        })?;

        let (salts, recomputed) = salt_and_hash_row(&cells, row_no, &scheme, &mut self.salt_engine);
        if recomputed != expected {
            return Err(SldgError::hash_conflict(format!(
                "source row {row_no} input hash does not match the multi-path"
            )));
        }

        let source_row = SourceRow::new(row_no, cells, salts)?;
        self.source_pack
            .get_or_insert_with(|| SourcePack::new(scheme))
            .insert(source_row);
        Ok(true)
    }

    /// Attaches a timechain's attestation that this nugget's row hash at
    /// `nr.timechain_row_no` equals `nr.timechain_row_hash`.
    pub fn add_notarized_row(&mut self, chain_id: u32, nr: NotarizedRow) -> Result<bool> {
        if chain_id == self.id.id() {
            return Err(SldgError::config(
                "a nugget cannot be notarized by itself",
            ));
        }
        let actual = self.multi_path.row_hash(nr.timechain_row_no).ok_or_else(|| {
            SldgError::out_of_bounds(format!(
                "row {} is not in the multi-path's covered set",
                nr.timechain_row_no
            ))
        })?;
        if actual != nr.timechain_row_hash {
            return Err(SldgError::hash_conflict(format!(
                "notarized row {} hash does not match the multi-path",
                nr.timechain_row_no
            )));
        }
        self.notary_packs
            .entry(chain_id)
            .or_insert_with(|| NotaryPack::new(chain_id))
            .push(nr);
        Ok(true)
    }

    /// Adds a cross-ledger reference. `expected`, if given, is compared
    /// against the referencing cell's current value.
    pub fn add_foreign_ref(
        &mut self,
        foreign_id: u32,
        reference: ForeignRef,
        expected: Option<&Cell>,
    ) -> Result<()> {
        let pack = self.source_pack.as_ref().ok_or_else(|| {
            SldgError::out_of_bounds("no source rows have been added to this nugget")
        })?;
        let row = pack.get(reference.from_row_no).ok_or_else(|| {
            SldgError::out_of_bounds(format!(
                "foreign ref's source row {} is not in this nugget",
                reference.from_row_no
            ))
        })?;

        match reference.kind {
            RefKind::SameContent => {
                if row.has_redactions() {
                    return Err(SldgError::unsupported(
                        "same-content ref requires a source row with no redactions",
                    ));
                }
                let cell = row
                    .cells()
                    .get(reference.from_col_index as usize)
                    .ok_or_else(|| SldgError::out_of_bounds("from_col_index out of range"))?;
                if let Some(exp) = expected {
                    if cell != exp {
                        return Err(SldgError::hash_conflict(
                            "same-content ref's expected value does not match",
                        ));
                    }
                }
            }
            RefKind::Beacon => {
                let cell = row
                    .cells()
                    .get(reference.from_col_index as usize)
                    .ok_or_else(|| SldgError::out_of_bounds("from_col_index out of range"))?;
                if cell.is_hash_only() {
                    return Err(SldgError::unsupported(
                        "beacon ref's referenced column must not be redacted",
                    ));
                }
                if let Some(exp) = expected {
                    if cell != exp {
                        return Err(SldgError::hash_conflict(
                            "beacon ref's expected value does not match",
                        ));
                    }
                }
            }
        }

        self.foreign_refs
            .entry(foreign_id)
            .or_default()
            .push(reference);
        Ok(())
    }

    /// Attaches a named binary asset. Names under [`RESERVED_ASSET_PREFIX`]
    /// are reserved for the library itself.
    pub fn add_asset(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<()> {
        let name = name.into();
        if name.starts_with(RESERVED_ASSET_PREFIX) {
            return Err(SldgError::config(format!(
                "asset name {name:?} uses the reserved {RESERVED_ASSET_PREFIX:?} prefix"
            )));
        }
        self.assets.insert(name, bytes);
        Ok(())
    }

    /// Freezes the builder into an immutable [`Nugget`].
    pub fn build(self) -> Nugget {
        Nugget {
            id: self.id,
            multi_path: self.multi_path,
            source_pack: self.source_pack,
            notary_packs: self.notary_packs.into_values().collect(),
            foreign_refs: self.foreign_refs,
            assets: self.assets,
        }
    }
}

/// One ledger's immutable evidence bundle.
#[derive(Debug)]
pub struct Nugget {
    id: LedgerId,
    multi_path: MultiPath,
    source_pack: Option<SourcePack>,
    notary_packs: Vec<NotaryPack>,
    foreign_refs: BTreeMap<u32, Vec<ForeignRef>>,
    assets: BTreeMap<String, Vec<u8>>,
}

impl Nugget {
    /// Assembles a nugget directly from its parts, bypassing the builder's
    /// incremental checks. Used when decoding a morsel blob whose
    /// commitments were already validated while parsing the multi-path.
    pub fn from_parts(
        id: LedgerId,
        multi_path: MultiPath,
        source_pack: Option<SourcePack>,
        notary_packs: Vec<NotaryPack>,
        foreign_refs: BTreeMap<u32, Vec<ForeignRef>>,
        assets: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            id,
            multi_path,
            source_pack,
            notary_packs,
            foreign_refs,
            assets,
        }
    }

    pub fn id(&self) -> &LedgerId {
        &self.id
    }

    pub fn multi_path(&self) -> &MultiPath {
        &self.multi_path
    }

    pub fn source_pack(&self) -> Option<&SourcePack> {
        self.source_pack.as_ref()
    }

    pub fn notary_packs(&self) -> &[NotaryPack] {
        &self.notary_packs
    }

    pub fn foreign_refs(&self) -> &BTreeMap<u32, Vec<ForeignRef>> {
        &self.foreign_refs
    }

    pub fn assets(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.assets
    }
}
