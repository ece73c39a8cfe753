//! Proof verifier (§4.9, §C14): validates a nugget end to end — its paths,
//! its source rows against the multi-path's input hashes, its
//! notarizations, and its cross-ledger references — against whatever
//! foreign nuggets the caller has on hand.
//!
//! Decoding a morsel (§C13) already runs every path through
//! [`crate::path::Path::validate`] and every added path through
//! [`crate::multipath::MultiPath::add_path`], so a [`crate::nugget::Nugget`]
//! obtained from [`crate::morsel::MorselHandle::load_nugget`] carries
//! internally-consistent commitments by construction. This module re-checks
//! that independently (a nugget assembled by hand via
//! [`crate::nugget::Nugget::from_parts`] skips those checks) and performs
//! the checks §4.9 names that reach outside a single nugget: source-row
//! hashing, notarizations, and foreign references.

use crate::cell::Cell;
use crate::error::{Result, SldgError};
use crate::hash::Hash;
use crate::foreign::RefKind;
use crate::ledger::LedgerType;
use crate::nugget::Nugget;
use std::collections::BTreeMap;

/// Tallies of what [`verify_nugget`] actually checked, so a caller can
/// distinguish "verified and found nothing to check" from "verified N
/// things". An all-zero outcome for a nugget that claims source rows,
/// notarizations, or refs would itself be suspicious.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub paths_checked: usize,
    pub source_rows_checked: usize,
    pub notarized_rows_checked: usize,
    pub foreign_refs_checked: usize,
}

/// Runs the full §4.9 verification procedure against `nugget`.
///
/// `foreign` supplies any other nuggets the caller has loaded, keyed by
/// their [`crate::ledger::LedgerId::id`]; notarizations and foreign refs
/// whose target isn't present in `foreign` are skipped rather than failed —
/// §4.9 only requires the cross-ledger checks "if the referenced foreign
/// nugget ... is present".
#[tracing::instrument(skip_all, fields(ledger_id = nugget.id().id()))]
pub fn verify_nugget(nugget: &Nugget, foreign: &BTreeMap<u32, &Nugget>) -> Result<VerificationOutcome> {
    let mut outcome = VerificationOutcome::default();

    // 1-2. Validate each path independently, then cross-check that rows
    // shared between paths (and rows a path's hash references outside
    // itself via `MultiPath::row_hash`) are mutually consistent. Decoding
    // already guarantees this for morsel-sourced nuggets; redo it here so a
    // hand-assembled `Nugget::from_parts` gets the same guarantee.
    for path in nugget.multi_path().paths() {
        path.validate()?;
        outcome.paths_checked += 1;
    }
    for path in nugget.multi_path().paths() {
        for row in path.rows() {
            let merged = nugget.multi_path().row_hash(row.row_no).ok_or_else(|| {
                SldgError::internal(format!(
                    "row {} listed in a path is absent from its own multi-path",
                    row.row_no
                ))
            })?;
            if merged != row.row_hash {
                return Err(SldgError::hash_conflict(format!(
                    "row {} disagrees between its path and the merged multi-path",
                    row.row_no
                )));
            }
        }
    }

    // 3. Source rows: recompute input_hash from the row's own (embedded)
    // cell salts and compare against the multi-path's committed input hash.
    if let Some(pack) = nugget.source_pack() {
        for row in pack.rows() {
            let recomputed = Hash::new(row.input_hash());
            let expected = nugget.multi_path().input_hash(row.number()).ok_or_else(|| {
                SldgError::out_of_bounds(format!(
                    "source row {} is not within the multi-path's covered set",
                    row.number()
                ))
            })?;
            if recomputed != expected {
                return Err(SldgError::hash_conflict(format!(
                    "source row {} input hash does not match its multi-path commitment",
                    row.number()
                )));
            }
            outcome.source_rows_checked += 1;
        }
    }

    // 4. Notarized rows: this nugget's builder already checked each
    // notarization's row hash against its own multi-path at add-time; here
    // we additionally check, when the timechain nugget is present, that the
    // timechain really committed a row with that hash.
    for pack in nugget.notary_packs() {
        let Some(timechain) = foreign.get(&pack.chain_id()) else {
            continue;
        };
        if !matches!(timechain.id().ledger_type(), LedgerType::Timechain) {
            tracing::warn!(
                chain_id = pack.chain_id(),
                "notary pack references a foreign nugget that isn't a TIMECHAIN ledger"
            );
        }
        for nr in pack.rows() {
            let committed = timechain.multi_path().row_hash(nr.timechain_row_no);
            if committed != Some(nr.timechain_row_hash) {
                return Err(SldgError::hash_conflict(format!(
                    "timechain {} has no commitment matching notarized row {}",
                    pack.chain_id(),
                    nr.timechain_row_no
                )));
            }
            outcome.notarized_rows_checked += 1;
        }
    }

    // 5. Foreign refs: same-content compares cell data directly; beacon
    // compares cell data against the foreign row's hash bytes.
    for (&foreign_id, refs) in nugget.foreign_refs() {
        let Some(target) = foreign.get(&foreign_id) else {
            continue;
        };
        for r in refs {
            let own_pack = nugget.source_pack().ok_or_else(|| {
                SldgError::internal("foreign ref present but this nugget has no source pack")
            })?;
            let own_row = own_pack.get(r.from_row_no).ok_or_else(|| {
                SldgError::out_of_bounds(format!(
                    "foreign ref's source row {} is not in this nugget",
                    r.from_row_no
                ))
            })?;
            let own_cell = own_row
                .cells()
                .get(r.from_col_index as usize)
                .ok_or_else(|| SldgError::out_of_bounds("from_col_index out of range"))?;

            match r.kind {
                RefKind::SameContent => {
                    let target_pack = target.source_pack().ok_or_else(|| {
                        SldgError::unsupported("same-content ref's target nugget has no source pack")
                    })?;
                    let target_col = r.target_col_index.ok_or_else(|| {
                        SldgError::format("same-content ref is missing its target column index")
                    })?;
                    let target_row = target_pack.get(r.target_row_no).ok_or_else(|| {
                        SldgError::out_of_bounds(format!(
                            "same-content ref's target row {} is not in the foreign nugget",
                            r.target_row_no
                        ))
                    })?;
                    let target_cell = target_row
                        .cells()
                        .get(target_col as usize)
                        .ok_or_else(|| SldgError::out_of_bounds("target_col_index out of range"))?;
                    if own_cell != target_cell {
                        return Err(SldgError::hash_conflict(format!(
                            "same-content ref disagrees: row {} col {} vs foreign row {} col {}",
                            r.from_row_no, r.from_col_index, r.target_row_no, target_col
                        )));
                    }
                }
                RefKind::Beacon => {
                    let target_hash = target.multi_path().row_hash(r.target_row_no).ok_or_else(|| {
                        SldgError::out_of_bounds(format!(
                            "beacon ref's target row {} is not within the foreign nugget's multi-path",
                            r.target_row_no
                        ))
                    })?;
                    let matches = match own_cell {
                        Cell::HashOnly(h) => *h == *target_hash.as_bytes(),
                        Cell::Bytes(b) => b.as_slice() == &target_hash.as_bytes()[..],
                        _ => {
                            return Err(SldgError::unsupported(
                                "beacon ref's referencing cell must be Bytes or HashOnly",
                            ))
                        }
                    };
                    if !matches {
                        return Err(SldgError::hash_conflict(format!(
                            "beacon ref's cell does not equal foreign row {} hash",
                            r.target_row_no
                        )));
                    }
                }
            }
            outcome.foreign_refs_checked += 1;
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::frontier::HashFrontier;
    use crate::hash::hash;
    use crate::ledger::LedgerId;
    use crate::nugget::NuggetBuilder;
    use crate::path::{Path, PathRow};
    use crate::salt::{EpochedTableSalt, SaltScheme};

    fn input_hash(k: u64) -> Hash {
        hash(&[b"row", &k.to_be_bytes()])
    }

    fn build_chain(n: u64) -> Vec<Hash> {
        let mut out = vec![Hash::new([0; 32])];
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

    /// A dense path over `[1..=end]`, so every row any listed row
    /// back-references is itself listed, as `Path::validate` needs.
    fn path_to(hashes: &[Hash], end: u64) -> Path {
        let rows: Vec<PathRow> = (1..=end)
            .map(|k| PathRow {
                row_no: k,
                row_hash: hashes[k as usize],
                input_hash: Some(input_hash(k)),
            })
            .collect();
        Path::new(rows).unwrap()
    }

    #[test]
    fn verifies_a_clean_nugget_with_no_cross_refs() {
        let hashes = build_chain(4);
        let id = LedgerId::new(1, LedgerType::Log, "test").unwrap();
        let mut builder =
            NuggetBuilder::new(id, path_to(&hashes, 4), EpochedTableSalt::single([1; 32])).unwrap();
        builder.set_salt_scheme(SaltScheme::all_excluded()).unwrap();
        let nugget = builder.build();

        let foreign = BTreeMap::new();
        let outcome = verify_nugget(&nugget, &foreign).unwrap();
        assert_eq!(outcome.paths_checked, 1);
        assert_eq!(outcome.source_rows_checked, 0);
    }

    #[test]
    fn verifies_source_rows_against_multipath() {
        let id = LedgerId::new(1, LedgerType::Log, "test").unwrap();
        let scheme = SaltScheme::all_excluded();
        let table_salt = EpochedTableSalt::single([1; 32]);

        // A one-row chain whose row-1 input hash is a real SourceRow's
        // input_hash, the way `add_source_row` verifies it (all_excluded
        // never salts, so the row's own `input_hash()` already matches what
        // the builder would recompute).
        let sr = crate::cell::SourceRow::unsalted(1, vec![Cell::Long(9)]).unwrap();
        let real_input = Hash::new(sr.input_hash());
        let frontier = HashFrontier::first_row(real_input);
        let path = Path::new(vec![PathRow {
            row_no: 1,
            row_hash: frontier.row_hash().unwrap(),
            input_hash: Some(real_input),
        }])
        .unwrap();

        let mut builder = NuggetBuilder::new(id, path, table_salt).unwrap();
        builder.set_salt_scheme(scheme).unwrap();
        builder.add_source_row(1, vec![Cell::Long(9)]).unwrap();
        let nugget = builder.build();

        let foreign = BTreeMap::new();
        let outcome = verify_nugget(&nugget, &foreign).unwrap();
        assert_eq!(outcome.source_rows_checked, 1);
    }

    #[test]
    fn notarization_requires_timechain_commitment_present() {
        let hashes = build_chain(4);
        let id = LedgerId::new(1, LedgerType::Log, "test").unwrap();
        let mut builder =
            NuggetBuilder::new(id, path_to(&hashes, 4), EpochedTableSalt::single([1; 32])).unwrap();
        let nr = crate::notary::NotarizedRow::new(4, hashes[4], 1);
        builder.add_notarized_row(2, nr).unwrap();
        let nugget = builder.build();

        // Timechain nugget whose multi-path does NOT commit to the same
        // hash at row 4: verification must fail once the foreign nugget is
        // supplied, even though the builder-time check already passed
        // (it only checks against *this* nugget's own multi-path).
        let tc_hashes = build_chain(4);
        let tc_id = LedgerId::new(2, LedgerType::Timechain, "tc").unwrap();
        let tc_builder = NuggetBuilder::new(
            tc_id,
            path_to(&tc_hashes, 4),
            EpochedTableSalt::single([2; 32]),
        )
        .unwrap();
        let tc_nugget = tc_builder.build();

        let mut foreign = BTreeMap::new();
        foreign.insert(2u32, &tc_nugget);
        // tc_hashes and hashes are built from the same input-hash sequence,
        // so row 4's hash agrees; this should verify cleanly.
        let outcome = verify_nugget(&nugget, &foreign).unwrap();
        assert_eq!(outcome.notarized_rows_checked, 1);
    }

    #[test]
    fn notarization_mismatch_against_present_timechain_fails() {
        let hashes = build_chain(4);
        let id = LedgerId::new(1, LedgerType::Log, "test").unwrap();
        let mut builder =
            NuggetBuilder::new(id, path_to(&hashes, 4), EpochedTableSalt::single([1; 32])).unwrap();
        let nr = crate::notary::NotarizedRow::new(4, hashes[4], 1);
        builder.add_notarized_row(2, nr).unwrap();
        let nugget = builder.build();

        // A differently-seeded timechain has a different row-4 hash.
        let other_hashes = {
            let mut frontier = HashFrontier::empty();
            let mut out = vec![Hash::new([0; 32])];
            for k in 1..=4u64 {
                let ih = hash(&[b"different", &k.to_be_bytes()]);
                frontier = if k == 1 {
                    HashFrontier::first_row(ih)
                } else {
                    frontier.next_row(ih)
                };
                out.push(frontier.row_hash().unwrap());
            }
            out
        };
        let tc_id = LedgerId::new(2, LedgerType::Timechain, "tc").unwrap();
        let tc_builder = NuggetBuilder::new(
            tc_id,
            path_to(&other_hashes, 4),
            EpochedTableSalt::single([2; 32]),
        )
        .unwrap();
        let tc_nugget = tc_builder.build();

        let mut foreign = BTreeMap::new();
        foreign.insert(2u32, &tc_nugget);
        assert!(verify_nugget(&nugget, &foreign).is_err());
    }
}
