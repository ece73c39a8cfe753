// demos/full_workflow.rs
// Complete sldg workflow: ingest rows -> skip-table -> commitment paths ->
// nugget -> morsel file -> reload -> verify.

use sldg::{
    b64_32_encode, hash, Cell, EpochedTableSalt, HashFrontier, LedgerId, LedgerType, MemSkipTable,
    MultiPath, NuggetBuilder, Path, PathRow, SaltScheme, SkipTable,
};
use std::collections::BTreeMap;

/// `input_hash = H(cell_hash_0 ‖ cell_hash_1 ‖ …)` with no salting, matching
/// how an unsalted ingester derives the per-row input hash before it ever
/// touches the skip-table (§4.3/§4.4).
fn input_hash_for(cells: &[Cell]) -> sldg::Hash {
    let hashes: Vec<[u8; 32]> = cells.iter().map(|c| c.cell_hash(None)).collect();
    let parts: Vec<&[u8]> = hashes.iter().map(|h| h.as_slice()).collect();
    hash(&parts)
}

/// Builds a path densely covering rows `1..=row_no`. Every row a listed
/// row back-references must itself be listed for `validate()` to replay
/// it, so this is the simplest construction that is always valid — a real
/// emitter instead picks the sparse O(log n) skip-linked rows a proof
/// actually needs.
fn build_path(
    row_hashes: &BTreeMap<u64, sldg::Hash>,
    input_hashes: &BTreeMap<u64, sldg::Hash>,
    row_no: u64,
) -> Path {
    let path_rows: Vec<PathRow> = (1..=row_no)
        .map(|n| PathRow {
            row_no: n,
            row_hash: row_hashes[&n],
            input_hash: Some(input_hashes[&n]),
        })
        .collect();

    Path::new(path_rows).unwrap()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== sldg: skip-ledger full workflow ===\n");

    // STEP 1: ingest source rows, deriving each row's input hash and
    // advancing the in-memory hash frontier one row at a time.
    println!("STEP 1: Ingest (rows 1-8)");
    println!("=========================");

    let table = MemSkipTable::new();
    let mut frontier = HashFrontier::empty();
    let mut row_hashes: BTreeMap<u64, sldg::Hash> = BTreeMap::new();
    let mut input_hashes: BTreeMap<u64, sldg::Hash> = BTreeMap::new();
    let mut source_rows: BTreeMap<u64, Vec<Cell>> = BTreeMap::new();

    for n in 1u64..=8 {
        let cells = vec![Cell::Long(n as i64), Cell::String(format!("event-{n}"))];
        let input_hash = input_hash_for(&cells);

        frontier = if n == 1 {
            HashFrontier::first_row(input_hash)
        } else {
            frontier.next_row(input_hash)
        };
        let row_hash = frontier.row_hash().unwrap();
        row_hashes.insert(n, row_hash);
        input_hashes.insert(n, input_hash);
        source_rows.insert(n, cells);

        table.append(n, &[(input_hash, row_hash)]).await?;
        println!(
            "  row {n}: input_hash={} row_hash={}",
            b64_32_encode(input_hash.as_bytes()),
            b64_32_encode(row_hash.as_bytes())
        );
    }

    // STEP 2: load the frontier back from the skip-table independently and
    // confirm it agrees with the one built incrementally (S1).
    println!("\nSTEP 2: Frontier/skip-table agreement");
    println!("======================================");
    let loaded = HashFrontier::load(&table, 8).await?;
    println!(
        "  incremental frontier row_hash == loaded frontier row_hash: {}",
        loaded.row_hash() == frontier.row_hash()
    );

    // STEP 3: build a commitment path to row 8 and assemble a nugget.
    println!("\nSTEP 3: Build nugget (path + source rows)");
    println!("==========================================");
    let path = build_path(&row_hashes, &input_hashes, 8);
    let ledger_id = LedgerId::new(1, LedgerType::Log, "demo-ledger").unwrap();
    let covered = path.covered_row_numbers();
    let mut builder =
        NuggetBuilder::new(ledger_id.clone(), path, EpochedTableSalt::single([0u8; 32]))?;
    builder.set_salt_scheme(SaltScheme::all_excluded())?;

    for n in &covered {
        if let Some(cells) = source_rows.get(n) {
            builder.add_source_row(*n, cells.clone())?;
            println!("  attached source row {n}");
        }
    }
    let nugget = builder.build();
    println!(
        "  nugget covers {} rows, carries {} source rows",
        nugget.multi_path().covered_row_numbers().len(),
        nugget.source_pack().map(|p| p.len()).unwrap_or(0)
    );

    // STEP 4: write the nugget into a morsel file.
    println!("\nSTEP 4: Write morsel");
    println!("====================");
    let dir = std::env::temp_dir().join("sldg-demo");
    let _ = std::fs::remove_dir_all(&dir);
    let morsel_path = dir.join("demo.morsel");
    sldg::write_morsel(&morsel_path, &[(ledger_id, nugget)]).await?;
    println!("  wrote {}", morsel_path.display());

    // STEP 5: reopen the morsel lazily and verify the reloaded nugget.
    println!("\nSTEP 5: Reload and verify");
    println!("=========================");
    let handle = sldg::MorselHandle::open_file(&morsel_path).await?;
    println!("  morsel carries {} ledger id(s)", handle.ids().len());
    let reloaded = handle.load_nugget(1).await?;
    let no_foreign: BTreeMap<u32, &sldg::Nugget> = BTreeMap::new();
    let outcome = sldg::verify_nugget(&reloaded, &no_foreign)?;
    println!(
        "  verified: {} paths, {} source rows, {} notarized rows, {} foreign refs",
        outcome.paths_checked,
        outcome.source_rows_checked,
        outcome.notarized_rows_checked,
        outcome.foreign_refs_checked
    );

    // STEP 6: demonstrate multi-path merging of two overlapping paths.
    println!("\nSTEP 6: Multi-path merge (overlapping coverage)");
    println!("================================================");
    let path_to_8 = build_path(&row_hashes, &input_hashes, 8);
    let path_to_4 = build_path(&row_hashes, &input_hashes, 4);
    let mut multi = MultiPath::new(path_to_8)?;
    multi.add_path(path_to_4)?;
    println!("  merged coverage: {:?}", multi.covered_row_numbers());

    println!("\n=== Workflow complete ===");
    Ok(())
}
