//! Morsel file format (§4.8, §6.1, §C13): a self-contained, random-access
//! proof container bundling one or more nuggets.
//!
//! `MORSEL_FILE := MAGIC[6] VERSION[2] IDS_COUNT[4] IDS_BLOCK PARTITION_COUNT[4]
//! PARTITION_INDEX NUGGET_BLOBS`. All integers are big-endian; see §6.1 for
//! the exact field layout this module encodes and decodes bit-for-bit.

use crate::cell::{Cell, SourceRow};
use crate::error::{Result, SldgError};
use crate::foreign::{ForeignRef, RefKind};
use crate::hash::Hash;
use crate::ledger::{LedgerId, LedgerType};
use crate::multipath::MultiPath;
use crate::notary::{NotarizedRow, NotaryPack};
use crate::nugget::Nugget;
use crate::path::{Path as CommitPath, PathRow};
use crate::salt::{Polarity, SaltScheme};
use std::collections::BTreeMap;
use std::path::Path as FsPath;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

pub const MAGIC: [u8; 6] = *b"MORSEL";
pub const SUPPORTED_VERSION: u16 = 1;

// --- byte-level encode/decode ------------------------------------------

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}
fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}
fn push_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}
fn push_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}
fn push_hash(buf: &mut Vec<u8>, h: &Hash) {
    buf.extend_from_slice(h.as_bytes());
}

/// A forward-only cursor over an in-memory byte buffer, used to decode the
/// morsel format's fixed-width fields without pulling in a serde codec for
/// what is, end to end, a bespoke binary layout.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(SldgError::format("morsel: unexpected end of data"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        let arr: [u8; 2] = self
            .take(2)?
            .try_into()
            .map_err(|_| SldgError::internal("morsel: Reader::take returned the wrong width"))?;
        Ok(u16::from_be_bytes(arr))
    }
    fn u32(&mut self) -> Result<u32> {
        let arr: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| SldgError::internal("morsel: Reader::take returned the wrong width"))?;
        Ok(u32::from_be_bytes(arr))
    }
    fn u64(&mut self) -> Result<u64> {
        let arr: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| SldgError::internal("morsel: Reader::take returned the wrong width"))?;
        Ok(u64::from_be_bytes(arr))
    }
    fn i32(&mut self) -> Result<i32> {
        let arr: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| SldgError::internal("morsel: Reader::take returned the wrong width"))?;
        Ok(i32::from_be_bytes(arr))
    }
    fn hash(&mut self) -> Result<Hash> {
        let arr: [u8; 32] = self
            .take(32)?
            .try_into()
            .map_err(|_| SldgError::internal("morsel: Reader::take returned the wrong width"))?;
        Ok(Hash::new(arr))
    }
    fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }
}

// --- LEDGER_ID -----------------------------------------------------------

fn encode_ledger_id(id: &LedgerId) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, id.id());
    out.push(id.ledger_type().tag());
    let mut meta = Vec::new();
    for (k, v) in id.metadata() {
        meta.extend_from_slice(k.as_bytes());
        meta.push(b'=');
        meta.extend_from_slice(v.as_bytes());
        meta.push(b'\n');
    }
    push_u32(&mut out, meta.len() as u32);
    out.extend_from_slice(&meta);
    out
}

fn ledger_id_from_fields(id_no: u32, type_tag: u8, meta_bytes: Vec<u8>) -> Result<LedgerId> {
    let meta_text = String::from_utf8(meta_bytes)
        .map_err(|_| SldgError::format("morsel: ledger id metadata is not valid utf-8"))?;

    let mut name = String::new();
    let mut extra: Vec<(String, String)> = Vec::new();
    for line in meta_text.lines() {
        if let Some((k, v)) = line.split_once('=') {
            if k == "name" {
                name = v.to_string();
            } else {
                extra.push((k.to_string(), v.to_string()));
            }
        }
    }

    let mut out = LedgerId::new(id_no, LedgerType::from_tag(type_tag), name)
        .ok_or_else(|| SldgError::format("morsel: ledger id 0 is reserved"))?;
    for (k, v) in extra {
        out = out.with_metadata(k, v);
    }
    Ok(out)
}

fn decode_ledger_id(r: &mut Reader) -> Result<LedgerId> {
    let id_no = r.u32()?;
    let type_tag = r.take(1)?[0];
    let meta_len = r.u32()? as usize;
    let meta_bytes = r.bytes(meta_len)?;
    ledger_id_from_fields(id_no, type_tag, meta_bytes)
}

// --- MULTI_PATH ------------------------------------------------------------

fn encode_multi_path(mp: &MultiPath) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    push_u32(&mut out, mp.paths().len() as u32);
    for path in mp.paths() {
        push_u32(&mut out, path.rows().len() as u32);
        for row in path.rows() {
            push_u64(&mut out, row.row_no);
        }
        for row in path.rows() {
            push_hash(&mut out, &row.row_hash);
        }
        for row in path.rows().iter().skip(1) {
            let ih = row.input_hash.ok_or_else(|| {
                SldgError::internal(
                    "morsel: non-terminal path row carries no input hash at encode time",
                )
            })?;
            push_hash(&mut out, &ih);
        }
    }
    Ok(out)
}

fn decode_multi_path(r: &mut Reader) -> Result<MultiPath> {
    let path_count = r.u32()?;
    if path_count == 0 {
        return Err(SldgError::format("morsel: multi-path must have at least one path"));
    }
    let mut paths = Vec::with_capacity(path_count as usize);
    for _ in 0..path_count {
        let row_count = r.u32()? as usize;
        if row_count == 0 {
            return Err(SldgError::format("morsel: path must have at least one row"));
        }
        let row_nos: Vec<u64> = (0..row_count).map(|_| r.u64()).collect::<Result<_>>()?;
        let row_hashes: Vec<Hash> = (0..row_count).map(|_| r.hash()).collect::<Result<_>>()?;
        let input_hashes: Vec<Hash> = (0..row_count - 1).map(|_| r.hash()).collect::<Result<_>>()?;

        let mut rows = Vec::with_capacity(row_count);
        for i in 0..row_count {
            rows.push(PathRow {
                row_no: row_nos[i],
                row_hash: row_hashes[i],
                input_hash: if i == 0 { None } else { Some(input_hashes[i - 1]) },
            });
        }
        paths.push(CommitPath::new(rows)?);
    }

    let mut iter = paths.into_iter();
    let first = iter.next().ok_or_else(|| {
        SldgError::internal("morsel: path_count was validated non-zero but no path was decoded")
    })?;
    let mut mp = MultiPath::new(first)?;
    for p in iter {
        mp.add_path(p)?;
    }
    Ok(mp)
}

// --- SOURCE_PACK -----------------------------------------------------------

fn encode_salt_scheme(scheme: &SaltScheme) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(match scheme.polarity() {
        Polarity::Exclude => 0,
        Polarity::Include => 1,
    });
    let indices: Vec<i32> = scheme.indices().collect();
    push_u16(&mut out, indices.len() as u16);
    for c in indices {
        push_i32(&mut out, c);
    }
    out
}

fn decode_salt_scheme(r: &mut Reader) -> Result<SaltScheme> {
    let polarity = match r.take(1)?[0] {
        0 => Polarity::Exclude,
        1 => Polarity::Include,
        other => {
            return Err(SldgError::format(format!(
                "morsel: unknown salt scheme polarity tag {other}"
            )))
        }
    };
    let col_count = r.u16()? as usize;
    let mut indices = Vec::with_capacity(col_count);
    for _ in 0..col_count {
        indices.push(r.i32()?);
    }
    SaltScheme::new(indices, polarity)
}

fn encode_cell(cell: &Cell, salt: Option<&[u8; 32]>) -> Vec<u8> {
    let mut out = Vec::new();
    let (tag, bytes): (u8, Vec<u8>) = match cell {
        Cell::Null => (0, Vec::new()),
        Cell::Long(v) => (1, v.to_be_bytes().to_vec()),
        Cell::Double(v) => (2, v.to_be_bytes().to_vec()),
        Cell::String(s) => (3, s.as_bytes().to_vec()),
        Cell::Date(v) => (4, v.to_be_bytes().to_vec()),
        Cell::Bytes(b) => (5, b.clone()),
        Cell::HashOnly(h) => (6, h.to_vec()),
    };
    out.push(tag);
    push_u32(&mut out, bytes.len() as u32);
    out.extend_from_slice(&bytes);
    if !matches!(cell, Cell::HashOnly(_)) {
        if let Some(s) = salt {
            out.push(1);
            out.extend_from_slice(s);
        } else {
            out.push(0);
        }
    }
    out
}

fn decode_cell(r: &mut Reader) -> Result<(Cell, Option<[u8; 32]>)> {
    let tag = r.take(1)?[0];
    let len = r.u32()? as usize;
    let bytes = r.bytes(len)?;
    let cell = match tag {
        0 => Cell::Null,
        1 => Cell::Long(i64::from_be_bytes(
            bytes.as_slice().try_into().map_err(|_| bad_cell_len("Long"))?,
        )),
        2 => Cell::Double(f64::from_be_bytes(
            bytes.as_slice().try_into().map_err(|_| bad_cell_len("Double"))?,
        )),
        3 => Cell::String(
            String::from_utf8(bytes).map_err(|_| SldgError::format("morsel: cell string is not valid utf-8"))?,
        ),
        4 => Cell::Date(i64::from_be_bytes(
            bytes.as_slice().try_into().map_err(|_| bad_cell_len("Date"))?,
        )),
        5 => Cell::Bytes(bytes),
        6 => Cell::HashOnly(bytes.as_slice().try_into().map_err(|_| bad_cell_len("HashOnly"))?),
        other => return Err(SldgError::format(format!("morsel: unknown cell tag {other}"))),
    };
    let salt = if tag == 6 {
        None
    } else {
        match r.take(1)?[0] {
            0 => None,
            1 => {
                let bytes = r.bytes(32)?;
                let arr: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| SldgError::internal("morsel: Reader::bytes(32) returned the wrong width"))?;
                Some(arr)
            }
            other => return Err(SldgError::format(format!("morsel: bad salt-present flag {other}"))),
        }
    };
    Ok((cell, salt))
}

fn bad_cell_len(variant: &str) -> SldgError {
    SldgError::format(format!("morsel: wrong byte length for {variant} cell"))
}

fn encode_source_pack(pack: &crate::sourcepack::SourcePack) -> Vec<u8> {
    let mut out = encode_salt_scheme(pack.salt_scheme());
    let rows: Vec<&SourceRow> = pack.rows().collect();
    push_u32(&mut out, rows.len() as u32);
    for row in rows {
        push_u64(&mut out, row.number());
        push_u16(&mut out, row.column_count() as u16);
        for (cell, salt) in row.cells().iter().zip(row.salts()) {
            out.extend_from_slice(&encode_cell(cell, salt.as_ref()));
        }
    }
    out
}

fn decode_source_pack(r: &mut Reader) -> Result<crate::sourcepack::SourcePack> {
    let scheme = decode_salt_scheme(r)?;
    let mut pack = crate::sourcepack::SourcePack::new(scheme);
    let row_count = r.u32()?;
    for _ in 0..row_count {
        let row_no = r.u64()?;
        let col_count = r.u16()? as usize;
        let mut cells = Vec::with_capacity(col_count);
        let mut salts = Vec::with_capacity(col_count);
        for _ in 0..col_count {
            let (cell, salt) = decode_cell(r)?;
            cells.push(cell);
            salts.push(salt);
        }
        pack.insert(SourceRow::new(row_no, cells, salts)?);
    }
    Ok(pack)
}

// --- NOTARY_LIST -------------------------------------------------------

fn encode_notary_list(packs: &[NotaryPack]) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, packs.len() as u32);
    for pack in packs {
        push_u32(&mut out, pack.chain_id());
        push_u32(&mut out, pack.rows().len() as u32);
        for row in pack.rows() {
            push_u64(&mut out, row.timechain_row_no);
            push_hash(&mut out, &row.timechain_row_hash);
            push_u64(&mut out, row.witness_block);
        }
    }
    out
}

fn decode_notary_list(r: &mut Reader) -> Result<Vec<NotaryPack>> {
    let count = r.u32()?;
    let mut packs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let chain_id = r.u32()?;
        let nr_count = r.u32()?;
        let mut pack = NotaryPack::new(chain_id);
        for _ in 0..nr_count {
            let row_no = r.u64()?;
            let row_hash = r.hash()?;
            let witness_block = r.u64()?;
            pack.push(NotarizedRow::new(row_no, row_hash, witness_block));
        }
        packs.push(pack);
    }
    Ok(packs)
}

// --- REF_LIST ------------------------------------------------------------

fn encode_ref_list(refs: &BTreeMap<u32, Vec<ForeignRef>>) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, refs.len() as u32);
    for (foreign_id, list) in refs {
        push_u32(&mut out, *foreign_id);
        push_u32(&mut out, list.len() as u32);
        for r in list {
            push_u64(&mut out, r.from_row_no);
            push_i32(&mut out, r.from_col_index);
            out.push(match r.kind {
                RefKind::SameContent => 0,
                RefKind::Beacon => 1,
            });
            push_u64(&mut out, r.target_row_no);
            push_i32(&mut out, r.target_col_index.unwrap_or(-1));
        }
    }
    out
}

fn decode_ref_list(r: &mut Reader) -> Result<BTreeMap<u32, Vec<ForeignRef>>> {
    let count = r.u32()?;
    let mut out = BTreeMap::new();
    for _ in 0..count {
        let foreign_id = r.u32()?;
        let ref_count = r.u32()?;
        let mut list = Vec::with_capacity(ref_count as usize);
        for _ in 0..ref_count {
            let from_row_no = r.u64()?;
            let from_col_index = r.i32()?;
            let kind = match r.take(1)?[0] {
                0 => RefKind::SameContent,
                1 => RefKind::Beacon,
                other => return Err(SldgError::format(format!("morsel: unknown ref kind tag {other}"))),
            };
            let target_row_no = r.u64()?;
            let target_col_index = match r.i32()? {
                -1 => None,
                n => Some(n),
            };
            list.push(ForeignRef {
                from_row_no,
                from_col_index,
                kind,
                target_ledger_id: foreign_id,
                target_row_no,
                target_col_index,
            });
        }
        out.insert(foreign_id, list);
    }
    Ok(out)
}

// --- ASSETS --------------------------------------------------------------

fn encode_assets(assets: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, assets.len() as u32);
    for (name, bytes) in assets {
        push_u16(&mut out, name.len() as u16);
        out.extend_from_slice(name.as_bytes());
        push_u32(&mut out, bytes.len() as u32);
        out.extend_from_slice(bytes);
    }
    out
}

fn decode_assets(r: &mut Reader) -> Result<BTreeMap<String, Vec<u8>>> {
    let count = r.u32()?;
    let mut out = BTreeMap::new();
    for _ in 0..count {
        let name_len = r.u16()? as usize;
        let name = String::from_utf8(r.bytes(name_len)?)
            .map_err(|_| SldgError::format("morsel: asset name is not valid utf-8"))?;
        let len = r.u32()? as usize;
        out.insert(name, r.bytes(len)?);
    }
    Ok(out)
}

/// Encodes one nugget's blob: `MULTI_PATH ‖ SOURCE_PACK ‖ NOTARY_LIST ‖
/// REF_LIST ‖ ASSETS`. `SOURCE_PACK` is omitted (as an empty, all-excluded
/// pack) when the nugget carries no source rows.
fn encode_nugget_blob(n: &Nugget) -> Result<Vec<u8>> {
    let mut out = encode_multi_path(n.multi_path())?;
    match n.source_pack() {
        Some(pack) => out.extend_from_slice(&encode_source_pack(pack)),
        None => out.extend_from_slice(&encode_source_pack(&crate::sourcepack::SourcePack::new(
            SaltScheme::all_excluded(),
        ))),
    }
    out.extend_from_slice(&encode_notary_list(n.notary_packs()));
    out.extend_from_slice(&encode_ref_list(n.foreign_refs()));
    out.extend_from_slice(&encode_assets(n.assets()));
    Ok(out)
}

fn decode_nugget_blob(id: LedgerId, bytes: &[u8]) -> Result<Nugget> {
    let mut r = Reader::new(bytes);
    // `decode_multi_path` runs every row through `Path::validate`/
    // `MultiPath::add_path`, so a decoded nugget's multi-path is already
    // cryptographically checked against its own commitments.
    let multi_path = decode_multi_path(&mut r)?;
    let source_pack = decode_source_pack(&mut r)?;
    let notary_packs = decode_notary_list(&mut r)?;
    let foreign_refs = decode_ref_list(&mut r)?;
    let assets = decode_assets(&mut r)?;

    let source_pack = if source_pack.is_empty() {
        None
    } else {
        crate::sourcepack::require_rows_covered(&source_pack, &multi_path.covered_row_numbers())?;
        Some(source_pack)
    };

    Ok(Nugget::from_parts(
        id,
        multi_path,
        source_pack,
        notary_packs,
        foreign_refs,
        assets,
    ))
}

// --- file-level writer/reader --------------------------------------------

/// Writes a morsel file. Refuses to overwrite an existing path, creates the
/// parent directory if absent, and refuses an empty nugget list.
pub async fn write_morsel(path: impl AsRef<FsPath>, nuggets: &[(LedgerId, Nugget)]) -> Result<()> {
    let path = path.as_ref();
    if nuggets.is_empty() {
        return Err(SldgError::config("a morsel must contain at least one nugget"));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SldgError::storage(e.to_string()))?;
        }
    }

    let mut ids_block = Vec::new();
    for (id, _) in nuggets {
        ids_block.extend_from_slice(&encode_ledger_id(id));
    }

    let blobs: Vec<Vec<u8>> = nuggets
        .iter()
        .map(|(_, n)| encode_nugget_blob(n))
        .collect::<Result<_>>()?;
    let mut partition_index = Vec::new();
    let mut offset: u64 = 0;
    for ((id, _), blob) in nuggets.iter().zip(&blobs) {
        push_u32(&mut partition_index, id.id());
        push_u64(&mut partition_index, offset);
        push_u64(&mut partition_index, blob.len() as u64);
        offset += blob.len() as u64;
    }

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    push_u16(&mut out, SUPPORTED_VERSION);
    push_u32(&mut out, nuggets.len() as u32);
    out.extend_from_slice(&ids_block);
    push_u32(&mut out, nuggets.len() as u32);
    out.extend_from_slice(&partition_index);
    for blob in &blobs {
        out.extend_from_slice(blob);
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| SldgError::storage(format!("morsel: {e}")))?;
    file.write_all(&out)
        .await
        .map_err(|e| SldgError::storage(e.to_string()))?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct PartitionEntry {
    offset: u64,
    length: u64,
}

/// A morsel opened for random-access reading. Holds its backing bytes (for
/// the in-memory loader) or an open file handle for its lifetime; closing
/// the handle is simply dropping it.
pub struct MorselHandle {
    ids: Vec<LedgerId>,
    index: BTreeMap<u32, PartitionEntry>,
    source: MorselSource,
}

enum MorselSource {
    InMemory(Vec<u8>),
    File(tokio::sync::Mutex<tokio::fs::File>),
}

impl MorselHandle {
    /// Opens a morsel file, reading only the header, id list, and partition
    /// index up front; nugget bodies are fetched on demand by
    /// [`MorselHandle::load_nugget`].
    pub async fn open_file(path: impl AsRef<FsPath>) -> Result<Self> {
        let mut file = tokio::fs::File::open(path.as_ref())
            .await
            .map_err(|e| SldgError::storage(format!("morsel: {e}")))?;

        let mut fixed = [0u8; 12];
        file.read_exact(&mut fixed)
            .await
            .map_err(|e| SldgError::storage(e.to_string()))?;
        let mut r = Reader::new(&fixed);
        if r.take(6)? != MAGIC {
            return Err(SldgError::format("morsel: bad magic"));
        }
        check_version(r.u16()?)?;
        let ids_count = r.u32()?;

        let mut ids = Vec::with_capacity(ids_count as usize);
        for _ in 0..ids_count {
            let mut id_head = [0u8; 9];
            file.read_exact(&mut id_head)
                .await
                .map_err(|e| SldgError::storage(e.to_string()))?;
            let mut hr = Reader::new(&id_head);
            let id_no = hr.u32()?;
            let type_tag = hr.take(1)?[0];
            let meta_len = hr.u32()? as usize;
            let mut meta_bytes = vec![0u8; meta_len];
            file.read_exact(&mut meta_bytes)
                .await
                .map_err(|e| SldgError::storage(e.to_string()))?;
            ids.push(ledger_id_from_fields(id_no, type_tag, meta_bytes)?);
        }

        let mut pc_buf = [0u8; 4];
        file.read_exact(&mut pc_buf)
            .await
            .map_err(|e| SldgError::storage(e.to_string()))?;
        let partition_count = u32::from_be_bytes(pc_buf);
        if partition_count != ids_count {
            return Err(SldgError::format(
                "morsel: partition count does not match id count",
            ));
        }

        let mut index_bytes = vec![0u8; partition_count as usize * 20];
        file.read_exact(&mut index_bytes)
            .await
            .map_err(|e| SldgError::storage(e.to_string()))?;
        let mut ir = Reader::new(&index_bytes);
        let mut raw = Vec::with_capacity(partition_count as usize);
        for _ in 0..partition_count {
            raw.push((ir.u32()?, ir.u64()?, ir.u64()?));
        }

        let body_start = file
            .stream_position()
            .await
            .map_err(|e| SldgError::storage(e.to_string()))?;
        let mut index = BTreeMap::new();
        for (id_no, offset, length) in raw {
            index.insert(
                id_no,
                PartitionEntry {
                    offset: offset + body_start,
                    length,
                },
            );
        }

        Ok(Self {
            ids,
            index,
            source: MorselSource::File(tokio::sync::Mutex::new(file)),
        })
    }

    /// Reads the entire file past the header into memory and exposes the
    /// same handle semantics as [`MorselHandle::open_file`].
    pub async fn open_in_memory(path: impl AsRef<FsPath>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref())
            .await
            .map_err(|e| SldgError::storage(format!("morsel: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Parses an already-loaded morsel buffer (e.g. fetched over a network
    /// channel rather than from the local filesystem).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (ids, index) = parse_header_and_index(&bytes)?;
        Ok(Self {
            ids,
            index,
            source: MorselSource::InMemory(bytes),
        })
    }

    pub fn ids(&self) -> &[LedgerId] {
        &self.ids
    }

    /// Fetches and decodes a single nugget by ledger id, without touching
    /// any other nugget's bytes.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn load_nugget(&self, id_no: u32) -> Result<Nugget> {
        let id = self
            .ids
            .iter()
            .find(|i| i.id() == id_no)
            .cloned()
            .ok_or_else(|| SldgError::out_of_bounds(format!("morsel has no ledger id {id_no}")))?;
        let entry = *self
            .index
            .get(&id_no)
            .ok_or_else(|| SldgError::out_of_bounds(format!("morsel has no partition for id {id_no}")))?;

        let bytes = match &self.source {
            MorselSource::InMemory(buf) => {
                let start = entry.offset as usize;
                let end = start + entry.length as usize;
                buf.get(start..end)
                    .ok_or_else(|| SldgError::format("morsel: partition entry out of range"))?
                    .to_vec()
            }
            MorselSource::File(file) => {
                let mut guard = file.lock().await;
                guard
                    .seek(std::io::SeekFrom::Start(entry.offset))
                    .await
                    .map_err(|e| SldgError::storage(e.to_string()))?;
                let mut buf = vec![0u8; entry.length as usize];
                guard
                    .read_exact(&mut buf)
                    .await
                    .map_err(|e| SldgError::storage(e.to_string()))?;
                buf
            }
        };
        decode_nugget_blob(id, &bytes)
    }
}

fn check_version(version: u16) -> Result<()> {
    if version == 0 {
        return Err(SldgError::format("morsel: version 0 is invalid"));
    }
    if version > SUPPORTED_VERSION {
        tracing::warn!(
            found = version,
            supported = SUPPORTED_VERSION,
            "morsel file version is newer than this reader supports; attempting to read anyway"
        );
    }
    Ok(())
}

/// Parses `MAGIC .. PARTITION_INDEX`, leaving `NUGGET_BLOBS` untouched.
/// Offsets recorded in `PARTITION_INDEX` are relative to the start of
/// `NUGGET_BLOBS`; this function rewrites them to absolute offsets into
/// `buf` before returning.
fn parse_header_and_index(buf: &[u8]) -> Result<(Vec<LedgerId>, BTreeMap<u32, PartitionEntry>)> {
    let mut r = Reader::new(buf);
    let magic = r.take(6)?;
    if magic != MAGIC {
        return Err(SldgError::format("morsel: bad magic"));
    }
    let version = r.u16()?;
    check_version(version)?;

    let ids_count = r.u32()?;
    let mut ids = Vec::with_capacity(ids_count as usize);
    for _ in 0..ids_count {
        ids.push(decode_ledger_id(&mut r)?);
    }

    let partition_count = r.u32()?;
    if partition_count != ids_count {
        return Err(SldgError::format(
            "morsel: partition count does not match id count",
        ));
    }
    let mut raw = Vec::with_capacity(partition_count as usize);
    for _ in 0..partition_count {
        let id_no = r.u32()?;
        let offset = r.u64()?;
        let length = r.u64()?;
        raw.push((id_no, offset, length));
    }
    let body_start = r.pos as u64;

    let mut index = BTreeMap::new();
    for (id_no, offset, length) in raw {
        index.insert(
            id_no,
            PartitionEntry {
                offset: offset + body_start,
                length,
            },
        );
    }
    Ok((ids, index))
}
