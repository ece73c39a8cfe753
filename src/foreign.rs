//! Foreign refs (§4.7, §6.1): cross-ledger cell/row references.

/// The assertion a [`ForeignRef`] makes about its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Asserts equality between this cell's data and the foreign cell's data.
    SameContent,
    /// Asserts equality between this cell's data and the row hash of the
    /// foreign row.
    Beacon,
}

/// `(from_row_no, from_col_index, kind, target_ledger_id, target_row_no,
/// optional target_col_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignRef {
    pub from_row_no: u64,
    pub from_col_index: i32,
    pub kind: RefKind,
    pub target_ledger_id: u32,
    pub target_row_no: u64,
    /// Required for `SameContent` refs; absent for `Beacon` refs, which
    /// compare against the target row's hash rather than one of its cells.
    pub target_col_index: Option<i32>,
}

impl ForeignRef {
    pub fn same_content(
        from_row_no: u64,
        from_col_index: i32,
        target_ledger_id: u32,
        target_row_no: u64,
        target_col_index: i32,
    ) -> Self {
        Self {
            from_row_no,
            from_col_index,
            kind: RefKind::SameContent,
            target_ledger_id,
            target_row_no,
            target_col_index: Some(target_col_index),
        }
    }

    pub fn beacon(
        from_row_no: u64,
        from_col_index: i32,
        target_ledger_id: u32,
        target_row_no: u64,
    ) -> Self {
        Self {
            from_row_no,
            from_col_index,
            kind: RefKind::Beacon,
            target_ledger_id,
            target_row_no,
            target_col_index: None,
        }
    }
}
