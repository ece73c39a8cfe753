//! Ledger identity (§3, §6.1): the `(id, type, metadata)` that names a
//! ledger within a morsel.

use std::collections::BTreeMap;

/// The kind of ledger a [`LedgerId`] names, which governs which
/// operations are legal on its nuggets (e.g. a `TIMECHAIN` carries no
/// source rows; a `LOG` disallows mixed salt schemes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerType {
    Log,
    Bstream,
    Timechain,
    /// Forward-compatible catch-all for a `TYPE_TAG` this build doesn't
    /// otherwise know the semantics of.
    Other(u8),
}

impl LedgerType {
    pub fn tag(self) -> u8 {
        match self {
            LedgerType::Log => 0,
            LedgerType::Bstream => 1,
            LedgerType::Timechain => 2,
            LedgerType::Other(t) => t,
        }
    }

    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => LedgerType::Log,
            1 => LedgerType::Bstream,
            2 => LedgerType::Timechain,
            other => LedgerType::Other(other),
        }
    }

    /// Source rows are meaningless on a commits-only (timechain) ledger.
    pub fn is_commits_only(self) -> bool {
        matches!(self, LedgerType::Timechain)
    }
}

/// `(id: u32 > 0, type, metadata)`. Within a morsel, ids are distinct and
/// id 0 is reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerId {
    id: u32,
    ledger_type: LedgerType,
    /// Implementation-defined key/value attributes plus a display name;
    /// this crate stores them as plain UTF-8 key/value pairs with the
    /// conventional `"name"` key carrying the human-readable ledger name.
    metadata: BTreeMap<String, String>,
}

impl LedgerId {
    pub fn new(id: u32, ledger_type: LedgerType, name: impl Into<String>) -> Option<Self> {
        if id == 0 {
            return None;
        }
        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), name.into());
        Some(Self {
            id,
            ledger_type,
            metadata,
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn ledger_type(&self) -> LedgerType {
        self.ledger_type
    }

    pub fn name(&self) -> &str {
        self.metadata.get("name").map(String::as_str).unwrap_or("")
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}
