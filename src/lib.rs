// src/lib.rs
// sldg: tamper-evident skip-ledger engine — salted row hashing, skip-pointer
// commitment paths, and morsel proof containers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod cell;
pub mod config;
pub mod error;
pub mod foreign;
pub mod frontier;
pub mod hash;
pub mod ledger;
pub mod logging;
pub mod morsel;
pub mod multipath;
pub mod notary;
pub mod nugget;
pub mod path;
pub mod salt;
pub mod skiptable;
pub mod sourcepack;
pub mod topology;
pub mod verify;

#[cfg(feature = "sql")]
pub mod sql;

pub use cell::{Cell, SourceRow};
pub use config::Env;
pub use error::{Result, SldgError};
pub use foreign::{ForeignRef, RefKind};
pub use frontier::HashFrontier;
pub use hash::{b64_32_decode, b64_32_encode, hash, Hash, HASH_LEN, SENTINEL_HASH};
pub use ledger::{LedgerId, LedgerType};
pub use morsel::{write_morsel, MorselHandle};
pub use multipath::MultiPath;
pub use notary::{NotarizedRow, NotaryPack};
pub use nugget::{Nugget, NuggetBuilder};
pub use path::{Path, PathRow};
pub use salt::{EpochSeed, EpochedTableSalt, Polarity, SaltScheme, TableSaltEngine};
pub use skiptable::{MemSkipTable, SkipRow, SkipTable};
pub use sourcepack::SourcePack;
pub use verify::{verify_nugget, VerificationOutcome};
