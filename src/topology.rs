//! Skip-ledger topology (§4.4): pure row-number / skip-pointer arithmetic.
//!
//! Nothing here touches storage or hashing — it is the geometry the rest
//! of the engine builds on.

/// `skip_count(n) = trailing_zeros(n) + 1` for `n >= 1`: the number of
/// back-pointers row `n` carries.
pub fn skip_count(n: u64) -> u32 {
    debug_assert!(n >= 1, "skip_count is undefined for row 0");
    n.trailing_zeros() + 1
}

/// `levels(n) = 64 - leading_zeros(n)`: one past the highest level a
/// frontier needs to track once it has reached row `n`.
pub fn levels(n: u64) -> u32 {
    debug_assert!(n >= 1, "levels is undefined for row 0");
    64 - n.leading_zeros()
}

/// `level_row(n, L) = (n >> L) << L`: the row number at level `L` of the
/// frontier rooted at `n`.
pub fn level_row(n: u64, level: u32) -> u64 {
    (n >> level) << level
}

/// The row numbers referenced by row `n`'s skip pointers, i.e.
/// `n - 2^k` for `k` in `[0, skip_count(n))`. A reference `<= 0` (only
/// possible for row 1's single pointer) stands for the sentinel.
pub fn back_references(n: u64) -> Vec<i128> {
    let k = skip_count(n);
    (0..k)
        .map(|j| n as i128 - (1i128 << j))
        .collect()
}
