//! Property-based tests covering the quantified invariants of spec §8.
//!
//! Grounded in the teacher workspace's own use of `proptest` for invariant
//! coverage (e.g. `knhk-kernel`, `knhk-validation`); each property here maps
//! directly to one numbered invariant in that section.

use proptest::prelude::*;
use sldg::{
    b64_32_decode, b64_32_encode, hash, Cell, EpochedTableSalt, HashFrontier, Polarity, SaltScheme,
    SourceRow,
};

fn arb_hash() -> impl Strategy<Value = [u8; 32]> {
    proptest::collection::vec(any::<u8>(), 32).prop_map(|v| {
        let mut out = [0u8; 32];
        out.copy_from_slice(&v);
        out
    })
}

proptest! {
    /// Invariant 1: level_row(n, L) is non-increasing in L and equals n at L=0.
    #[test]
    fn level_row_monotonic_and_identity(n in 1u64..=1_000_000) {
        use sldg::topology::{level_row, levels};
        prop_assert_eq!(level_row(n, 0), n);
        let mut prev = n;
        for l in 0..levels(n) {
            let cur = level_row(n, l);
            prop_assert!(cur <= prev);
            prev = cur;
        }
    }

    /// Invariant 2: 1 <= skip_count(n) <= levels(n).
    #[test]
    fn skip_count_within_bounds(n in 1u64..=1_000_000) {
        use sldg::topology::{levels, skip_count};
        let sc = skip_count(n);
        prop_assert!(sc >= 1);
        prop_assert!(sc <= levels(n));
    }

    /// Invariant 3: the row hash obtained from repeated `next_row` calls
    /// over an arbitrary append sequence matches building the frontier from
    /// scratch over the same sequence (there is only one way to build it in
    /// this API, so this instead checks that replaying a prefix and then
    /// continuing yields the same result as building straight through —
    /// i.e. the frontier has no hidden non-prefix-derived state).
    #[test]
    fn frontier_is_a_pure_fold_over_input_hashes(seeds in proptest::collection::vec(arb_hash(), 1..40)) {
        let full = seeds.iter().enumerate().fold(HashFrontier::empty(), |f, (i, s)| {
            let ih = hash(&[b"row", &s[..]]);
            if i == 0 { HashFrontier::first_row(ih) } else { f.next_row(ih) }
        });

        let split = seeds.len() / 2;
        let mut partial = HashFrontier::empty();
        for (i, s) in seeds.iter().enumerate().take(split.max(1)) {
            let ih = hash(&[b"row", &s[..]]);
            partial = if i == 0 { HashFrontier::first_row(ih) } else { partial.next_row(ih) };
        }
        let mut resumed = partial;
        for (i, s) in seeds.iter().enumerate().skip(split.max(1)) {
            let _ = i;
            let ih = hash(&[b"row", &s[..]]);
            resumed = resumed.next_row(ih);
        }

        prop_assert_eq!(resumed.row_no(), full.row_no());
        prop_assert_eq!(resumed.row_hash(), full.row_hash());
    }

    /// Invariant 4: effective_cell_salt(s, n, c).is_some() iff
    /// (c in s.indices) XOR (s.polarity == Exclude).
    #[test]
    fn effective_cell_salt_matches_polarity_xor(
        indices in proptest::collection::btree_set(0i32..32, 0..8),
        include in any::<bool>(),
        col in 0i32..32,
        row_no in 1u64..1000,
    ) {
        let polarity = if include { Polarity::Include } else { Polarity::Exclude };
        let scheme = SaltScheme::new(indices.iter().copied(), polarity).unwrap();
        let table_salt = EpochedTableSalt::single([7u8; 32]);
        let salted = sldg::salt::effective_cell_salt(&scheme, &table_salt, row_no, col).is_some();
        let expected = indices.contains(&col) ^ !include;
        prop_assert_eq!(salted, expected);
    }

    /// Invariant 5: redaction is idempotent and hash-preserving.
    #[test]
    fn redaction_idempotent_and_hash_preserving(v in any::<i64>(), col in 0usize..3) {
        let cells = vec![Cell::Long(v), Cell::String("x".into()), Cell::Null];
        let row = SourceRow::unsalted(1, cells).unwrap();
        let before = row.input_hash();
        let once = row.redact(col).unwrap();
        let twice = once.redact(col).unwrap();
        prop_assert_eq!(once.input_hash(), before);
        prop_assert_eq!(once.cells(), twice.cells());
    }

    /// Invariant 6: B64_32 is a bijection between 32-byte values and the
    /// 43-character strings this encoder produces.
    #[test]
    fn b64_32_round_trips(bytes in arb_hash()) {
        let s = b64_32_encode(&bytes);
        prop_assert_eq!(s.len(), 43);
        let decoded = b64_32_decode(&s).unwrap();
        prop_assert_eq!(decoded, bytes);
        let reencoded = b64_32_encode(&decoded);
        prop_assert_eq!(reencoded, s);
    }
}
