//! Transactions, the prepared database and the `prepare_data` pipeline
//! (spec §3, §4.1, §6 `prepare_data`).

use std::cmp::Ordering;
use std::collections::HashMap;

use rayon::prelude::*;

use crate::error::{IstaError, Result};
use crate::item::{Item, ItemFrequencies};

/// A transaction: items in canonical descending-frequency order (which,
/// after dense recoding, is simply ascending numeric order — see
/// [`crate::item::Item`]) plus an integer weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub items: Vec<Item>,
    pub weight: u64,
}

/// How `prepare_data` orders the transaction list before mining (spec §6
/// `prepare_data(db, sort_mode)`).
///
/// The reference names these five modes; the exact "size-sum" key is left
/// to the implementer (spec §6 gives the name, not the formula). Here
/// `size_sum` is defined as the sum of a transaction's item codes: since
/// more frequent items get larger codes (§9), a large sum means the
/// transaction is dominated by frequent items. Sorting descending by this
/// sum, then iterating from the end of the list (§4.1), front-loads the
/// frequent-item-heavy transactions, which is the "favourable"
/// localisation behaviour the driver documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    Ascending,
    #[default]
    DescendingBySizeSum,
    Descending,
    AscendingBySizeSum,
    NoSort,
}

/// How the minimum (and maximum) support is specified to `create` (spec
/// §6: "if positive, percentage of total transaction weight; if negative,
/// absolute count — sign indicates encoding"). Replaced here with an
/// explicit enum rather than a sign-encoded float/int union: same two
/// encodings, an idiomatic Rust shape instead of the reference's overload
/// on the sign bit. See DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SupportSpec {
    /// Percentage of total transaction weight, in `(0.0, 100.0]`.
    Percentage(f64),
    /// Absolute minimum support count, `>= 1`.
    Absolute(u64),
}

impl SupportSpec {
    /// Checks the parts of validity that don't depend on the database
    /// (spec §7: invalid support is a **caller error**, "detected at
    /// `create`; no side effects" — the same bucket as `InvalidSize`).
    /// `total_weight`-dependent resolution still happens in [`Self::resolve`]
    /// at `prepare_data` time, but an out-of-range support spec is
    /// rejected immediately at `create`, before any database is seen.
    pub(crate) fn validate(self) -> Result<()> {
        match self {
            SupportSpec::Percentage(pct) => {
                if !(pct > 0.0 && pct <= 100.0) {
                    return Err(IstaError::InvalidSupport);
                }
                Ok(())
            }
            SupportSpec::Absolute(abs) => {
                if abs == 0 {
                    return Err(IstaError::InvalidSupport);
                }
                Ok(())
            }
        }
    }

    pub(crate) fn resolve(self, total_weight: u64) -> Result<u64> {
        self.validate()?;
        match self {
            SupportSpec::Percentage(pct) => {
                let abs = ((pct / 100.0) * total_weight as f64).ceil() as u64;
                Ok(abs.max(1))
            }
            SupportSpec::Absolute(abs) => Ok(abs),
        }
    }
}

/// The output of `prepare_data`: a dense recoding of the database plus
/// the residual frequency table, ready for the intersection loop.
pub struct PreparedData {
    /// Transactions sorted per `SortMode`; the driver iterates from the
    /// last element to the first (spec §4.1 "Iteration order").
    pub transactions: Vec<Transaction>,
    pub frequencies: ItemFrequencies,
    /// Number of surviving dense items, `m`.
    pub num_items: usize,
    pub s_min: u64,
    /// Total (weighted) transaction count of the raw input, before any
    /// item/size filtering or duplicate collapsing — the basis `s_min`
    /// and `s_max` percentages are both resolved against.
    pub total_weight: u64,
}

fn size_sum(items: &[Item]) -> u64 {
    items.iter().map(|&i| i as u64).sum()
}

fn sort_key_cmp(mode: SortMode, a: &Transaction, b: &Transaction) -> Ordering {
    match mode {
        SortMode::Ascending => a.items.cmp(&b.items),
        SortMode::Descending => b.items.cmp(&a.items),
        SortMode::AscendingBySizeSum => size_sum(&a.items)
            .cmp(&size_sum(&b.items))
            .then_with(|| a.items.cmp(&b.items)),
        SortMode::DescendingBySizeSum => size_sum(&b.items)
            .cmp(&size_sum(&a.items))
            .then_with(|| a.items.cmp(&b.items)),
        SortMode::NoSort => Ordering::Equal,
    }
}

/// Recodes, filters, dedupes and orders a raw database (spec §4.1
/// `prepare(db, s_min_spec, z_min, z_max, sort_mode)`).
///
/// `z_max` is accepted (and validated) here but, per spec §4.1, is *not*
/// used to drop transactions during preparation — only `z_min` is; the
/// upper bound is a reporter-side size filter applied at emission.
pub fn prepare_data(
    raw: Vec<(Vec<Item>, u64)>,
    s_min_spec: SupportSpec,
    z_min: usize,
    z_max: usize,
    sort_mode: SortMode,
) -> Result<PreparedData> {
    if z_max < z_min {
        return Err(IstaError::InvalidSize);
    }

    let total_weight: u64 = raw.iter().map(|(_, w)| *w).sum();
    let s_min = s_min_spec.resolve(total_weight)?;

    // Pass 1: total (weighted) support of each raw item id. Embarrassingly
    // parallel (spec §9 "parallelism primitives retained from the teacher
    // stack"): each chunk folds its own support vector, then chunks reduce
    // pairwise, mirroring the teacher's `into_par_iter().reduce(...)`
    // min-count pattern in the removed `find_gaussian_rare_items`.
    let max_raw_id = raw
        .iter()
        .flat_map(|(items, _)| items.iter())
        .copied()
        .max()
        .map(|m| m as usize + 1)
        .unwrap_or(0);
    let raw_support: Vec<u64> = raw
        .par_iter()
        .fold(
            || vec![0u64; max_raw_id],
            |mut acc, (items, w)| {
                for &i in items {
                    acc[i as usize] += w;
                }
                acc
            },
        )
        .reduce(
            || vec![0u64; max_raw_id],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    *x += y;
                }
                a
            },
        );

    // Keep only frequent items, then recode densely by ascending support
    // (ties broken by ascending raw id), so the most frequent item gets
    // the largest dense code and the new code *is* the canonical rank
    // (spec §9): larger code == more frequent == earlier in a
    // descending-order traversal.
    let mut frequent: Vec<Item> = (0..max_raw_id as Item)
        .filter(|&i| raw_support[i as usize] >= s_min)
        .collect();
    frequent.sort_by(|&a, &b| {
        raw_support[a as usize]
            .cmp(&raw_support[b as usize])
            .then_with(|| a.cmp(&b))
    });

    if frequent.is_empty() {
        return Err(IstaError::NoItems);
    }

    let num_items = frequent.len();
    let mut recode = vec![None; max_raw_id];
    let mut dense_support = vec![0u64; num_items];
    for (new_code, &old_id) in frequent.iter().enumerate() {
        recode[old_id as usize] = Some(new_code as Item);
        dense_support[new_code] = raw_support[old_id as usize];
    }

    // Pass 2: recode each transaction, drop infrequent items, sort into
    // canonical order, discard anything below z_min.
    let mut recoded: Vec<Transaction> = Vec::with_capacity(raw.len());
    for (items, weight) in raw {
        let mut new_items: Vec<Item> = items
            .into_iter()
            .filter_map(|i| recode[i as usize])
            .collect();
        new_items.sort_unstable_by(|a, b| b.cmp(a)); // descending: most frequent first
        new_items.dedup();
        if new_items.len() < z_min {
            continue;
        }
        recoded.push(Transaction {
            items: new_items,
            weight,
        });
    }

    // Collapse duplicate transactions, summing weights (spec §3, property 8).
    let mut by_items: HashMap<Vec<Item>, u64> = HashMap::with_capacity(recoded.len());
    for t in recoded {
        *by_items.entry(t.items).or_insert(0) += t.weight;
    }
    let mut transactions: Vec<Transaction> = by_items
        .into_iter()
        .map(|(items, weight)| Transaction { items, weight })
        .collect();

    if transactions.is_empty() {
        return Err(IstaError::NoItems);
    }

    transactions.sort_by(|a, b| sort_key_cmp(sort_mode, a, b));

    Ok(PreparedData {
        transactions,
        frequencies: ItemFrequencies::new(dense_support),
        num_items,
        s_min,
        total_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(items: &[Item], w: u64) -> (Vec<Item>, u64) {
        (items.to_vec(), w)
    }

    #[test]
    fn support_spec_validate_rejects_out_of_range_values_independent_of_total_weight() {
        assert!(SupportSpec::Absolute(0).validate().is_err());
        assert!(SupportSpec::Absolute(1).validate().is_ok());
        assert!(SupportSpec::Percentage(0.0).validate().is_err());
        assert!(SupportSpec::Percentage(100.0).validate().is_ok());
        assert!(SupportSpec::Percentage(100.1).validate().is_err());
    }

    #[test]
    fn drops_infrequent_items_and_recodes_by_frequency() {
        // item 0 appears 2x, item 1 appears 3x, item 2 appears 1x.
        let raw = vec![
            t(&[0, 1], 1),
            t(&[0, 1], 1),
            t(&[1, 2], 1),
        ];
        let prepared =
            prepare_data(raw, SupportSpec::Absolute(2), 0, usize::MAX, SortMode::NoSort).unwrap();
        // item "1" (support 3) should recode to dense code 1 (most frequent,
        // largest code), item "0" (support 2) to dense code 0. item "2"
        // (support 1) is dropped.
        assert_eq!(prepared.num_items, 2);
        assert_eq!(prepared.s_min, 2);
        for txn in &prepared.transactions {
            assert!(txn.items.iter().all(|&i| i < 2));
        }
    }

    #[test]
    fn duplicate_transactions_collapse_with_summed_weight() {
        let raw = vec![t(&[0, 1], 1), t(&[0, 1], 1), t(&[0, 1], 1)];
        let prepared =
            prepare_data(raw, SupportSpec::Absolute(1), 0, usize::MAX, SortMode::NoSort).unwrap();
        assert_eq!(prepared.transactions.len(), 1);
        assert_eq!(prepared.transactions[0].weight, 3);
    }

    #[test]
    fn z_min_drops_short_transactions_but_z_max_does_not() {
        let raw = vec![t(&[0], 1), t(&[0, 1], 1)];
        let prepared =
            prepare_data(raw, SupportSpec::Absolute(1), 2, 2, SortMode::NoSort).unwrap();
        assert_eq!(prepared.transactions.len(), 1);
        assert_eq!(prepared.transactions[0].items.len(), 2);
    }

    #[test]
    fn empty_database_is_no_items() {
        let raw: Vec<(Vec<Item>, u64)> = vec![];
        let err = prepare_data(raw, SupportSpec::Absolute(1), 0, usize::MAX, SortMode::NoSort)
            .unwrap_err();
        assert_eq!(err, IstaError::NoItems);
    }

    #[test]
    fn support_above_every_item_is_no_items() {
        let raw = vec![t(&[0], 1), t(&[1], 1)];
        let err = prepare_data(raw, SupportSpec::Absolute(5), 0, usize::MAX, SortMode::NoSort)
            .unwrap_err();
        assert_eq!(err, IstaError::NoItems);
    }
}
