//! Reporter adapter (spec §4.5, §6 `prepare_reporter`).
//!
//! The item-set reporter itself — formatting, writing, pattern-spectrum
//! collection, output compression — is an external collaborator out of
//! scope for this crate (spec §1). What *is* in scope is the narrow
//! interface the driver calls into, and one concrete in-memory
//! implementation so the crate is usable as a library and testable
//! end-to-end without wiring up a real file writer.

use itertools::Itertools;

use crate::item::Item;
use crate::repository::{ItemSet, Target};

/// The interface the mining core drives during emission (spec §4.5).
pub trait Reporter {
    fn set_supp_range(&mut self, s_min: u64, s_max: Option<u64>);
    fn set_size_range(&mut self, z_min: usize, z_max: usize);
    fn set_target(&mut self, target: Target, filter_via_reporter: bool);
    fn open(&mut self) {}
    fn report(&mut self, items: &[Item], supp: u64);
    fn close(&mut self) {}
}

/// Collects emitted sets into a `Vec`, applying the support/size range the
/// driver configured and — when the reporter was asked to do maximality
/// filtering itself (spec §4.2.4 "filter-with-repository" mode) —
/// dropping any collected set that turns out to be a proper subset of
/// another collected set with support above `s_min`.
#[derive(Debug, Default)]
pub struct VecReporter {
    s_min: u64,
    s_max: Option<u64>,
    z_min: usize,
    z_max: usize,
    target: Target,
    filter_via_reporter: bool,
    sets: Vec<ItemSet>,
}

impl VecReporter {
    pub fn new() -> Self {
        VecReporter {
            s_min: 1,
            s_max: None,
            z_min: 0,
            z_max: usize::MAX,
            target: Target::Closed,
            filter_via_reporter: false,
            sets: Vec::new(),
        }
    }

    fn in_range(&self, items: &[Item], supp: u64) -> bool {
        supp >= self.s_min
            && self.s_max.map_or(true, |s_max| supp <= s_max)
            && items.len() >= self.z_min
            && items.len() <= self.z_max
    }

    /// The collected sets, post-filtering. Consumes the reporter.
    pub fn into_sets(mut self) -> Vec<ItemSet> {
        if self.filter_via_reporter && self.target == Target::Maximal {
            self.sets = maximal_filter(self.sets);
        }
        self.sets
    }

    pub fn sets(&self) -> &[ItemSet] {
        &self.sets
    }
}

/// Reporter-side maximality filter: keep a set iff no other collected set
/// is a proper superset of it (spec §4.2.4 "filter via reporter").
fn maximal_filter(sets: Vec<ItemSet>) -> Vec<ItemSet> {
    // Largest candidates first, so a set is only ever tested against
    // supersets that have already been accepted into `kept`.
    let sets = sets
        .into_iter()
        .sorted_by_key(|s| std::cmp::Reverse(s.items.len()));
    let mut kept: Vec<ItemSet> = Vec::new();
    'outer: for candidate in sets {
        for other in &kept {
            if other.items.len() > candidate.items.len()
                && is_subset(&candidate.items, &other.items)
            {
                continue 'outer;
            }
        }
        kept.push(candidate);
    }
    kept
}

fn is_subset(small: &[Item], big: &[Item]) -> bool {
    small.iter().all(|i| big.contains(i))
}

impl Reporter for VecReporter {
    fn set_supp_range(&mut self, s_min: u64, s_max: Option<u64>) {
        self.s_min = s_min;
        self.s_max = s_max;
    }

    fn set_size_range(&mut self, z_min: usize, z_max: usize) {
        self.z_min = z_min;
        self.z_max = z_max;
    }

    fn set_target(&mut self, target: Target, filter_via_reporter: bool) {
        self.target = target;
        self.filter_via_reporter = filter_via_reporter;
    }

    fn report(&mut self, items: &[Item], supp: u64) {
        if self.in_range(items, supp) {
            self.sets.push(ItemSet::new(items.to_vec(), supp));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maximal_filter_drops_covered_subsets() {
        let sets = vec![
            ItemSet::new(vec![0], 4),
            ItemSet::new(vec![0, 1], 3),
            ItemSet::new(vec![1], 4),
        ];
        let kept = maximal_filter(sets);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].items, vec![0, 1]);
    }
}
