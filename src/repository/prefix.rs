//! One-node-per-item intersection repository (spec §4.2).
//!
//! Storage is an arena of [`Node`]s plus a `HashMap<Item, NodeId>`
//! children index on each node so lookup-or-insert along a path is O(1)
//! per step; a free list lets bulk subtree deletion (pruning) reuse
//! slots instead of shrinking the arena (spec §9 "Arena allocation").
//!
//! `intersect` credits each stored node at most once per transaction
//! (the `credited` set), whether that node was already present
//! (`P ⊆ t`) or had to be created to hold a fresh `P ∩ t` result. A
//! freshly created node is seeded with the pre-transaction support of
//! the existing path(s) it was intersected from, not zero: since
//! `P ∩ t ⊆ P`, every past transaction that was a superset of `P` is
//! automatically a superset of `P ∩ t` too, and that history must carry
//! over or the new node's support undercounts (spec §4.2.1). See
//! [`PrefixTree::intersect`] for the derivation.

use std::collections::{HashMap, HashSet};

use crate::error::{IstaError, Result};
use crate::item::{Item, ItemFrequencies};
use crate::reporter::Reporter;
use crate::repository::{FilterMode, Repository, Target};
use crate::transaction::Transaction;

type NodeId = usize;

struct Node {
    item: Item,
    supp: u64,
    parent: Option<NodeId>,
    children: HashMap<Item, NodeId>,
}

/// One-node-per-item repository (spec §4.2).
#[derive(Default)]
pub struct PrefixTree {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    roots: HashMap<Item, NodeId>,
    live: usize,
}

impl PrefixTree {
    pub fn new() -> PrefixTree {
        PrefixTree::default()
    }

    fn alloc(&mut self, item: Item, parent: Option<NodeId>) -> Result<NodeId> {
        let node = Node {
            item,
            supp: 0,
            parent,
            children: HashMap::new(),
        };
        let id = if let Some(id) = self.free.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            self.nodes.try_reserve(1).map_err(|_| IstaError::OutOfMemory)?;
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        };
        self.live += 1;
        Ok(id)
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id].as_ref().expect("dangling node id")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id].as_mut().expect("dangling node id")
    }

    /// Every currently stored path, as `(node id, root-to-node items)`,
    /// collected via one DFS. A fresh snapshot is taken at the start of
    /// every `intersect` call since the tree is mutated afterwards.
    fn all_paths(&self) -> Vec<(NodeId, Vec<Item>)> {
        let mut out = Vec::with_capacity(self.live);
        let mut path = Vec::new();
        let mut roots: Vec<(Item, NodeId)> =
            self.roots.iter().map(|(&i, &id)| (i, id)).collect();
        roots.sort_by(|a, b| b.0.cmp(&a.0));
        for (item, id) in roots {
            path.push(item);
            self.collect(id, &mut path, &mut out);
            path.pop();
        }
        out
    }

    fn collect(&self, id: NodeId, path: &mut Vec<Item>, out: &mut Vec<(NodeId, Vec<Item>)>) {
        out.push((id, path.clone()));
        let mut children: Vec<(Item, NodeId)> =
            self.node(id).children.iter().map(|(&i, &c)| (i, c)).collect();
        children.sort_by(|a, b| b.0.cmp(&a.0));
        for (item, child_id) in children {
            path.push(item);
            self.collect(child_id, path, out);
            path.pop();
        }
    }

    /// Materialise `path` (creating any missing prefix nodes, freshly
    /// created ones starting from `seed` rather than zero) and credit `w`
    /// to every node along it that has not already been credited this
    /// transaction.
    fn insert_path(
        &mut self,
        path: &[Item],
        w: u64,
        seed: u64,
        credited: &mut HashSet<NodeId>,
    ) -> Result<()> {
        let mut parent = None;
        for &item in path {
            let existing = match parent {
                Some(p) => self.node(p).children.get(&item).copied(),
                None => self.roots.get(&item).copied(),
            };
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = self.alloc(item, parent)?;
                    match parent {
                        Some(p) => {
                            self.node_mut(p).children.insert(item, id);
                        }
                        None => {
                            self.roots.insert(item, id);
                        }
                    }
                    self.node_mut(id).supp = seed;
                    id
                }
            };
            if credited.insert(id) {
                self.node_mut(id).supp += w;
            }
            parent = Some(id);
        }
        Ok(())
    }

    fn free_subtree(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self.node(id).children.values().copied().collect();
        for child in children {
            self.free_subtree(child);
        }
        self.nodes[id] = None;
        self.free.push(id);
        self.live -= 1;
    }

    /// Shared walk for both pruning passes: `cap` is monotone
    /// non-increasing root-to-leaf (spec §4.2.2), so as soon as a node
    /// fails its threshold its whole subtree can be dropped without
    /// inspecting descendants.
    fn prune_where(&mut self, mut fails: impl FnMut(&Self, NodeId, &[Item]) -> bool) {
        let mut roots: Vec<(Item, NodeId)> =
            self.roots.iter().map(|(&i, &id)| (i, id)).collect();
        let mut path = Vec::new();
        for (item, id) in roots.drain(..) {
            path.push(item);
            if fails(self, id, &path) {
                self.free_subtree(id);
                self.roots.remove(&item);
            } else {
                self.prune_subtree(id, &mut path, &mut fails);
            }
            path.pop();
        }
    }

    fn prune_subtree(
        &mut self,
        id: NodeId,
        path: &mut Vec<Item>,
        fails: &mut impl FnMut(&Self, NodeId, &[Item]) -> bool,
    ) {
        let children: Vec<(Item, NodeId)> =
            self.node(id).children.iter().map(|(&i, &c)| (i, c)).collect();
        for (item, child_id) in children {
            path.push(item);
            if fails(self, child_id, path) {
                self.free_subtree(child_id);
                self.node_mut(id).children.remove(&item);
            } else {
                self.prune_subtree(child_id, path, fails);
            }
            path.pop();
        }
    }

    fn emit_from(
        &self,
        id: NodeId,
        path: &mut Vec<Item>,
        target: Target,
        s_min: u64,
        filter_mode: FilterMode,
        reporter: &mut dyn Reporter,
    ) {
        let n = self.node(id);
        if n.supp < s_min {
            return; // supp is monotone non-increasing; no descendant can qualify either.
        }
        let should_emit = match (target, filter_mode) {
            (Target::Closed, _) => !n.children.values().any(|&c| self.node(c).supp == n.supp),
            (Target::Maximal, FilterMode::ViaReporter) => true,
            (Target::Maximal, FilterMode::TreeLocal) => {
                !n.children.values().any(|&c| self.node(c).supp >= s_min)
            }
        };
        if should_emit {
            reporter.report(path, n.supp);
        }
        let mut children: Vec<(Item, NodeId)> =
            n.children.iter().map(|(&i, &c)| (i, c)).collect();
        children.sort_by(|a, b| b.0.cmp(&a.0));
        for (item, child_id) in children {
            path.push(item);
            self.emit_from(child_id, path, target, s_min, filter_mode, reporter);
            path.pop();
        }
    }
}

impl Repository for PrefixTree {
    fn intersect(&mut self, txn: &Transaction, s_min: u64, freq: &ItemFrequencies) -> Result<()> {
        let t_items: HashSet<Item> = txn.items.iter().copied().collect();
        let existing = self.all_paths();

        let mut credited: HashSet<NodeId> = HashSet::with_capacity(existing.len());
        // Path -> the largest pre-transaction support among the stored
        // paths it was intersected from. `P ∩ t ⊆ P`, so every past
        // transaction superset of `P` is also a superset of `P ∩ t`; when
        // several existing paths collapse onto the same intersection this
        // round, the tightest (largest) of their supports is the true
        // historical count (spec §4.2.1).
        let mut new_paths: HashMap<Vec<Item>, u64> = HashMap::new();

        for (id, path) in &existing {
            if path.iter().all(|it| t_items.contains(it)) {
                // Outcome 1: P ⊆ t — strengthen the existing node directly.
                self.node_mut(*id).supp += txn.weight;
                credited.insert(*id);
            } else {
                // Outcome 2/3: compute P ∩ t. Empty means no overlap at all.
                let inter: Vec<Item> = path
                    .iter()
                    .copied()
                    .filter(|it| t_items.contains(it))
                    .collect();
                if !inter.is_empty() {
                    let seed = self.node(*id).supp;
                    new_paths
                        .entry(inter)
                        .and_modify(|s| *s = (*s).max(seed))
                        .or_insert(seed);
                }
            }
        }

        // t itself must always be present (spec §4.2.1); it has no
        // existing-path history to inherit unless another intersection
        // this round already produced the same path.
        new_paths.entry(txn.items.clone()).or_insert(0);

        // A brand-new path's best possible future (the residual bound
        // from spec §4.2.2) determines whether it's worth materialising
        // at all; it will be swept away by the next `prune_by_residual`
        // otherwise.
        new_paths.retain(|p, _| freq.min_over(p) >= s_min);

        // Ascending by length: whenever one of this round's new paths is
        // a genuine prefix of another (common when an ancestor and a
        // descendant of the same stored path both intersect down to
        // related results), the shorter one must be materialised — with
        // its own seed — before the longer one walks through it, or
        // `HashMap` iteration order would decide which entry's seed wins
        // on the shared node.
        let mut new_paths: Vec<(Vec<Item>, u64)> = new_paths.into_iter().collect();
        new_paths.sort_by_key(|(p, _)| p.len());
        for (path, seed) in new_paths {
            self.insert_path(&path, txn.weight, seed, &mut credited)?;
        }
        Ok(())
    }

    fn prune_by_residual(&mut self, s_min: u64, freq: &ItemFrequencies) {
        self.prune_where(|tree, id, path| {
            let supp = tree.node(id).supp;
            supp + freq.min_over(path) < s_min
        });
    }

    fn prune_by_support(&mut self, s_min: u64) {
        self.prune_where(|tree, id, _path| tree.node(id).supp < s_min);
    }

    fn emit(
        &self,
        target: Target,
        s_min: u64,
        filter_mode: FilterMode,
        reporter: &mut dyn Reporter,
    ) -> Result<()> {
        let mut roots: Vec<(Item, NodeId)> =
            self.roots.iter().map(|(&i, &id)| (i, id)).collect();
        roots.sort_by(|a, b| b.0.cmp(&a.0));
        let mut path = Vec::new();
        for (item, id) in roots {
            path.push(item);
            self.emit_from(id, &mut path, target, s_min, filter_mode, reporter);
            path.pop();
        }
        Ok(())
    }

    fn node_count(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::VecReporter;

    fn txn(items: &[Item], w: u64) -> Transaction {
        Transaction {
            items: items.to_vec(),
            weight: w,
        }
    }

    fn mine(
        txns: &[(Vec<Item>, u64)],
        s_min: u64,
        target: Target,
    ) -> Vec<(Vec<Item>, u64)> {
        let freq = ItemFrequencies::new(vec![u64::MAX; 16]);
        let mut tree = PrefixTree::new();
        for (items, w) in txns {
            tree.intersect(&txn(items, *w), s_min, &freq).unwrap();
        }
        let mut reporter = VecReporter::new();
        reporter.set_supp_range(s_min, None);
        reporter.set_size_range(0, usize::MAX);
        reporter.set_target(target, false);
        tree.emit(target, s_min, FilterMode::TreeLocal, &mut reporter)
            .unwrap();
        let mut out: Vec<(Vec<Item>, u64)> = reporter
            .into_sets()
            .into_iter()
            .map(|s| (s.items, s.supp))
            .collect();
        out.sort();
        out
    }

    // Scenario 1 from spec §8 (items a<b<c recoded densely as 0,1,2).
    #[test]
    fn scenario_1_closed() {
        let txns = vec![
            (vec![2, 1, 0], 1), // {a,b,c}
            (vec![2, 1, 0], 1), // {a,b,c}
            (vec![1, 0], 1),    // {a,b}
            (vec![2, 0], 1),    // {a,c}
            (vec![2, 1], 1),    // {b,c}
        ];
        let got = mine(&txns, 3, Target::Closed);
        let expected = vec![
            (vec![0], 4),
            (vec![1], 4),
            (vec![2], 4),
            (vec![1, 0], 3),
            (vec![2, 0], 3),
            (vec![2, 1], 3),
        ];
        let mut expected = expected;
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn scenario_2_maximal() {
        let txns = vec![
            (vec![2, 1, 0], 1),
            (vec![2, 1, 0], 1),
            (vec![1, 0], 1),
            (vec![2, 0], 1),
            (vec![2, 1], 1),
        ];
        let got = mine(&txns, 3, Target::Maximal);
        let mut expected = vec![(vec![1, 0], 3), (vec![2, 0], 3), (vec![2, 1], 3)];
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn node_count_reflects_pruning() {
        let freq = ItemFrequencies::new(vec![100, 100]);
        let mut tree = PrefixTree::new();
        tree.intersect(&txn(&[1, 0], 1), 5, &freq).unwrap();
        assert!(tree.node_count() > 0);
        tree.prune_by_support(5);
        assert_eq!(tree.node_count(), 0);
    }
}
