//! Path-compressed intersection repository (spec §4.3).
//!
//! Each node carries an edge *label*: a non-empty contiguous descending
//! run of items shared by every stored itemset in its subtree. Spec
//! §4.3's support semantics invariant — "the support on an edge means
//! every item in the edge label is present with this support" — is what
//! makes this safe: two prefixes that would ever need different support
//! counts are, by construction, never collapsed onto the same edge; a
//! split materialises the boundary the moment one is needed.
//!
//! `intersect` reuses the same three-outcome, credit-once-per-transaction
//! strategy [`super::prefix::PrefixTree`] uses, including seeding any
//! freshly created node with the pre-transaction support of the existing
//! path(s) it was intersected from rather than zero (see that module's
//! notes); only path materialisation (here, with edge splitting) differs.

use std::collections::{HashMap, HashSet};

use crate::error::{IstaError, Result};
use crate::item::{Item, ItemFrequencies};
use crate::reporter::Reporter;
use crate::repository::{FilterMode, Repository, Target};
use crate::transaction::Transaction;

type NodeId = usize;

struct Node {
    label: Vec<Item>,
    supp: u64,
    parent: Option<NodeId>,
    children: HashMap<Item, NodeId>,
}

/// Path-compressed repository (spec §4.3). Preferred over
/// [`super::prefix::PrefixTree`] when transactions are long and the item
/// universe is large, since each stored itemset costs far fewer nodes.
#[derive(Default)]
pub struct PatriciaTree {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    roots: HashMap<Item, NodeId>,
    live: usize,
}

fn common_prefix_len(a: &[Item], b: &[Item]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

impl PatriciaTree {
    pub fn new() -> PatriciaTree {
        PatriciaTree::default()
    }

    fn alloc(&mut self, label: Vec<Item>, supp: u64, parent: Option<NodeId>) -> Result<NodeId> {
        let node = Node {
            label,
            supp,
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

    fn child_map(&self, parent: Option<NodeId>) -> &HashMap<Item, NodeId> {
        match parent {
            Some(p) => &self.node(p).children,
            None => &self.roots,
        }
    }

    fn child_map_mut(&mut self, parent: Option<NodeId>) -> &mut HashMap<Item, NodeId> {
        match parent {
            Some(p) => &mut self.node_mut(p).children,
            None => &mut self.roots,
        }
    }

    fn all_paths(&self) -> Vec<(NodeId, Vec<Item>)> {
        let mut out = Vec::with_capacity(self.live);
        let mut path = Vec::new();
        let mut roots: Vec<(Item, NodeId)> = self.roots.iter().map(|(&i, &id)| (i, id)).collect();
        roots.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, id) in roots {
            self.collect(id, &mut path, &mut out);
        }
        out
    }

    fn collect(&self, id: NodeId, path: &mut Vec<Item>, out: &mut Vec<(NodeId, Vec<Item>)>) {
        let n = self.node(id);
        path.extend_from_slice(&n.label);
        out.push((id, path.clone()));
        let mut children: Vec<(Item, NodeId)> = n.children.iter().map(|(&i, &c)| (i, c)).collect();
        children.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, child_id) in children {
            self.collect(child_id, path, out);
        }
        path.truncate(path.len() - n.label.len());
    }

    /// Insert/credit `path` (a root-to-leaf item sequence guaranteed to
    /// be non-empty), splitting edges as needed (spec §4.3). A brand-new
    /// terminal node (the `None` branch, or the fresh suffix after a
    /// three-way split) starts from `seed` — the pre-transaction support
    /// of the existing path this intersection came from — plus `w`,
    /// rather than `w` alone, so it doesn't undercount history that
    /// predates its creation.
    fn insert_path(
        &mut self,
        path: &[Item],
        w: u64,
        seed: u64,
        credited: &mut HashSet<NodeId>,
    ) -> Result<()> {
        let mut parent: Option<NodeId> = None;
        let mut remaining = path;
        loop {
            let first = remaining[0];
            let existing = self.child_map(parent).get(&first).copied();
            let child_id = match existing {
                Some(id) => id,
                None => {
                    let id = self.alloc(remaining.to_vec(), seed, parent)?;
                    self.child_map_mut(parent).insert(first, id);
                    credited.insert(id);
                    self.node_mut(id).supp += w;
                    return Ok(());
                }
            };
            let label_len = self.node(child_id).label.len();
            let k = {
                let label = &self.node(child_id).label;
                common_prefix_len(label, remaining)
            };

            if k == label_len && k == remaining.len() {
                if credited.insert(child_id) {
                    self.node_mut(child_id).supp += w;
                }
                return Ok(());
            } else if k == label_len {
                // Whole edge consumed; keep descending.
                if credited.insert(child_id) {
                    self.node_mut(child_id).supp += w;
                }
                parent = Some(child_id);
                remaining = &remaining[k..];
                continue;
            } else if k == remaining.len() {
                // `remaining` ends partway through this edge: split so the
                // new path's endpoint becomes a node boundary.
                self.split_edge(parent, first, child_id, k)?;
                let upper = self.child_map(parent)[&first];
                if credited.insert(upper) {
                    self.node_mut(upper).supp += w;
                }
                return Ok(());
            } else {
                // Both `remaining` and the edge diverge before either ends:
                // split, then attach a fresh sibling for the new suffix.
                self.split_edge(parent, first, child_id, k)?;
                let upper = self.child_map(parent)[&first];
                if credited.insert(upper) {
                    self.node_mut(upper).supp += w;
                }
                let suffix = &remaining[k..];
                let new_id = self.alloc(suffix.to_vec(), seed, Some(upper))?;
                self.node_mut(upper).children.insert(suffix[0], new_id);
                credited.insert(new_id);
                self.node_mut(new_id).supp += w;
                return Ok(());
            }
        }
    }

    /// Splits the edge from `parent` to `child_id` (currently keyed by
    /// `first`) at offset `k`: a new upper node takes `label[0..k]` and
    /// inherits `child_id`'s prior support; `child_id` keeps its subtree
    /// but its label shrinks to `label[k..]`.
    fn split_edge(
        &mut self,
        parent: Option<NodeId>,
        first: Item,
        child_id: NodeId,
        k: usize,
    ) -> Result<()> {
        let old_supp = self.node(child_id).supp;
        let (upper_label, lower_label) = {
            let label = &self.node(child_id).label;
            (label[..k].to_vec(), label[k..].to_vec())
        };
        let upper_id = self.alloc(upper_label, old_supp, parent)?;
        self.child_map_mut(parent).insert(first, upper_id);

        let lower_first = lower_label[0];
        self.node_mut(child_id).label = lower_label;
        self.node_mut(child_id).parent = Some(upper_id);
        self.node_mut(upper_id).children.insert(lower_first, child_id);
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

    fn prune_where(&mut self, mut fails: impl FnMut(&Self, NodeId, &[Item]) -> bool) {
        let roots: Vec<(Item, NodeId)> = self.roots.iter().map(|(&i, &id)| (i, id)).collect();
        let mut path = Vec::new();
        for (item, id) in roots {
            let label = self.node(id).label.clone();
            path.extend_from_slice(&label);
            if fails(self, id, &path) {
                self.free_subtree(id);
                self.roots.remove(&item);
            } else {
                self.prune_subtree(id, &mut path, &mut fails);
            }
            path.truncate(path.len() - label.len());
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
        for (first, child_id) in children {
            let label = self.node(child_id).label.clone();
            path.extend_from_slice(&label);
            if fails(self, child_id, path) {
                self.free_subtree(child_id);
                self.node_mut(id).children.remove(&first);
            } else {
                self.prune_subtree(child_id, path, fails);
            }
            path.truncate(path.len() - label.len());
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
        path.extend_from_slice(&n.label);
        if n.supp < s_min {
            path.truncate(path.len() - n.label.len());
            return;
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
        for (_, child_id) in children {
            self.emit_from(child_id, path, target, s_min, filter_mode, reporter);
        }
        path.truncate(path.len() - n.label.len());
    }
}

impl Repository for PatriciaTree {
    fn intersect(&mut self, txn: &Transaction, s_min: u64, freq: &ItemFrequencies) -> Result<()> {
        let t_items: HashSet<Item> = txn.items.iter().copied().collect();
        let existing = self.all_paths();

        let mut credited: HashSet<NodeId> = HashSet::with_capacity(existing.len());
        // Path -> the largest pre-transaction support among the stored
        // paths it was intersected from (see the prefix tree's `intersect`
        // for the derivation; same argument applies here unchanged).
        let mut new_paths: HashMap<Vec<Item>, u64> = HashMap::new();

        for (id, path) in &existing {
            if path.iter().all(|it| t_items.contains(it)) {
                self.node_mut(*id).supp += txn.weight;
                credited.insert(*id);
            } else {
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

        new_paths.entry(txn.items.clone()).or_insert(0);
        new_paths.retain(|p, _| freq.min_over(p) >= s_min);

        // See the prefix tree's `intersect`: ascending length so a
        // shorter path that is a genuine prefix of a longer one in this
        // round is always materialised (with its own seed) first.
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
        let mut roots: Vec<(Item, NodeId)> = self.roots.iter().map(|(&i, &id)| (i, id)).collect();
        roots.sort_by(|a, b| b.0.cmp(&a.0));
        let mut path = Vec::new();
        for (_, id) in roots {
            self.emit_from(id, &mut path, target, s_min, filter_mode, reporter);
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

    fn mine(txns: &[(Vec<Item>, u64)], s_min: u64, target: Target) -> Vec<(Vec<Item>, u64)> {
        let freq = ItemFrequencies::new(vec![u64::MAX; 16]);
        let mut tree = PatriciaTree::new();
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

    #[test]
    fn scenario_1_closed() {
        let txns = vec![
            (vec![2, 1, 0], 1),
            (vec![2, 1, 0], 1),
            (vec![1, 0], 1),
            (vec![2, 0], 1),
            (vec![2, 1], 1),
        ];
        let got = mine(&txns, 3, Target::Closed);
        let mut expected = vec![
            (vec![0], 4),
            (vec![1], 4),
            (vec![2], 4),
            (vec![1, 0], 3),
            (vec![2, 0], 3),
            (vec![2, 1], 3),
        ];
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn scenario_3_closed_with_an_exact_edge_split() {
        // {1,2,3,4}x5, {3,4}x3, {1,2}x3 (using dense codes 4>3>2>1).
        let txns = vec![
            (vec![4, 3, 2, 1], 5),
            (vec![4, 3], 3),
            (vec![2, 1], 3),
        ];
        let got = mine(&txns, 5, Target::Closed);
        // 4 and 3 never occur apart (same for 2 and 1), so the singles
        // are permanently support-equivalent to their pair and aren't
        // themselves closed (spec §8 property 4).
        let mut expected = vec![(vec![4, 3], 8), (vec![2, 1], 8), (vec![4, 3, 2, 1], 5)];
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn splitting_keeps_node_count_small_relative_to_prefix_tree() {
        let freq = ItemFrequencies::new(vec![u64::MAX; 8]);
        let mut tree = PatriciaTree::new();
        tree.intersect(&txn(&[4, 3, 2, 1], 1), 1, &freq).unwrap();
        // A single 4-item transaction with nothing yet to branch against
        // should live on one edge: exactly one node.
        assert_eq!(tree.node_count(), 1);
    }
}
