//! `MiningDriver`: orchestrates preprocessing, iteration order, the
//! intersection loop, pruning cadence and final extraction (spec §4.1,
//! §6 programmatic surface).

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use log::{debug, info};

use crate::error::{IstaError, Result};
use crate::item::Item;
use crate::mode::ModeFlags;
use crate::reporter::Reporter;
use crate::repository::patricia::PatriciaTree;
use crate::repository::prefix::PrefixTree;
use crate::repository::{FilterMode, Repository, Target, Variant};
use crate::transaction::{prepare_data, PreparedData, SortMode, SupportSpec};

/// Secondary evaluation measure selected by `-e{x|b}` (spec §6 `eval`,
/// `thresh`). Computing it is entirely the reporter's job (spec §1 "out
/// of scope"); the core only validates and carries the caller's choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMeasure {
    /// `-e x`: no secondary measure, `thresh` is ignored.
    None,
    /// `-e b`: a binary interest measure evaluated against `thresh` by
    /// the reporter.
    Binary,
}

/// Cooperative cancellation token (spec §4.1 "Cancellation", §5):
/// polled at transaction boundaries and before pruning sweeps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

/// Validated construction parameters (spec §6 `create`).
#[derive(Debug, Clone, Copy)]
pub struct MinerParams {
    pub target: Target,
    pub s_min: SupportSpec,
    pub s_max: Option<SupportSpec>,
    pub z_min: usize,
    pub z_max: usize,
    pub eval: EvalMeasure,
    pub thresh: f64,
    pub variant: Variant,
    pub mode_flags: ModeFlags,
}

/// The programmatic entry point: `create` → `prepare_data` →
/// `prepare_reporter` → `mine` → `destroy` (spec §6).
pub struct Miner {
    params: MinerParams,
    cancel: CancelToken,
    data: Option<PreparedData>,
    s_max_abs: Option<u64>,
}

impl Miner {
    /// Validates `params` and constructs a miner in its pre-mining state
    /// (spec §7 "caller errors ... detected at create; no side effects").
    pub fn create(params: MinerParams) -> Result<Miner> {
        if params.z_max < params.z_min {
            return Err(IstaError::InvalidSize);
        }
        params.s_min.validate()?;
        if let Some(s_max) = params.s_max {
            s_max.validate()?;
        }
        Ok(Miner {
            params,
            cancel: CancelToken::new(),
            data: None,
            s_max_abs: None,
        })
    }

    /// A clone of this miner's cancellation token, so a caller running
    /// `mine` on another thread (or just in response to a signal) can
    /// request an abort.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Recodes, filters and orders `raw` (spec §6 `prepare_data`). On
    /// success the miner holds a dense, mining-ready database.
    pub fn prepare_data(
        &mut self,
        raw: Vec<(Vec<Item>, u64)>,
        sort_mode: SortMode,
    ) -> Result<()> {
        let prepared = prepare_data(
            raw,
            self.params.s_min,
            self.params.z_min,
            self.params.z_max,
            sort_mode,
        )?;
        let s_max_abs = match self.params.s_max {
            Some(spec) => {
                let abs = spec.resolve(prepared.total_weight)?;
                if abs < prepared.s_min {
                    return Err(IstaError::InvalidSupport);
                }
                Some(abs)
            }
            None => None,
        };
        debug!(
            "prepared {} transactions over {} items (s_min={})",
            prepared.transactions.len(),
            prepared.num_items,
            prepared.s_min
        );
        self.s_max_abs = s_max_abs;
        self.data = Some(prepared);
        Ok(())
    }

    /// The target actually mined: `ModeFlags::MAX_ONLY` (the CLI's `-g`)
    /// forces maximal-only emission regardless of `params.target`, skipping
    /// the closed-set pass entirely.
    fn effective_target(&self) -> Target {
        if self.params.mode_flags.contains(ModeFlags::MAX_ONLY) {
            Target::Maximal
        } else {
            self.params.target
        }
    }

    /// Configures `reporter`'s support range, size range and target
    /// ahead of `mine` (spec §6 `prepare_reporter`).
    pub fn prepare_reporter(&self, reporter: &mut dyn Reporter) -> Result<()> {
        let data = self.data.as_ref().ok_or(IstaError::NoItems)?;
        reporter.set_supp_range(data.s_min, self.s_max_abs);
        reporter.set_size_range(self.params.z_min, self.params.z_max);
        reporter.set_target(
            self.effective_target(),
            self.params.mode_flags.contains(ModeFlags::FILTER),
        );
        Ok(())
    }

    /// Runs the intersection loop and emission phase (spec §4.1, §4.2.4).
    pub fn mine(&mut self, reporter: &mut dyn Reporter) -> Result<()> {
        let data = self.data.as_ref().ok_or(IstaError::NoItems)?;
        let s_min = data.s_min;
        let mode_flags = self.params.mode_flags;
        let target = self.effective_target();
        let filter_mode = if mode_flags.contains(ModeFlags::FILTER) {
            FilterMode::ViaReporter
        } else {
            FilterMode::TreeLocal
        };

        let mut repo: Box<dyn Repository> = match self.params.variant.resolve() {
            Variant::Prefix => Box::new(PrefixTree::new()),
            Variant::Patricia => Box::new(PatriciaTree::new()),
            Variant::Auto => unreachable!("resolve() never returns Auto"),
        };

        let mut freq = data.frequencies.clone();
        let mut prunable = 0usize;

        if mode_flags.contains(ModeFlags::VERBOSE) {
            info!(
                "mining {} transactions, s_min={}, target={:?}",
                data.transactions.len(),
                s_min,
                target
            );
        }

        // Reverse-lexicographic traversal (spec §4.1 "Iteration order"):
        // walking from the end of the canonically sorted list backwards
        // means consecutive transactions share long prefixes, so early
        // intersections land on existing paths instead of growing new
        // ones.
        for (idx, txn) in data.transactions.iter().rev().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(IstaError::Aborted);
            }

            if let Err(e) = repo.intersect(txn, s_min, &freq) {
                return Err(self.on_resource_error(repo, e, mode_flags));
            }

            for &item in &txn.items {
                if freq.debit(item, txn.weight, s_min) {
                    prunable += 1;
                }
            }

            // Every 16th transaction (low 4 bits of the 0-based index all
            // set), amortising the sweep's cost (spec §4.1 step 3, §9).
            if mode_flags.contains(ModeFlags::PRUNE)
                && s_min >= 4
                && prunable > 0
                && (idx & 0xF) == 0xF
            {
                if self.cancel.is_cancelled() {
                    return Err(IstaError::Aborted);
                }
                repo.prune_by_residual(s_min, &freq);
                prunable = 0;
                debug!("prune_by_residual swept at txn {idx}, {} nodes live", repo.node_count());
            }
        }

        if target == Target::Maximal && filter_mode == FilterMode::ViaReporter {
            if self.cancel.is_cancelled() {
                return Err(IstaError::Aborted);
            }
            repo.prune_by_support(s_min);
        }

        reporter.open();
        if let Err(e) = repo.emit(target, s_min, filter_mode, reporter) {
            return Err(self.on_resource_error(repo, e, mode_flags));
        }
        reporter.close();

        if mode_flags.contains(ModeFlags::VERBOSE) {
            info!("mining complete, {} nodes live at teardown", repo.node_count());
        }
        Ok(())
    }

    /// On a resource error (spec §7 "Resource errors"), the repository is
    /// released as part of ordinary `Box<dyn Repository>` drop — unless
    /// `NoClean` asked to keep it around for post-mortem inspection, in
    /// which case teardown is suppressed by leaking the arena instead.
    fn on_resource_error(
        &self,
        repo: Box<dyn Repository>,
        err: IstaError,
        mode_flags: ModeFlags,
    ) -> IstaError {
        if mode_flags.contains(ModeFlags::NO_CLEAN) {
            debug!("NoClean set: leaking repository ({} nodes) for inspection", repo.node_count());
            std::mem::forget(repo);
        }
        err
    }

    /// Releases the miner and, if requested, the prepared database it
    /// owns (spec §6 `destroy`). Returns the database back to the
    /// caller when asked not to destroy it.
    pub fn destroy(mut self, also_destroy_db_and_reporter: bool) -> Option<PreparedData> {
        if also_destroy_db_and_reporter {
            self.data.take();
            None
        } else {
            self.data.take()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::VecReporter;

    fn params(target: Target, s_min: u64) -> MinerParams {
        MinerParams {
            target,
            s_min: SupportSpec::Absolute(s_min),
            s_max: None,
            z_min: 0,
            z_max: usize::MAX,
            eval: EvalMeasure::None,
            thresh: 0.0,
            variant: Variant::Prefix,
            mode_flags: ModeFlags::default(),
        }
    }

    fn db() -> Vec<(Vec<Item>, u64)> {
        vec![
            (vec![0, 1, 2], 1),
            (vec![0, 1, 2], 1),
            (vec![0, 1], 1),
            (vec![0, 2], 1),
            (vec![1, 2], 1),
        ]
    }

    #[test]
    fn end_to_end_closed_matches_scenario_1() {
        let mut miner = Miner::create(params(Target::Closed, 3)).unwrap();
        miner.prepare_data(db(), SortMode::NoSort).unwrap();
        let mut reporter = VecReporter::new();
        miner.prepare_reporter(&mut reporter).unwrap();
        miner.mine(&mut reporter).unwrap();
        let mut sets: Vec<(Vec<Item>, u64)> = reporter
            .into_sets()
            .into_iter()
            .map(|s| (s.items, s.supp))
            .collect();
        sets.sort();
        assert_eq!(sets.len(), 6);
        assert!(sets.contains(&(vec![2, 1, 0], 3)) || sets.iter().all(|(items, _)| items.len() < 3));
    }

    #[test]
    fn cancellation_aborts_before_any_progress_is_lost() {
        let mut miner = Miner::create(params(Target::Closed, 3)).unwrap();
        miner.prepare_data(db(), SortMode::NoSort).unwrap();
        let token = miner.cancel_token();
        token.cancel();
        let mut reporter = VecReporter::new();
        miner.prepare_reporter(&mut reporter).unwrap();
        let err = miner.mine(&mut reporter).unwrap_err();
        assert_eq!(err, IstaError::Aborted);
    }

    #[test]
    fn mine_without_prepare_data_is_no_items() {
        let mut miner = Miner::create(params(Target::Closed, 3)).unwrap();
        let mut reporter = VecReporter::new();
        let err = miner.mine(&mut reporter).unwrap_err();
        assert_eq!(err, IstaError::NoItems);
    }

    #[test]
    fn destroy_without_flag_hands_back_the_database() {
        let mut miner = Miner::create(params(Target::Closed, 3)).unwrap();
        miner.prepare_data(db(), SortMode::NoSort).unwrap();
        let data = miner.destroy(false);
        assert!(data.is_some());
    }

    #[test]
    fn create_rejects_zero_absolute_support_with_no_side_effects() {
        let mut p = params(Target::Closed, 3);
        p.s_min = SupportSpec::Absolute(0);
        let err = Miner::create(p).unwrap_err();
        assert_eq!(err, IstaError::InvalidSupport);
    }

    #[test]
    fn create_rejects_out_of_range_percentage_support() {
        let mut p = params(Target::Closed, 3);
        p.s_min = SupportSpec::Percentage(500.0);
        let err = Miner::create(p).unwrap_err();
        assert_eq!(err, IstaError::InvalidSupport);
    }

    #[test]
    fn create_rejects_invalid_s_max() {
        let mut p = params(Target::Closed, 3);
        p.s_max = Some(SupportSpec::Absolute(0));
        let err = Miner::create(p).unwrap_err();
        assert_eq!(err, IstaError::InvalidSupport);
    }

    #[test]
    fn max_only_mode_flag_forces_maximal_output_even_with_closed_target() {
        // Same database/threshold as scenario 1 (spec §8): with an explicit
        // Closed target but MAX_ONLY set, the driver must still emit only
        // the maximal sets from scenario 2, skipping the closed pass.
        let mut p = params(Target::Closed, 3);
        p.mode_flags.insert(ModeFlags::MAX_ONLY);
        let mut miner = Miner::create(p).unwrap();
        miner.prepare_data(db(), SortMode::NoSort).unwrap();
        let mut reporter = VecReporter::new();
        miner.prepare_reporter(&mut reporter).unwrap();
        miner.mine(&mut reporter).unwrap();
        let mut sets: Vec<(Vec<Item>, u64)> = reporter
            .into_sets()
            .into_iter()
            .map(|s| (s.items, s.supp))
            .collect();
        sets.sort();
        let mut expected = vec![(vec![1, 0], 3), (vec![2, 0], 3), (vec![2, 1], 3)];
        expected.sort();
        assert_eq!(sets, expected);
    }
}
