//! Closed/maximal frequent item set mining via an intersection
//! repository (the IsTa method).
//!
//! The mining core intersects transactions into a tree that
//! accumulates every distinct non-empty intersection observed so far,
//! then walks that tree once to emit every closed or maximal frequent
//! set. Two interchangeable repository shapes are provided —
//! [`repository::prefix::PrefixTree`] (one node per item) and
//! [`repository::patricia::PatriciaTree`] (path-compressed) — behind a
//! single [`repository::Repository`] trait, so callers pick a variant
//! without the rest of the pipeline changing.
//!
//! Transaction file parsing, the CLI, and output formatting are thin
//! wrappers around this library; see `src/bin/ista.rs`.

pub mod driver;
pub mod error;
pub mod item;
pub mod itemizer;
pub mod mode;
pub mod reader;
pub mod reporter;
pub mod repository;
pub mod transaction;

pub use driver::{CancelToken, EvalMeasure, Miner, MinerParams};
pub use error::{IstaError, Result};
pub use item::{Item, ItemFrequencies};
pub use mode::ModeFlags;
pub use reporter::{Reporter, VecReporter};
pub use repository::{FilterMode, ItemSet, Repository, Target, Variant};
pub use transaction::{PreparedData, SortMode, SupportSpec, Transaction};
