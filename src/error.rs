//! Error taxonomy for the mining core (see spec §6, §7).

use thiserror::Error;

/// Errors surfaced by [`crate::driver::Miner`] and the repository layer.
///
/// Mirrors the reference implementation's small negative-integer error
/// enumeration; caller errors are detected at `create`, input errors at
/// `prepare_data`, resource errors at any allocation site, and
/// cancellation at the documented polling sites (transaction boundaries,
/// before pruning sweeps).
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum IstaError {
    #[error("allocation failed while growing the intersection repository")]
    OutOfMemory,

    #[error("no frequent items remain after recoding")]
    NoItems,

    #[error("invalid mining target")]
    InvalidTarget,

    #[error("invalid item set size range")]
    InvalidSize,

    #[error("invalid support threshold")]
    InvalidSupport,

    #[error("invalid evaluation measure")]
    InvalidMeasure,

    #[error("invalid repository variant")]
    InvalidVariant,

    #[error("mining was cancelled")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, IstaError>;
