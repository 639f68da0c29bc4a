//! Mining mode flags (spec §6: `mode_flags`).

use bitflags::bitflags;

bitflags! {
    /// Bitset of optional mining behaviours, mirroring the reference CLI's
    /// `-p`, `-j`, `-g`, `-q`, `-R`, `-Z` switches (spec §6, GLOSSARY).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u32 {
        /// Enable periodic `prune_by_residual` sweeps during intersection.
        const PRUNE           = 1 << 0;
        /// Select reporter-based maximality filtering over tree-local filtering.
        const FILTER          = 1 << 1;
        /// Only ever emit maximal sets, skipping the closed-set pass entirely.
        const MAX_ONLY        = 1 << 2;
        /// Pre-render integer supports for faster reporter output.
        const PREFORMAT       = 1 << 3;
        /// Emit progress banners at `log::info!`/`log::debug!` level.
        const VERBOSE         = 1 << 4;
        /// Suppress repository teardown on error paths, for debugging.
        const NO_CLEAN        = 1 << 5;
        /// Ask the reporter to compress its output stream.
        const COMPRESS_OUTPUT = 1 << 6;
    }
}

impl Default for ModeFlags {
    fn default() -> Self {
        ModeFlags::PRUNE
    }
}
