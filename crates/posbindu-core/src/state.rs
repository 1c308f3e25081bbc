//! Shared sync state types.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where the sync engine currently is within a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Draining,
    Pulling,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Draining => "draining",
            Self::Pulling => "pulling",
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Draining => 1,
            Self::Pulling => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Draining,
            2 => Self::Pulling,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free cell holding a [`SyncPhase`].
///
/// Leaving `Idle` only happens through [`PhaseCell::try_begin`], which is a
/// single compare-and-swap, so at most one pass can own the cell at a time.
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(SyncPhase::Idle.to_u8()))
    }

    pub fn get(&self) -> SyncPhase {
        SyncPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `Idle -> Draining`. Returns `false` if a pass already owns the cell.
    pub fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(
                SyncPhase::Idle.to_u8(),
                SyncPhase::Draining.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn set(&self, phase: SyncPhase) {
        self.0.store(phase.to_u8(), Ordering::Release);
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_caller_leaves_idle() {
        let cell = PhaseCell::new();
        assert!(cell.try_begin());
        assert!(!cell.try_begin());
        assert_eq!(cell.get(), SyncPhase::Draining);

        cell.set(SyncPhase::Pulling);
        assert!(!cell.try_begin());

        cell.set(SyncPhase::Idle);
        assert!(cell.try_begin());
    }

    #[test]
    fn phase_names() {
        assert_eq!(SyncPhase::Idle.to_string(), "idle");
        assert_eq!(SyncPhase::Pulling.as_str(), "pulling");
    }
}
