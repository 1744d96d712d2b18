//! Process-wide, fire-once warnings.
//!
//! Each flag latches on first use and stays latched until the process exits.
//! They are shared by every reporter in the process.

use std::sync::atomic::{AtomicBool, Ordering};

/// A warning that is emitted at most once per process.
#[derive(Debug)]
pub struct OneTimeWarning {
    fired: AtomicBool,
}

impl OneTimeWarning {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Run `emit` if this is the first call. Returns whether it ran.
    pub fn fire(&self, emit: impl FnOnce()) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            emit();
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Default for OneTimeWarning {
    fn default() -> Self {
        Self::new()
    }
}

/// Histograms have no representation as a single typed point.
pub static HISTOGRAMS_UNSUPPORTED: OneTimeWarning = OneTimeWarning::new();

/// Timers have no representation as a single typed point.
pub static TIMERS_UNSUPPORTED: OneTimeWarning = OneTimeWarning::new();
