//! Cycle Guard - Skip-not-queue Overlap Protection
//!
//! A unit's flag is raised for the duration of one cycle. A second cycle
//! for the same unit fails to acquire and is skipped. The flag drops on
//! every exit path, including panics and cancelled futures.

use std::sync::atomic::{AtomicBool, Ordering};

/// Held while a cycle is in flight.
#[derive(Debug)]
pub struct CycleGuard<'a> {
  flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
  /// Raise the flag, or `None` if a cycle already holds it.
  pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self { flag })
  }
}

impl Drop for CycleGuard<'_> {
  fn drop(&mut self) {
    self.flag.store(false, Ordering::Release);
  }
}
