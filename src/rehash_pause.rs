//! Counted pause for the rehash engine.
//!
//! Safe iterators and scans hold positions inside the bucket arrays, so
//! entries must not migrate underneath them. Each one pauses rehashing and
//! resumes it when done. The pause is a count, not a flag, so nested and
//! overlapping pauses compose: rehashing may run only at depth zero.
//!
//! Pauses that live inside one call take a `PauseGuard`, which resumes on
//! drop even when a caller callback unwinds. Pauses that span calls (a safe
//! iterator) pair `pause` with `resume` explicitly.

use core::cell::Cell;

/// Per-table pause depth. Embed this in the table and pair every `pause`
/// with exactly one `resume`, or hold a guard from `hold`.
#[derive(Debug, Default)]
pub(crate) struct PauseCounter {
    depth: Cell<u32>,
}

impl PauseCounter {
    pub(crate) const fn new() -> Self {
        Self {
            depth: Cell::new(0),
        }
    }

    #[inline]
    pub(crate) fn pause(&self) {
        let d = self.depth.get();
        assert!(d < u32::MAX, "rehash pause counter overflow");
        self.depth.set(d + 1);
    }

    /// Panics on an unmatched resume; a negative depth is a coding error.
    #[inline]
    pub(crate) fn resume(&self) {
        let d = self.depth.get();
        assert!(d > 0, "rehash resumed more times than it was paused");
        self.depth.set(d - 1);
    }

    /// Pause until the returned guard is dropped.
    #[inline]
    pub(crate) fn hold(&self) -> PauseGuard<'_> {
        self.pause();
        PauseGuard { owner: self }
    }

    #[inline]
    pub(crate) fn is_paused(&self) -> bool {
        self.depth.get() > 0
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> u32 {
        self.depth.get()
    }
}

/// RAII guard returned by `PauseCounter::hold`.
pub(crate) struct PauseGuard<'a> {
    owner: &'a PauseCounter,
}

impl<'a> Drop for PauseGuard<'a> {
    fn drop(&mut self) {
        self.owner.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::PauseCounter;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn pause_and_resume_is_ok() {
        let p = PauseCounter::new();
        assert!(!p.is_paused());
        p.pause();
        assert!(p.is_paused());
        p.resume();
        assert!(!p.is_paused());
    }

    #[test]
    fn nested_pauses_compose() {
        let p = PauseCounter::new();
        p.pause();
        p.pause();
        assert_eq!(p.depth(), 2);
        p.resume();
        assert!(p.is_paused(), "one outstanding pause must still block");
        p.resume();
        assert!(!p.is_paused());
    }

    #[test]
    fn unmatched_resume_panics() {
        let res = catch_unwind(|| {
            let p = PauseCounter::new();
            p.resume();
        });
        assert!(res.is_err(), "expected unmatched resume to panic");
    }

    #[test]
    fn guard_resumes_on_unwind() {
        let p = PauseCounter::new();
        let res = catch_unwind(AssertUnwindSafe(|| {
            let _g = p.hold();
            assert!(p.is_paused());
            panic!("callback failed");
        }));
        assert!(res.is_err());
        assert_eq!(p.depth(), 0);
    }
}
