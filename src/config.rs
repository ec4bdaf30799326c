//! Resize policy and per-table configuration.
//!
//! The resize policy exists process-wide because the host switches it as a
//! whole (for example while a fork-based snapshot shares pages with a child
//! process and rehashing would dirty them). A table may pin its own policy
//! through `DictConfig::resize_policy`; `None` follows the process-wide one.

use std::sync::atomic::{AtomicU8, Ordering};

/// When tables may grow, shrink and migrate entries.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ResizePolicy {
    /// Resize whenever the load factor reaches 1.
    Enabled = 0,
    /// Resize only past the force-resize ratio; rehash only toward a much
    /// larger table.
    AvoidIfPossible = 1,
    /// Never resize or rehash.
    Forbidden = 2,
}

impl ResizePolicy {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ResizePolicy::AvoidIfPossible,
            2 => ResizePolicy::Forbidden,
            _ => ResizePolicy::Enabled,
        }
    }
}

static GLOBAL_RESIZE_POLICY: AtomicU8 = AtomicU8::new(ResizePolicy::Enabled as u8);

/// Set the process-wide resize policy.
pub fn set_resize_policy(policy: ResizePolicy) {
    GLOBAL_RESIZE_POLICY.store(policy as u8, Ordering::Relaxed);
}

/// Current process-wide resize policy.
pub fn resize_policy() -> ResizePolicy {
    ResizePolicy::from_u8(GLOBAL_RESIZE_POLICY.load(Ordering::Relaxed))
}

/// Tunables for a single table.
#[derive(Clone, Debug, PartialEq)]
pub struct DictConfig {
    /// Exponent of the first allocation and the floor for shrinking.
    pub initial_exp: u8,
    /// Load factor (`used / size`) past which growth is forced even when the
    /// policy is `AvoidIfPossible`.
    pub force_resize_ratio: usize,
    /// Buckets per batch in `rehash_milliseconds`.
    pub rehash_batch: usize,
    /// `sample(count)` gives up after `count * sample_steps_factor` buckets.
    pub sample_steps_factor: usize,
    /// Batch size drawn by `fair_random_entry`.
    pub fair_batch: usize,
    /// Per-table policy override.
    pub resize_policy: Option<ResizePolicy>,
}

impl Default for DictConfig {
    fn default() -> Self {
        Self {
            initial_exp: 2,
            force_resize_ratio: 5,
            rehash_batch: 100,
            sample_steps_factor: 10,
            fair_batch: 15,
            resize_policy: None,
        }
    }
}

impl DictConfig {
    pub fn with_initial_exp(mut self, exp: u8) -> Self {
        self.initial_exp = exp;
        self
    }

    pub fn with_force_resize_ratio(mut self, ratio: usize) -> Self {
        self.force_resize_ratio = ratio;
        self
    }

    pub fn with_rehash_batch(mut self, batch: usize) -> Self {
        self.rehash_batch = batch;
        self
    }

    pub fn with_resize_policy(mut self, policy: ResizePolicy) -> Self {
        self.resize_policy = Some(policy);
        self
    }

    pub fn initial_size(&self) -> usize {
        1usize << self.initial_exp.min((usize::BITS - 1) as u8)
    }

    /// The table's own policy if pinned, else the process-wide one.
    pub fn effective_policy(&self) -> ResizePolicy {
        self.resize_policy.unwrap_or_else(resize_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tunables() {
        let c = DictConfig::default();
        assert_eq!(c.initial_size(), 4);
        assert_eq!(c.force_resize_ratio, 5);
        assert_eq!(c.rehash_batch, 100);
        assert_eq!(c.fair_batch, 15);
        assert!(c.resize_policy.is_none());
    }

    #[test]
    fn pinned_policy_wins_over_global() {
        let c = DictConfig::default().with_resize_policy(ResizePolicy::Forbidden);
        assert_eq!(c.effective_policy(), ResizePolicy::Forbidden);
        let c = DictConfig::default().with_resize_policy(ResizePolicy::AvoidIfPossible);
        assert_eq!(c.effective_policy(), ResizePolicy::AvoidIfPossible);
    }

    #[test]
    fn policy_round_trips_through_u8() {
        for p in [
            ResizePolicy::Enabled,
            ResizePolicy::AvoidIfPossible,
            ResizePolicy::Forbidden,
        ] {
            assert_eq!(ResizePolicy::from_u8(p as u8), p);
        }
    }
}
