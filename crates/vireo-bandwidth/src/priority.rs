//! Subscriber priority weights.

use std::fmt;

/// Ordered priority weight for a bandwidth consumer.
///
/// Shares are allocated proportionally to weights: a subscriber with weight 2
/// receives twice the bandwidth of one with weight 1. The zero level
/// ([`Priority::LEVEL0`]) excludes a subscriber from distribution entirely;
/// it stays registered but never receives a dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u32);

impl Priority {
    /// Excluded from distribution; receives nothing.
    pub const LEVEL0: Self = Self(0);
    pub const LEVEL1: Self = Self(1);
    pub const LEVEL2: Self = Self(2);
    pub const LEVEL3: Self = Self(3);
    pub const LEVEL4: Self = Self(4);
    pub const LEVEL5: Self = Self(5);

    /// Create a priority with an arbitrary weight.
    #[must_use]
    pub const fn new(level: u32) -> Self {
        Self(level)
    }

    /// A zero-weight subscriber is skipped by the distribution loop.
    #[must_use]
    pub const fn is_inactive(self) -> bool {
        self.0 == 0
    }

    /// Weight used in share computation.
    #[must_use]
    pub const fn weight(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_inactive() {
        assert_eq!(Priority::default(), Priority::LEVEL0);
        assert!(Priority::default().is_inactive());
    }

    #[test]
    fn levels_are_ordered() {
        assert!(Priority::LEVEL0 < Priority::LEVEL1);
        assert!(Priority::LEVEL1 < Priority::LEVEL5);
        assert!(Priority::new(100) > Priority::LEVEL5);
    }

    #[test]
    fn weight_matches_level() {
        assert_eq!(Priority::LEVEL3.weight(), 3);
        assert_eq!(Priority::new(42).weight(), 42);
    }
}
