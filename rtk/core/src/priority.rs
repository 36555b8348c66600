//! Scheduling priorities
//!
//! Inside the kernel a numerically higher priority is more urgent, so the
//! derived `Ord` reads naturally: `a > b` means `a` preempts `b`. Callers of
//! the C binding use the opposite convention (0 is the most urgent level);
//! [`Priority::from_external`] is the single place where the scale flips.

use core::fmt;

use crate::{KResult, KernelError, SCHED_PRIO_LEVELS};

/// Type-safe scheduling priority in `0..SCHED_PRIO_LEVELS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Least urgent level
    pub const LOWEST: Priority = Priority(0);

    /// Most urgent level
    pub const HIGHEST: Priority = Priority(SCHED_PRIO_LEVELS as u8 - 1);

    /// Creates a priority, rejecting values outside the configured levels.
    ///
    /// Out-of-range values are never clamped: a clamped priority would run
    /// the thread at a level its creator did not ask for.
    pub const fn new(level: u8) -> KResult<Self> {
        if (level as usize) < SCHED_PRIO_LEVELS {
            Ok(Priority(level))
        } else {
            Err(KernelError::InvalidPriority(level))
        }
    }

    /// Creates a priority without validation (const contexts)
    pub const fn new_unchecked(level: u8) -> Self {
        Priority(level)
    }

    /// Converts from the external scale where 0 is the most urgent level.
    pub const fn from_external(level: u8) -> KResult<Self> {
        if (level as usize) < SCHED_PRIO_LEVELS {
            Ok(Priority(SCHED_PRIO_LEVELS as u8 - 1 - level))
        } else {
            Err(KernelError::InvalidPriority(level))
        }
    }

    /// Converts back to the external scale.
    pub const fn to_external(self) -> u8 {
        SCHED_PRIO_LEVELS as u8 - 1 - self.0
    }

    /// Raw internal level
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Level as an array index
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// True if a thread at `self` must preempt one running at `other`.
    pub const fn outranks(self, other: Priority) -> bool {
        self.0 > other.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// Creates a compile-time priority constant.
#[macro_export]
macro_rules! priority {
    ($value:literal) => {
        match $crate::Priority::new($value) {
            Ok(prio) => prio,
            Err(_) => panic!("priority out of range"),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_enforced() {
        assert!(Priority::new(0).is_ok());
        assert!(Priority::new(SCHED_PRIO_LEVELS as u8 - 1).is_ok());
        assert_eq!(
            Priority::new(SCHED_PRIO_LEVELS as u8),
            Err(KernelError::InvalidPriority(SCHED_PRIO_LEVELS as u8))
        );
    }

    #[test]
    fn external_scale_is_inverted() {
        assert_eq!(Priority::from_external(0), Ok(Priority::HIGHEST));
        assert_eq!(
            Priority::from_external(SCHED_PRIO_LEVELS as u8 - 1),
            Ok(Priority::LOWEST)
        );
        assert!(Priority::from_external(SCHED_PRIO_LEVELS as u8).is_err());

        for level in 0..SCHED_PRIO_LEVELS as u8 {
            let prio = Priority::from_external(level).unwrap();
            assert_eq!(prio.to_external(), level);
        }
    }

    #[test]
    fn outranks_is_strict() {
        let low = Priority::new(2).unwrap();
        let high = Priority::new(5).unwrap();
        assert!(high.outranks(low));
        assert!(!low.outranks(high));
        assert!(!low.outranks(low));
    }

    #[test]
    fn macro_builds_constants() {
        const P: Priority = priority!(3);
        assert_eq!(P.raw(), 3);
    }
}
