//! Unlock pricing.

/// Credits charged to reveal one CV.
pub const CREDITS_PER_UNLOCK: i64 = 1;

/// Credits required to unlock `count` CVs.
#[must_use]
pub fn unlock_cost(count: usize) -> i64 {
    i64::try_from(count)
        .unwrap_or(i64::MAX)
        .saturating_mul(CREDITS_PER_UNLOCK)
}
