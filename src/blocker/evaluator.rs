use serde::Serialize;

/// Outcome of comparing usage with a limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluation {
    /// No limit configured (absent or zero)
    NoLimit,
    /// Usage is below the limit
    Under,
    /// Usage met or exceeded the limit
    Breached,
}

/// Stateless limit check.
///
/// Counting breaches is not done here; the dispatcher counts once per
/// enforcement session.
pub struct LimitEvaluator;

impl LimitEvaluator {
    pub fn evaluate(_package: &str, usage_minutes: u64, limit_minutes: Option<u32>) -> Evaluation {
        match limit_minutes {
            None | Some(0) => Evaluation::NoLimit,
            Some(limit) if usage_minutes >= u64::from(limit) => Evaluation::Breached,
            Some(_) => Evaluation::Under,
        }
    }

    /// Minutes left before the limit is reached, `None` when unlimited
    pub fn remaining_minutes(usage_minutes: u64, limit_minutes: Option<u32>) -> Option<u64> {
        match limit_minutes {
            None | Some(0) => None,
            Some(limit) => Some(u64::from(limit).saturating_sub(usage_minutes)),
        }
    }
}
