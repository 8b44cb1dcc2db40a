//! Status transition history.

pub mod model;

/// Default number of events returned by a history query.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Upper bound on a history query; larger requests are clamped.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Clamp a requested history limit into `1..=MAX_HISTORY_LIMIT`.
pub fn clamp_history_limit(requested: Option<i64>) -> usize {
    match requested {
        None => DEFAULT_HISTORY_LIMIT,
        Some(n) if n < 1 => 1,
        Some(n) => (n as usize).min(MAX_HISTORY_LIMIT),
    }
}
