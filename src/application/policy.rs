//! Record-level success policy for multi-channel dispatch.

/// Decides whether a queue record counts as delivered given its per-channel
/// outcomes. Injectable so the partial-success behavior stays a visible
/// policy choice instead of a hard-coded branch.
pub type SuccessPolicy = fn(succeeded: usize, attempted: usize) -> bool;

/// Default policy: one delivered channel is enough to complete the record.
pub fn any_succeeded(succeeded: usize, attempted: usize) -> bool {
    attempted > 0 && succeeded > 0
}

/// Stricter alternative: every attempted channel must have delivered.
pub fn all_succeeded(succeeded: usize, attempted: usize) -> bool {
    attempted > 0 && succeeded == attempted
}
