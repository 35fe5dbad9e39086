/// Planner failures.
///
/// Both are recoverable: callers fall back to a direct two-point path so the
/// follower stays armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("start or goal lies outside the world grid")]
    OutOfBounds,
    #[error("no traversable route between start and goal")]
    NoPath,
}
