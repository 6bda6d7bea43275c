//! The reconcile controller: iteration logic, loop driver and the state
//! they own.

pub mod backoff;
pub mod reconciler;
pub mod scheduler;
pub mod state;
pub mod trigger;

pub use backoff::Backoff;
pub use reconciler::{IterationReport, Phase, Reconciler, APPLY_MAX_RETRIES, APPLY_RETRY_BASE};
pub use scheduler::ReconcileLoop;
pub use state::ReconcileState;
pub use trigger::Trigger;
