pub mod locks;
pub mod transition;

pub use locks::{IncidentGuard, IncidentLocks};
pub use transition::{TransitionEngine, TransitionOutcome, TransitionPayload};
