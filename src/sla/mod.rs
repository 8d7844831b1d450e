pub mod monitor;
pub mod tracker;

pub use monitor::{SlaMonitor, SlaReport};
pub use tracker::{status, SlaState, SlaStatus, DEFAULT_AT_RISK_RATIO};
