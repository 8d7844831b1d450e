pub mod action;
pub mod actor;
pub mod incident;
pub mod requirement;
pub mod revision;
pub mod workflow;

pub use action::*;
pub use actor::*;
pub use incident::*;
pub use requirement::*;
pub use revision::*;
pub use workflow::*;
