pub mod evaluator;

pub use evaluator::{evaluate, evaluate_all, Evaluation, UnmetRequirement};
