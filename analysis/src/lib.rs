pub mod evaluator;

pub use evaluator::{Evaluation, Evaluator, EvaluatorConfig, Polarity, Verdict};
