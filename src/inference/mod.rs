pub mod engine;
pub mod ranking;

pub use engine::{get_engine, EngineFactory, InferenceEngine, LazyEngine};
pub use ranking::{RankedLabel, ScoreRanker};
