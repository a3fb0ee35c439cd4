pub mod builder;
pub mod label_mapping;
pub mod trainer;

pub use builder::{
    ClassifyStage, Pipeline, PipelineBuilder, FEATURE_COLUMN, LABEL_COLUMN, PREDICTED_LABEL_COLUMN, SCORE_COLUMN,
};
pub use label_mapping::{FittedKeyToValue, FittedValueToKey, KeyToValueMapping, LabelVocabulary, ValueToKeyMapping};
pub use trainer::{fit, train_and_save, PredictionResult, TrainedModel};
