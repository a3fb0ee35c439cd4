//! 学習パイプラインの組み立て
//!
//! ラベルエンコード → 分類 → ラベルデコード の3段構成です。
//! データセットには依存しないため、同じパイプラインを何度でも学習に使えます。

use crate::ml::ClassifierTrainer;
use crate::pipeline::label_mapping::{KeyToValueMapping, ValueToKeyMapping};

pub const LABEL_COLUMN: &str = "Label";
pub const FEATURE_COLUMN: &str = "ImageSource";
pub const SCORE_COLUMN: &str = "Score";
pub const PREDICTED_LABEL_COLUMN: &str = "PredictedLabel";

/// 分類ステージ（未学習）
#[derive(Debug, Clone)]
pub struct ClassifyStage<T> {
    pub label_column: String,
    pub feature_column: String,
    pub score_column: String,
    pub predicted_label_column: String,
    pub trainer: T,
}

/// 未学習のパイプライン
#[derive(Debug, Clone)]
pub struct Pipeline<T> {
    pub encode: ValueToKeyMapping,
    pub classify: ClassifyStage<T>,
    pub decode: KeyToValueMapping,
}

impl<T: ClassifierTrainer> Pipeline<T> {
    /// ステージ名（実行順）
    pub fn stage_names(&self) -> [String; 3] {
        [
            format!("map_value_to_key({} -> {})", self.encode.input_column, self.encode.output_column),
            format!(
                "{}_classifier({}, {} -> {})",
                self.classify.trainer.kind(),
                self.classify.feature_column,
                self.classify.label_column,
                self.classify.score_column
            ),
            format!("map_key_to_value({} -> {})", self.decode.input_column, self.decode.output_column),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct PipelineBuilder<T> {
    trainer: T,
    label_column: String,
    feature_column: String,
    score_column: String,
    predicted_label_column: String,
}

impl<T: ClassifierTrainer> PipelineBuilder<T> {
    pub fn new(trainer: T) -> Self {
        Self {
            trainer,
            label_column: LABEL_COLUMN.to_string(),
            feature_column: FEATURE_COLUMN.to_string(),
            score_column: SCORE_COLUMN.to_string(),
            predicted_label_column: PREDICTED_LABEL_COLUMN.to_string(),
        }
    }

    pub fn label_column(mut self, name: impl Into<String>) -> Self {
        self.label_column = name.into();
        self
    }

    pub fn feature_column(mut self, name: impl Into<String>) -> Self {
        self.feature_column = name.into();
        self
    }

    pub fn score_column(mut self, name: impl Into<String>) -> Self {
        self.score_column = name.into();
        self
    }

    pub fn predicted_label_column(mut self, name: impl Into<String>) -> Self {
        self.predicted_label_column = name.into();
        self
    }

    pub fn build(self) -> Pipeline<T> {
        Pipeline {
            encode: ValueToKeyMapping::new(&self.label_column, &self.label_column),
            decode: KeyToValueMapping::new(&self.predicted_label_column, &self.predicted_label_column),
            classify: ClassifyStage {
                label_column: self.label_column,
                feature_column: self.feature_column,
                score_column: self.score_column,
                predicted_label_column: self.predicted_label_column,
                trainer: self.trainer,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::HistogramTrainer;

    #[test]
    fn test_default_stages_in_order() {
        let pipeline = PipelineBuilder::new(HistogramTrainer::default()).build();

        assert_eq!(
            pipeline.stage_names(),
            [
                "map_value_to_key(Label -> Label)".to_string(),
                "histogram_classifier(ImageSource, Label -> Score)".to_string(),
                "map_key_to_value(PredictedLabel -> PredictedLabel)".to_string(),
            ]
        );
    }

    #[test]
    fn test_custom_columns_flow_through_stages() {
        let pipeline = PipelineBuilder::new(HistogramTrainer::default())
            .label_column("Breed")
            .feature_column("Bytes")
            .build();

        assert_eq!(pipeline.encode.input_column, "Breed");
        assert_eq!(pipeline.classify.label_column, "Breed");
        assert_eq!(pipeline.classify.feature_column, "Bytes");
        assert_eq!(pipeline.decode.output_column, PREDICTED_LABEL_COLUMN);
    }
}
