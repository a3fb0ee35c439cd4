//! スコアベクトルとラベルの対応付け
//!
//! スコアの `i` 番目は語彙の `i` 番目に対応します。長さが食い違う場合は
//! 切り詰めも補完もせずにエラーにします。

use serde::Serialize;

use crate::error::{PredictorError, Result};
use crate::model::ModelSchema;
use crate::pipeline::{LabelVocabulary, PredictionResult, LABEL_COLUMN};

/// ラベルとそのスコア
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedLabel {
    pub label: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct ScoreRanker {
    label_column: String,
}

impl Default for ScoreRanker {
    fn default() -> Self {
        Self::new(LABEL_COLUMN)
    }
}

impl ScoreRanker {
    pub fn new(label_column: impl Into<String>) -> Self {
        Self {
            label_column: label_column.into(),
        }
    }

    /// スキーマのラベル列から語彙を取り出す
    pub fn labels<'a>(&self, schema: &'a ModelSchema) -> Result<&'a LabelVocabulary> {
        schema.key_values(&self.label_column)
    }

    /// スコアの降順に並べたラベル一覧（全件）
    ///
    /// 同点は語彙の並び順を保ちます。
    pub fn rank(&self, result: &PredictionResult, vocabulary: &LabelVocabulary) -> Result<Vec<RankedLabel>> {
        let scores = &result.score_vector;
        if scores.len() != vocabulary.len() {
            return Err(PredictorError::SchemaMismatch {
                vocabulary: vocabulary.len(),
                scores: scores.len(),
            });
        }

        let mut ranked: Vec<RankedLabel> = vocabulary
            .iter()
            .zip(scores)
            .map(|(label, &score)| RankedLabel {
                label: label.to_string(),
                score,
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(ranked)
    }

    pub fn rank_with_schema(&self, result: &PredictionResult, schema: &ModelSchema) -> Result<Vec<RankedLabel>> {
        let vocabulary = self.labels(schema)?;
        self.rank(result, vocabulary)
    }
}
