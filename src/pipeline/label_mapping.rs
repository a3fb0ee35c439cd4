//! ラベル文字列とキー（整数インデックス）の相互変換
//!
//! エンコード側で学習した語彙を `Arc` で共有し、デコード側は同じ語彙を
//! そのまま参照します。語彙の並びがスコアベクトルの並びを決めるため、
//! 推論時に語彙を作り直してはいけません。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{PredictorError, Result};

/// 重複なし・順序付きのラベル一覧
///
/// インデックス `i` はスコアベクトルの `i` 番目と対応します。
///
/// 読み込み時に重複したラベルがあれば拒否します。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelVocabulary {
    labels: Vec<String>,
}

impl TryFrom<Vec<String>> for LabelVocabulary {
    type Error = String;

    fn try_from(labels: Vec<String>) -> std::result::Result<Self, Self::Error> {
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(format!("duplicate label '{label}' in vocabulary"));
            }
        }
        Ok(Self { labels })
    }
}

impl From<LabelVocabulary> for Vec<String> {
    fn from(vocabulary: LabelVocabulary) -> Self {
        vocabulary.labels
    }
}

impl LabelVocabulary {
    /// 初出順で重複を除いて語彙を作る
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for label in labels {
            let label = label.into();
            if !unique.contains(&label) {
                unique.push(label);
            }
        }
        Self { labels: unique }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn key_of(&self, label: &str) -> Option<u32> {
        self.labels.iter().position(|l| l == label).map(|i| i as u32)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

/// 値 → キー 変換ステージ（未学習）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueToKeyMapping {
    pub input_column: String,
    pub output_column: String,
}

impl ValueToKeyMapping {
    pub fn new(input_column: impl Into<String>, output_column: impl Into<String>) -> Self {
        Self {
            input_column: input_column.into(),
            output_column: output_column.into(),
        }
    }

    /// 保存済みの語彙から学習済みステージを復元する
    pub fn bind(&self, vocabulary: Arc<LabelVocabulary>) -> FittedValueToKey {
        FittedValueToKey {
            mapping: self.clone(),
            vocabulary,
        }
    }

    /// 学習データに現れたラベルから語彙を学習する
    pub fn fit(&self, dataset: &Dataset) -> FittedValueToKey {
        let vocabulary = LabelVocabulary::from_labels(dataset.iter().map(|s| s.label()));
        self.bind(Arc::new(vocabulary))
    }
}

/// 学習済みの値 → キー 変換
#[derive(Debug, Clone)]
pub struct FittedValueToKey {
    mapping: ValueToKeyMapping,
    vocabulary: Arc<LabelVocabulary>,
}

impl FittedValueToKey {
    pub fn mapping(&self) -> &ValueToKeyMapping {
        &self.mapping
    }

    pub fn vocabulary(&self) -> &Arc<LabelVocabulary> {
        &self.vocabulary
    }

    /// 語彙にないラベルは `None`
    pub fn encode(&self, label: &str) -> Option<u32> {
        self.vocabulary.key_of(label)
    }
}

/// キー → 値 変換ステージ（未学習）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyToValueMapping {
    pub input_column: String,
    pub output_column: String,
}

impl KeyToValueMapping {
    pub fn new(input_column: impl Into<String>, output_column: impl Into<String>) -> Self {
        Self {
            input_column: input_column.into(),
            output_column: output_column.into(),
        }
    }

    /// エンコード側と同じ語彙に結び付ける
    pub fn bind(&self, vocabulary: Arc<LabelVocabulary>) -> FittedKeyToValue {
        FittedKeyToValue {
            mapping: self.clone(),
            vocabulary,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FittedKeyToValue {
    mapping: KeyToValueMapping,
    vocabulary: Arc<LabelVocabulary>,
}

impl FittedKeyToValue {
    pub fn mapping(&self) -> &KeyToValueMapping {
        &self.mapping
    }

    pub fn vocabulary(&self) -> &Arc<LabelVocabulary> {
        &self.vocabulary
    }

    pub fn decode(&self, key: u32) -> Result<&str> {
        self.vocabulary
            .get(key as usize)
            .ok_or(PredictorError::UnknownLabelKey {
                key,
                vocabulary: self.vocabulary.len(),
            })
    }
}
