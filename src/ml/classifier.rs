//! 分類ステージの抽象化
//!
//! パイプラインは分類器の中身に依存しません。学習（`ClassifierTrainer`）と
//! 学習済みモデル（`FittedClassifier`）の2つのトレイトを満たせば
//! どのバックエンドでも差し込めます。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, Result};

/// ラベルをキーに変換済みの学習サンプル
#[derive(Debug, Clone, Copy)]
pub struct EncodedSample<'a> {
    pub key: u32,
    pub image_bytes: &'a [u8],
}

/// 分類器の種類（アーティファクトのメタデータに記録される）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// 色ヒストグラム + 最近傍重心
    Histogram,
    /// Burn による CNN
    Cnn,
}

impl Default for ClassifierKind {
    fn default() -> Self {
        if cfg!(feature = "ml") {
            ClassifierKind::Cnn
        } else {
            ClassifierKind::Histogram
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierKind::Histogram => write!(f, "histogram"),
            ClassifierKind::Cnn => write!(f, "cnn"),
        }
    }
}

/// 学習可能な分類器
pub trait ClassifierTrainer {
    fn kind(&self) -> ClassifierKind;

    /// `samples` のキーは `0..num_classes` の範囲に収まっている
    fn fit(
        &self,
        samples: &[EncodedSample<'_>],
        num_classes: usize,
    ) -> anyhow::Result<Box<dyn FittedClassifier>>;
}

/// 学習済み分類器
///
/// 推論は読み取り専用で、複数スレッドから同時に呼ばれることがあります。
pub trait FittedClassifier: Send + Sync {
    fn kind(&self) -> ClassifierKind;

    fn num_classes(&self) -> usize;

    /// モデル入力解像度（正方形の一辺）
    fn input_size(&self) -> u32;

    /// クラスごとのスコア（長さは `num_classes()`）
    fn predict_scores(&self, image_bytes: &[u8]) -> anyhow::Result<Vec<f32>>;

    /// `model.bin` に保存するバイト列
    fn to_bytes(&self) -> anyhow::Result<Vec<u8>>;
}

/// アーティファクトから学習済み分類器を復元する
pub fn restore_classifier(
    kind: ClassifierKind,
    bytes: &[u8],
    num_classes: usize,
    input_size: u32,
) -> Result<Box<dyn FittedClassifier>> {
    match kind {
        ClassifierKind::Histogram => {
            let classifier = crate::ml::histogram::HistogramClassifier::from_bytes(bytes)?;
            if classifier.num_classes() != num_classes {
                return Err(PredictorError::SchemaMismatch {
                    vocabulary: num_classes,
                    scores: classifier.num_classes(),
                });
            }
            Ok(Box::new(classifier))
        }
        #[cfg(feature = "ml")]
        ClassifierKind::Cnn => {
            let classifier = crate::ml::inference::CnnClassifier::from_bytes(bytes, num_classes, input_size)?;
            Ok(Box::new(classifier))
        }
        #[cfg(not(feature = "ml"))]
        ClassifierKind::Cnn => {
            let _ = (bytes, input_size);
            Err(PredictorError::UnsupportedClassifier(kind.to_string()))
        }
    }
}
