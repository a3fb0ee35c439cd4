//! フォルダ構成の画像データから犬種分類器を学習し、推論するライブラリ
//!
//! - `dataset`: ラベル別ディレクトリからの学習データ読み込み
//! - `pipeline`: ラベルエンコード → 分類 → ラベルデコード の学習パイプライン
//! - `ml`: 分類器バックエンド（ヒストグラム / CNN）
//! - `model`: アーティファクトの保存形式と設定
//! - `inference`: プロセス共有の推論エンジンとスコアの並べ替え

pub mod dataset;
pub mod error;
pub mod inference;
pub mod ml;
pub mod model;
pub mod pipeline;

pub use dataset::{Dataset, DatasetLoader, LabeledSample};
pub use error::{PredictorError, Result};
pub use inference::{get_engine, InferenceEngine, LazyEngine, RankedLabel, ScoreRanker};
pub use ml::{ClassifierKind, ClassifierTrainer, FittedClassifier, HistogramTrainer};
pub use model::{AppConfig, ModelMetadata, ModelSchema};
pub use pipeline::{fit, train_and_save, LabelVocabulary, Pipeline, PipelineBuilder, PredictionResult, TrainedModel};
