//! クレート全体のエラー型
//!
//! 学習・推論のどちらの経路でも、ここで定義したエラーはその場で回復せず
//! 呼び出し元へそのまま返します。分類器バックエンド内部の失敗は
//! `anyhow::Error` のまま `Classifier` に包んで伝播します。

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("No label subdirectories found in {}", .0.display())]
    NoLabelDirectories(PathBuf),

    #[error("Dataset is empty: no labeled samples to train on")]
    EmptyDataset,

    #[error("Model artifact not found: {}", .0.display())]
    ModelArtifactNotFound(PathBuf),

    #[error("Label column '{0}' not found in model schema")]
    LabelColumnMissing(String),

    #[error("Schema mismatch: vocabulary has {vocabulary} labels but score vector has {scores} entries")]
    SchemaMismatch { vocabulary: usize, scores: usize },

    #[error("Label '{0}' is not part of the trained vocabulary")]
    UnknownLabel(String),

    #[error("Label key {key} is out of range for a vocabulary of {vocabulary} labels")]
    UnknownLabelKey { key: u32, vocabulary: usize },

    #[error("Classifier '{0}' is not available in this build")]
    UnsupportedClassifier(String),

    #[error("Invalid model artifact {}: {reason}", path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    /// 分類器（学習・推論・画像デコード）からの失敗。内容は解釈しない
    #[error(transparent)]
    Classifier(#[from] anyhow::Error),
}

impl PredictorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PredictorError>;
