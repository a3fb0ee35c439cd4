//! モデルメタデータの定義
//!
//! tar.gz内の `metadata.json` として保存され、推論時の語彙・分類器の種類・
//! 入力解像度はすべてここから復元されます。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::ClassifierKind;
use crate::model::schema::ModelSchema;
use crate::pipeline::builder::{LABEL_COLUMN, PREDICTED_LABEL_COLUMN};

/// 現在のアーティファクト形式のバージョン
pub const FORMAT_VERSION: u32 = 1;

fn default_label_column() -> String {
    LABEL_COLUMN.to_string()
}

fn default_predicted_label_column() -> String {
    PREDICTED_LABEL_COLUMN.to_string()
}

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: 分類器のパラメータ（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub format_version: u32,

    /// 分類器の種類（`model.bin` の解釈方法）
    pub classifier: ClassifierKind,

    /// モデル入力サイズ（正方形の一辺）
    pub model_input_size: u32,

    /// 学習済みパイプラインのスキーマ（ラベル列の語彙を含む）
    pub schema: ModelSchema,

    /// 語彙を持つラベル列の名前
    #[serde(default = "default_label_column")]
    pub label_column: String,

    /// デコード結果の列名
    #[serde(default = "default_predicted_label_column")]
    pub predicted_label_column: String,

    /// 学習に使ったサンプル数
    #[serde(default)]
    pub num_training_samples: usize,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成（学習時刻は現在時刻）
    pub fn new(
        classifier: ClassifierKind,
        model_input_size: u32,
        schema: ModelSchema,
        num_training_samples: usize,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            classifier,
            model_input_size,
            schema,
            label_column: default_label_column(),
            predicted_label_column: default_predicted_label_column(),
            num_training_samples,
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn with_columns(mut self, label_column: impl Into<String>, predicted_label_column: impl Into<String>) -> Self {
        self.label_column = label_column.into();
        self.predicted_label_column = predicted_label_column.into();
        self
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }

    /// メタデータの概要をログに出す
    pub fn log_summary(&self) {
        log::info!("=== モデルメタデータ ===");
        log::info!("分類器: {}", self.classifier);
        log::info!("モデル入力サイズ: {}x{}", self.model_input_size, self.model_input_size);
        log::info!("学習サンプル数: {}", self.num_training_samples);
        log::info!("ラベル列: {}", self.label_column);
        log::info!("学習日時: {}", self.trained_at);
        for column in self.schema.columns() {
            match &column.key_values {
                Some(labels) => log::info!(
                    "列 {}: {:?} [{}]",
                    column.name,
                    column.kind,
                    labels.as_slice().join(", ")
                ),
                None => log::info!("列 {}: {:?}", column.name, column.kind),
            }
        }
    }
}
