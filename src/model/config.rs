//! アプリケーション設定管理モジュール
//!
//! 分類器の種類・モデルの保存先・学習設定などをJSON形式で保存・読み込みします。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, Result};
use crate::ml::{ClassifierKind, HistogramTrainer};

/// 設定ファイルのパスを上書きする環境変数
pub const CONFIG_PATH_ENV: &str = "BREED_PREDICTOR_CONFIG";

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// 学習済みアーティファクト（tar.gz）のパス
    pub model_path: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/breed_classifier.tar.gz"),
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// 学習データのルート（直下のサブディレクトリ名がラベル）
    pub dataset_dir: PathBuf,
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ランダムシード
    pub seed: u64,
    /// トレーニングデータの割合
    pub train_ratio: f32,
    /// モデル入力サイズ（正方形）
    pub image_size: u32,
    /// ドロップアウト率
    pub dropout: f64,
    /// ヒストグラム分類器のチャネルあたりビン数
    pub histogram_bins: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("data/train"),
            num_epochs: 20,
            batch_size: 8,
            learning_rate: 1e-3,
            seed: 42,
            train_ratio: 0.8,
            image_size: 64,
            dropout: 0.5,
            histogram_bins: 8,
        }
    }
}

impl TrainingSettings {
    pub fn histogram_trainer(&self) -> HistogramTrainer {
        HistogramTrainer::new(self.histogram_bins, self.image_size)
    }

    #[cfg(feature = "ml")]
    pub fn cnn_trainer(&self) -> crate::ml::CnnTrainer {
        crate::ml::CnnTrainer {
            num_epochs: self.num_epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            seed: self.seed,
            train_ratio: self.train_ratio,
            image_size: self.image_size,
            dropout: self.dropout,
            ..Default::default()
        }
    }
}

/// 推論設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// 表示する上位件数
    pub top_k: usize,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 分類器の種類
    pub classifier: ClassifierKind,
    /// モデル設定
    pub model: ModelSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
    /// 推論設定
    pub inference: InferenceSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス（環境変数で上書き可能）
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.json"))
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PredictorError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| PredictorError::Config(format!("{}: {}", path.display(), e)))
    }

    /// デフォルトパスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            log::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                log::info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("設定ファイルの読み込みに失敗しました ({}): {}", path.display(), e);
                log::warn!("デフォルト設定を使用します");
                Self::default()
            }
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(self).map_err(|e| PredictorError::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| PredictorError::io(path, e))
    }

    /// 設定情報をログに出す
    pub fn log_summary(&self) {
        log::info!("=== アプリケーション設定 ===");
        log::info!("分類器: {}", self.classifier);
        log::info!("モデルパス: {}", self.model.model_path.display());
        log::info!("学習データ: {}", self.training.dataset_dir.display());
        log::info!(
            "エポック数: {}, バッチサイズ: {}, 学習率: {}, シード: {}",
            self.training.num_epochs,
            self.training.batch_size,
            self.training.learning_rate,
            self.training.seed
        );
        log::info!("入力サイズ: {}x{}", self.training.image_size, self.training.image_size);
        log::info!("表示件数: {}", self.inference.top_k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.inference.top_k, 5);
        assert_eq!(config.training.num_epochs, 20);
        assert_eq!(config.model.model_path, PathBuf::from("models/breed_classifier.tar.gz"));
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = AppConfig::default();
        config.classifier = ClassifierKind::Histogram;
        config.inference.top_k = 3;

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.classifier, ClassifierKind::Histogram);
        assert_eq!(deserialized.inference.top_k, 3);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"classifier":"histogram","training":{"num_epochs":2}}"#).unwrap();

        assert_eq!(config.classifier, ClassifierKind::Histogram);
        assert_eq!(config.training.num_epochs, 2);
        assert_eq!(config.training.batch_size, 8);
        assert_eq!(config.inference.top_k, 5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.training.dataset_dir = PathBuf::from("/data/dogs");
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.training.dataset_dir, PathBuf::from("/data/dogs"));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(PredictorError::Config(_))));
    }
}
