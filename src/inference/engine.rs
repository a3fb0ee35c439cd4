//! 推論エンジン
//!
//! 学習済みアーティファクトを読み込み、画像1枚ごとにスコアとラベルを返します。
//! プロセス全体で共有するエンジンは [`get_engine`] で初回アクセス時に一度だけ
//! 読み込まれ、以降は同じインスタンスを使い回します。解放APIはありません。

use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::error::{PredictorError, Result};
use crate::inference::ranking::{RankedLabel, ScoreRanker};
use crate::model::{AppConfig, ModelSchema};
use crate::pipeline::{LabelVocabulary, PredictionResult, TrainedModel};

/// 推論エンジン
#[derive(Debug)]
pub struct InferenceEngine {
    model: TrainedModel,
    ranker: ScoreRanker,
}

impl InferenceEngine {
    /// アーティファクトを読み込んで推論エンジンを初期化
    pub fn load(model_path: &Path) -> Result<Self> {
        let model = TrainedModel::load(model_path)?;
        model.metadata().log_summary();
        Self::from_model(model)
    }

    pub fn from_model(model: TrainedModel) -> Result<Self> {
        let ranker = ScoreRanker::new(&model.metadata().label_column);
        ranker.labels(model.schema())?;
        Ok(Self { model, ranker })
    }

    /// 単一画像を分類
    pub fn predict(&self, image_bytes: &[u8]) -> Result<PredictionResult> {
        self.model.predict(image_bytes)
    }

    /// 全ラベルをスコアの降順で返す
    pub fn predict_all_labels(&self, image_bytes: &[u8]) -> Result<Vec<RankedLabel>> {
        let result = self.predict(image_bytes)?;
        self.ranker.rank_with_schema(&result, self.model.schema())
    }

    /// 画像ファイルを読み込んで分類
    pub fn predict_file(&self, image_path: &Path) -> Result<Vec<RankedLabel>> {
        let image_bytes = fs::read(image_path).map_err(|e| PredictorError::io(image_path, e))?;
        log::debug!("画像を読み込みました: {} ({} bytes)", image_path.display(), image_bytes.len());
        self.predict_all_labels(&image_bytes)
    }

    pub fn vocabulary(&self) -> &LabelVocabulary {
        self.model.vocabulary()
    }

    pub fn schema(&self) -> &ModelSchema {
        self.model.schema()
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }
}

pub type EngineFactory = fn() -> Result<InferenceEngine>;

/// 初回アクセス時に `factory` でエンジンを作る遅延ホルダー
///
/// 初期化は `init_guard` の下で行われ、同時に初回アクセスがあっても
/// 読み込みは一度だけです。初期化に失敗した場合は結果を保持せず、
/// 次の呼び出しで再度読み込みます。
pub struct LazyEngine<F = EngineFactory> {
    engine: OnceLock<InferenceEngine>,
    init_guard: Mutex<()>,
    factory: F,
}

impl<F> LazyEngine<F>
where
    F: Fn() -> Result<InferenceEngine>,
{
    pub const fn new(factory: F) -> Self {
        Self {
            engine: OnceLock::new(),
            init_guard: Mutex::new(()),
            factory,
        }
    }

    pub fn get(&self) -> Result<&InferenceEngine> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }

        // ファクトリがパニックしてもガード自体は再利用できる
        let _guard = self.init_guard.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = self.engine.get() {
            return Ok(engine);
        }

        let engine = (self.factory)()?;
        log::info!("推論エンジンを初期化しました ({} ラベル)", engine.vocabulary().len());
        Ok(self.engine.get_or_init(|| engine))
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.get().is_some()
    }
}

fn load_configured_engine() -> Result<InferenceEngine> {
    let config = AppConfig::load_or_default();
    InferenceEngine::load(&config.model.model_path)
}

static GLOBAL_ENGINE: LazyEngine = LazyEngine::new(load_configured_engine as EngineFactory);

/// プロセス全体で共有する推論エンジン
///
/// 設定ファイルの `model.model_path` から初回のみ読み込みます。
pub fn get_engine() -> Result<&'static InferenceEngine> {
    GLOBAL_ENGINE.get()
}
