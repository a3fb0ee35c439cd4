//! パイプラインの学習と学習済みモデル
//!
//! 学習は一度きりのバッチ処理です。途中再開や追加学習はなく、
//! 再学習するとアーティファクトは丸ごと置き換わります。

use std::path::Path;
use std::sync::Arc;

use crate::dataset::{Dataset, DatasetLoader};
use crate::error::{PredictorError, Result};
use crate::ml::{restore_classifier, ClassifierKind, ClassifierTrainer, EncodedSample, FittedClassifier};
use crate::model::{
    load_model_with_metadata, save_model_with_metadata, AppConfig, ColumnKind, ModelMetadata, ModelSchema,
    SchemaColumn,
};
use crate::pipeline::builder::{Pipeline, PipelineBuilder};
use crate::pipeline::label_mapping::{
    FittedKeyToValue, FittedValueToKey, KeyToValueMapping, LabelVocabulary, ValueToKeyMapping,
};

/// 1枚の画像に対する推論結果
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// 最大スコアのキー（語彙のインデックス）
    pub predicted_label_index: u32,
    /// キーをデコードしたラベル
    pub predicted_label: String,
    /// 語彙と同じ並びのスコア
    pub score_vector: Vec<f32>,
}

/// 学習済みパイプライン
pub struct TrainedModel {
    metadata: ModelMetadata,
    encoder: FittedValueToKey,
    classifier: Box<dyn FittedClassifier>,
    decoder: FittedKeyToValue,
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("classifier", &self.classifier.kind())
            .field("vocabulary", self.vocabulary())
            .finish()
    }
}

impl TrainedModel {
    /// メタデータ（スキーマ）と分類器から組み立てる
    ///
    /// 語彙は必ずスキーマのラベル列から取り出します。
    pub fn from_parts(metadata: ModelMetadata, classifier: Box<dyn FittedClassifier>) -> Result<Self> {
        let vocabulary = Arc::new(metadata.schema.key_values(&metadata.label_column)?.clone());
        if classifier.num_classes() != vocabulary.len() {
            return Err(PredictorError::SchemaMismatch {
                vocabulary: vocabulary.len(),
                scores: classifier.num_classes(),
            });
        }

        let encoder = ValueToKeyMapping::new(&metadata.label_column, &metadata.label_column)
            .bind(Arc::clone(&vocabulary));
        let decoder = KeyToValueMapping::new(&metadata.predicted_label_column, &metadata.predicted_label_column)
            .bind(vocabulary);

        Ok(Self {
            metadata,
            encoder,
            classifier,
            decoder,
        })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.metadata.schema
    }

    pub fn vocabulary(&self) -> &LabelVocabulary {
        self.decoder.vocabulary()
    }

    pub fn classifier_kind(&self) -> ClassifierKind {
        self.classifier.kind()
    }

    pub fn encode_label(&self, label: &str) -> Option<u32> {
        self.encoder.encode(label)
    }

    /// 1枚の画像を推論する
    ///
    /// 分類器のスコア数が語彙と一致しなければ [`PredictorError::SchemaMismatch`]。
    pub fn predict(&self, image_bytes: &[u8]) -> Result<PredictionResult> {
        let scores = self.classifier.predict_scores(image_bytes)?;
        let vocabulary = self.vocabulary();
        let mismatch = PredictorError::SchemaMismatch {
            vocabulary: vocabulary.len(),
            scores: scores.len(),
        };
        if scores.len() != vocabulary.len() {
            return Err(mismatch);
        }

        let index = argmax(&scores).ok_or(mismatch)? as u32;
        let predicted_label = self.decoder.decode(index)?.to_string();

        Ok(PredictionResult {
            predicted_label_index: index,
            predicted_label,
            score_vector: scores,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let model_binary = self.classifier.to_bytes()?;
        save_model_with_metadata(path, &self.metadata, &model_binary)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(path)?;
        let num_classes = metadata.schema.key_values(&metadata.label_column)?.len();
        let classifier =
            restore_classifier(metadata.classifier, &model_binary, num_classes, metadata.model_input_size)?;
        log::info!(
            "モデルを読み込みました: {} ({} クラス, {})",
            path.display(),
            num_classes,
            metadata.classifier
        );
        Self::from_parts(metadata, classifier)
    }
}

/// 最初に現れた最大値のインデックス
fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        match best {
            Some((_, best_score)) if score.total_cmp(&best_score).is_le() => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// パイプラインをデータセットで学習する
pub fn fit<T: ClassifierTrainer>(pipeline: &Pipeline<T>, dataset: &Dataset) -> Result<TrainedModel> {
    if dataset.is_empty() {
        return Err(PredictorError::EmptyDataset);
    }

    for (i, stage) in pipeline.stage_names().iter().enumerate() {
        log::debug!("stage {}: {}", i + 1, stage);
    }

    let encoder = pipeline.encode.fit(dataset);
    let vocabulary = Arc::clone(encoder.vocabulary());
    log::info!("語彙 ({}個): {}", vocabulary.len(), vocabulary.as_slice().join(", "));

    let encoded = dataset
        .iter()
        .map(|sample| {
            let key = encoder
                .encode(sample.label())
                .ok_or_else(|| PredictorError::UnknownLabel(sample.label().to_string()))?;
            Ok(EncodedSample {
                key,
                image_bytes: sample.image_bytes(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let classifier = pipeline.classify.trainer.fit(&encoded, vocabulary.len())?;
    if classifier.num_classes() != vocabulary.len() {
        return Err(PredictorError::SchemaMismatch {
            vocabulary: vocabulary.len(),
            scores: classifier.num_classes(),
        });
    }

    let decoder = pipeline.decode.bind(Arc::clone(&vocabulary));

    let stage = &pipeline.classify;
    let schema = ModelSchema::new(vec![
        SchemaColumn::key(&stage.label_column, (*vocabulary).clone()),
        SchemaColumn::new(&stage.feature_column, ColumnKind::Bytes),
        SchemaColumn::new(&stage.score_column, ColumnKind::Vector { len: vocabulary.len() }),
        SchemaColumn::new(&stage.predicted_label_column, ColumnKind::Text),
    ]);
    let metadata = ModelMetadata::new(classifier.kind(), classifier.input_size(), schema, dataset.len())
        .with_columns(&stage.label_column, &stage.predicted_label_column);

    Ok(TrainedModel {
        metadata,
        encoder,
        classifier,
        decoder,
    })
}

/// 設定に従って学習データを読み込み、学習し、アーティファクトを保存する
pub fn train_and_save(config: &AppConfig) -> Result<TrainedModel> {
    let dataset = DatasetLoader::new().load(&config.training.dataset_dir)?;
    for (label, count) in dataset.label_counts() {
        log::info!("  ラベル '{}': {} 枚", label, count);
    }

    let model = match config.classifier {
        ClassifierKind::Histogram => {
            fit(&PipelineBuilder::new(config.training.histogram_trainer()).build(), &dataset)?
        }
        #[cfg(feature = "ml")]
        ClassifierKind::Cnn => fit(&PipelineBuilder::new(config.training.cnn_trainer()).build(), &dataset)?,
        #[cfg(not(feature = "ml"))]
        ClassifierKind::Cnn => return Err(PredictorError::UnsupportedClassifier(config.classifier.to_string())),
    };

    model.save(&config.model.model_path)?;
    Ok(model)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// 画像の先頭バイトをキーとみなし、そのクラスに 0.9 を置く分類器
    pub struct FirstByteTrainer {
        pub extra_scores: usize,
    }

    pub struct FirstByteClassifier {
        num_classes: usize,
        extra_scores: usize,
    }

    impl ClassifierTrainer for FirstByteTrainer {
        fn kind(&self) -> ClassifierKind {
            ClassifierKind::Histogram
        }

        fn fit(&self, samples: &[EncodedSample<'_>], num_classes: usize) -> anyhow::Result<Box<dyn FittedClassifier>> {
            anyhow::ensure!(samples.iter().all(|s| (s.key as usize) < num_classes));
            Ok(Box::new(FirstByteClassifier {
                num_classes,
                extra_scores: self.extra_scores,
            }))
        }
    }

    impl FittedClassifier for FirstByteClassifier {
        fn kind(&self) -> ClassifierKind {
            ClassifierKind::Histogram
        }

        fn num_classes(&self) -> usize {
            self.num_classes
        }

        fn input_size(&self) -> u32 {
            1
        }

        fn predict_scores(&self, image_bytes: &[u8]) -> anyhow::Result<Vec<f32>> {
            let hot = *image_bytes.first().ok_or_else(|| anyhow::anyhow!("empty image"))? as usize;
            let len = self.num_classes + self.extra_scores;
            let rest = 0.1 / (len.max(2) - 1) as f32;
            Ok((0..len).map(|i| if i == hot { 0.9 } else { rest }).collect())
        }

        fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    pub fn dataset() -> Dataset {
        use crate::dataset::LabeledSample;
        Dataset::from_samples(vec![
            LabeledSample::new("beagle", vec![0]),
            LabeledSample::new("pug", vec![1]),
            LabeledSample::new("beagle", vec![0]),
            LabeledSample::new("husky", vec![2]),
        ])
    }
}
