//! CNNの学習（Burn Learner）

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Result};
use tempfile::TempDir;
use burn::{
    backend::{Autodiff, NdArray},
    data::dataloader::{batcher::Batcher, DataLoaderBuilder},
    data::dataset::Dataset as BurnDataset,
    optim::AdamConfig,
    tensor::{backend::AutodiffBackend, backend::Backend, Int, Tensor},
    train::{
        metric::{AccuracyMetric, LossMetric},
        ClassificationOutput, LearnerBuilder, LearningStrategy, TrainOutput, TrainStep, ValidStep,
    },
};

use crate::ml::classifier::{ClassifierKind, ClassifierTrainer, EncodedSample, FittedClassifier};
use crate::ml::image_input::load_and_normalize_bytes;
use crate::ml::inference::{CnnClassifier, InferBackend};
use crate::ml::ml_model::{ImageClassifier, ModelConfig};

pub type TrainBackend = Autodiff<NdArray>;

/// CNN学習のハイパーパラメータ
#[derive(Debug, Clone, PartialEq)]
pub struct CnnTrainer {
    pub num_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
    /// 学習データの割合（残りを検証に使う）
    pub train_ratio: f32,
    pub image_size: u32,
    pub dropout: f64,
    /// Learnerの作業ディレクトリを作る親ディレクトリ
    ///
    /// 学習ごとにこの下へ一意な作業ディレクトリを作り、終了時に削除します。
    pub artifact_dir: PathBuf,
}

impl Default for CnnTrainer {
    fn default() -> Self {
        Self {
            num_epochs: 20,
            batch_size: 8,
            learning_rate: 1e-3,
            seed: 42,
            train_ratio: 0.8,
            image_size: 64,
            dropout: 0.5,
            artifact_dir: std::env::temp_dir(),
        }
    }
}

/// デコード・正規化済みのサンプル
#[derive(Clone, Debug)]
pub struct ImageItem {
    pub pixels: Arc<Vec<f32>>,
    pub label: usize,
}

/// メモリ上の学習データセット
pub struct InMemoryImageDataset {
    items: Vec<ImageItem>,
}

impl InMemoryImageDataset {
    pub fn new(items: Vec<ImageItem>) -> Self {
        Self { items }
    }

    /// 学習用と検証用に分割（シード固定でシャッフル）
    ///
    /// 検証側が空になる場合は学習データ全体で検証します。
    pub fn split(self, train_ratio: f32, seed: u64) -> (Self, Self) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut items = self.items;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        items.shuffle(&mut rng);

        let train_len = ((items.len() as f32 * train_ratio) as usize).clamp(1, items.len());
        let valid = items.split_off(train_len);

        let valid = if valid.is_empty() { items.clone() } else { valid };
        (Self::new(items), Self::new(valid))
    }
}

impl BurnDataset<ImageItem> for InMemoryImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// バッチャー
#[derive(Clone)]
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, _device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets = Vec::with_capacity(batch_size);

        for item in items {
            all_pixels.extend_from_slice(&item.pixels);
            targets.push(item.label as i64);
        }

        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), &self.device)
            .reshape([batch_size, 3, size, size]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device);

        ImageBatch { images, targets }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: AutodiffBackend> TrainStep<ImageBatch<B>, ClassificationOutput<B>> for ImageClassifier<B> {
    fn step(&self, batch: ImageBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

impl<B: Backend> ValidStep<ImageBatch<B>, ClassificationOutput<B>> for ImageClassifier<B> {
    fn step(&self, batch: ImageBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

impl CnnTrainer {
    /// 今回の学習専用の作業ディレクトリ（破棄時に削除される）
    fn run_dir(&self) -> Result<TempDir> {
        std::fs::create_dir_all(&self.artifact_dir)?;
        let dir = tempfile::Builder::new()
            .prefix("breed_predictor_training-")
            .tempdir_in(&self.artifact_dir)?;
        Ok(dir)
    }
}

impl ClassifierTrainer for CnnTrainer {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Cnn
    }

    fn fit(&self, samples: &[EncodedSample<'_>], num_classes: usize) -> Result<Box<dyn FittedClassifier>> {
        ensure!(!samples.is_empty(), "学習データが見つかりません");
        ensure!(self.batch_size > 0, "batch_size must be positive");

        let model_config = ModelConfig::new(num_classes)
            .with_dropout(self.dropout)
            .with_image_size(self.image_size as usize);
        model_config.validate()?;

        // 画像のデコード失敗は学習前にそのまま返す
        let items = samples
            .iter()
            .map(|sample| -> Result<ImageItem> {
                ensure!((sample.key as usize) < num_classes, "Label key {} out of range", sample.key);
                let pixels = load_and_normalize_bytes(sample.image_bytes, self.image_size)?;
                Ok(ImageItem {
                    pixels: Arc::new(pixels),
                    label: sample.key as usize,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (dataset_train, dataset_valid) =
            InMemoryImageDataset::new(items).split(self.train_ratio, self.seed);
        log::info!(
            "学習データ: {} 枚, 検証データ: {} 枚",
            dataset_train.len(),
            dataset_valid.len()
        );

        let device: <InferBackend as Backend>::Device = Default::default();
        let image_size = self.image_size as usize;

        let dataloader_train = DataLoaderBuilder::new(ImageBatcher::<TrainBackend>::new(device.clone(), image_size))
            .batch_size(self.batch_size)
            .shuffle(self.seed)
            .num_workers(0)
            .build(dataset_train);
        let dataloader_valid = DataLoaderBuilder::new(ImageBatcher::<InferBackend>::new(device.clone(), image_size))
            .batch_size(self.batch_size)
            .num_workers(0)
            .build(dataset_valid);

        let model = model_config.init::<TrainBackend>(&device);

        let run_dir = self.run_dir()?;
        let artifact_dir = run_dir.path().to_string_lossy().to_string();

        log::info!(
            "CNNの学習を開始します: {} クラス, 入力 {}x{}, エポック数 {}, バッチサイズ {}, 学習率 {}",
            num_classes,
            image_size,
            image_size,
            self.num_epochs,
            self.batch_size,
            self.learning_rate
        );

        let learner = LearnerBuilder::new(&artifact_dir)
            .metric_train_numeric(AccuracyMetric::new())
            .metric_valid_numeric(AccuracyMetric::new())
            .metric_train_numeric(LossMetric::new())
            .metric_valid_numeric(LossMetric::new())
            .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
            .num_epochs(self.num_epochs)
            .summary()
            .build(model, AdamConfig::new().init(), self.learning_rate);

        let trained = learner.fit(dataloader_train, dataloader_valid);
        let model = trained.model;
        log::info!("CNNの学習が完了しました（パラメータ数: {}）", burn::module::Module::num_params(&model));

        if let Err(e) = run_dir.close() {
            log::warn!("作業ディレクトリの削除に失敗しました: {}", e);
        }

        Ok(Box::new(CnnClassifier::new(model, num_classes, self.image_size, device)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<ImageItem> {
        (0..n)
            .map(|i| ImageItem {
                pixels: Arc::new(vec![i as f32]),
                label: i % 2,
            })
            .collect()
    }

    #[test]
    fn test_split_ratio() {
        let (train, valid) = InMemoryImageDataset::new(items(10)).split(0.8, 42);
        assert_eq!(train.len(), 8);
        assert_eq!(valid.len(), 2);
    }

    #[test]
    fn test_split_is_seeded() {
        let (a, _) = InMemoryImageDataset::new(items(10)).split(0.5, 7);
        let (b, _) = InMemoryImageDataset::new(items(10)).split(0.5, 7);
        let pixels = |d: &InMemoryImageDataset| d.items.iter().map(|i| i.pixels[0]).collect::<Vec<_>>();
        assert_eq!(pixels(&a), pixels(&b));
    }

    #[test]
    fn test_split_single_sample_validates_on_train() {
        let (train, valid) = InMemoryImageDataset::new(items(1)).split(0.8, 42);
        assert_eq!(train.len(), 1);
        assert_eq!(valid.len(), 1);
    }

    #[test]
    fn test_batcher_shapes() {
        let device: <InferBackend as Backend>::Device = Default::default();
        let batcher = ImageBatcher::<InferBackend>::new(device.clone(), 2);
        let item = |label| ImageItem {
            pixels: Arc::new(vec![0.0; 12]),
            label,
        };

        let batch = batcher.batch(vec![item(0), item(1), item(1)], &device);

        assert_eq!(batch.images.dims(), [3, 3, 2, 2]);
        assert_eq!(batch.targets.dims(), [3]);
    }

    #[test]
    fn test_each_run_gets_its_own_work_dir() {
        let base = tempfile::tempdir().unwrap();
        let trainer = CnnTrainer {
            artifact_dir: base.path().join("runs"),
            ..Default::default()
        };

        let first = trainer.run_dir().unwrap();
        let second = trainer.run_dir().unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(base.path().join("runs")));

        let first_path = first.path().to_path_buf();
        first.close().unwrap();
        assert!(!first_path.exists());
        assert!(second.path().is_dir());
    }
}
