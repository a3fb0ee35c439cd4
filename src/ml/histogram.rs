//! 色ヒストグラムによる軽量分類器
//!
//! 各画像をRGBの結合ヒストグラム（bins^3 次元、総和1）に変換し、
//! クラスごとの平均ヒストグラム（重心）との L1 距離でスコアを付けます。
//! スコアは `-距離 * temperature` のソフトマックスです。
//! GPUも学習ループも不要なので、`ml` フィーチャーなしでも使えます。

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::classifier::{ClassifierKind, ClassifierTrainer, EncodedSample, FittedClassifier};
use crate::ml::image_input::decode_rgb;

/// チャネルあたりビン数の上限（特徴量は最大 64^3 次元）
const MAX_BINS_PER_CHANNEL: usize = 64;

/// ヒストグラム分類器の学習設定
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramTrainer {
    /// チャネルあたりのビン数
    pub bins_per_channel: usize,
    /// デコード後の画像サイズ
    pub image_size: u32,
    /// ソフトマックスの鋭さ
    pub temperature: f32,
}

impl Default for HistogramTrainer {
    fn default() -> Self {
        Self {
            bins_per_channel: 8,
            image_size: 64,
            temperature: 8.0,
        }
    }
}

impl HistogramTrainer {
    pub fn new(bins_per_channel: usize, image_size: u32) -> Self {
        Self {
            bins_per_channel,
            image_size,
            ..Self::default()
        }
    }
}

impl ClassifierTrainer for HistogramTrainer {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Histogram
    }

    fn fit(&self, samples: &[EncodedSample<'_>], num_classes: usize) -> Result<Box<dyn FittedClassifier>> {
        ensure!(!samples.is_empty(), "No samples to fit the histogram classifier");
        check_params(self.bins_per_channel, self.image_size, self.temperature)?;

        let dims = self.bins_per_channel.pow(3);
        let mut sums = vec![vec![0.0f32; dims]; num_classes];
        let mut counts = vec![0usize; num_classes];

        for sample in samples {
            let class = sample.key as usize;
            ensure!(class < num_classes, "Label key {} out of range ({} classes)", class, num_classes);

            let features = color_histogram(sample.image_bytes, self.bins_per_channel, self.image_size)?;
            for (acc, value) in sums[class].iter_mut().zip(features) {
                *acc += value;
            }
            counts[class] += 1;
        }

        let mut centroids = Vec::with_capacity(num_classes);
        for (class, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
            ensure!(count > 0, "Class {} has no training samples", class);
            centroids.push(sum.into_iter().map(|v| v / count as f32).collect());
        }

        log::info!(
            "ヒストグラム分類器を学習しました: {} サンプル, {} クラス, {} 次元",
            samples.len(),
            num_classes,
            dims
        );

        Ok(Box::new(HistogramClassifier {
            bins_per_channel: self.bins_per_channel,
            image_size: self.image_size,
            temperature: self.temperature,
            centroids,
        }))
    }
}

/// 学習済みヒストグラム分類器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramClassifier {
    bins_per_channel: usize,
    image_size: u32,
    temperature: f32,
    centroids: Vec<Vec<f32>>,
}

impl HistogramClassifier {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let classifier: Self =
            serde_json::from_slice(bytes).context("Failed to deserialize histogram classifier")?;
        check_params(classifier.bins_per_channel, classifier.image_size, classifier.temperature)?;
        let dims = classifier.bins_per_channel.pow(3);
        ensure!(
            classifier.centroids.iter().all(|c| c.len() == dims),
            "Histogram centroids do not match {} bins per channel",
            classifier.bins_per_channel
        );
        Ok(classifier)
    }
}

impl FittedClassifier for HistogramClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Histogram
    }

    fn num_classes(&self) -> usize {
        self.centroids.len()
    }

    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn predict_scores(&self, image_bytes: &[u8]) -> Result<Vec<f32>> {
        let features = color_histogram(image_bytes, self.bins_per_channel, self.image_size)?;
        let logits: Vec<f32> = self
            .centroids
            .iter()
            .map(|centroid| {
                let distance: f32 = centroid.iter().zip(&features).map(|(c, f)| (c - f).abs()).sum();
                -distance * self.temperature
            })
            .collect();
        Ok(softmax(&logits))
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize histogram classifier")
    }
}

/// 学習時と復元時で共通のパラメータ検査
fn check_params(bins_per_channel: usize, image_size: u32, temperature: f32) -> Result<()> {
    ensure!(
        (1..=MAX_BINS_PER_CHANNEL).contains(&bins_per_channel),
        "bins_per_channel must be within 1..={} (got {})",
        MAX_BINS_PER_CHANNEL,
        bins_per_channel
    );
    ensure!(image_size > 0, "image_size must be positive");
    ensure!(
        temperature.is_finite() && temperature > 0.0,
        "temperature must be a positive finite number (got {})",
        temperature
    );
    Ok(())
}

/// RGB結合ヒストグラム（総和1に正規化）
fn color_histogram(image_bytes: &[u8], bins: usize, size: u32) -> Result<Vec<f32>> {
    let img = decode_rgb(image_bytes, size)?;
    let mut hist = vec![0.0f32; bins.pow(3)];

    let bin_of = |v: u8| (v as usize * bins) / 256;
    for pixel in img.pixels() {
        let [r, g, b] = pixel.0;
        hist[(bin_of(r) * bins + bin_of(g)) * bins + bin_of(b)] += 1.0;
    }

    let total = (img.width() * img.height()) as f32;
    if total > 0.0 {
        hist.iter_mut().for_each(|v| *v /= total);
    }
    Ok(hist)
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
