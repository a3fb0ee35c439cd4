//! 画像分類用CNNモデルの定義
//!
//! 任意のクラス数に対応した小さな畳み込みネットワークです。
//! 入力は (C, H, W) = (3, image_size, image_size) の正規化済み画像です。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};

/// 必要な最小入力サイズ
pub const MIN_IMAGE_SIZE: usize = 14;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// ドロップアウト率
    #[config(default = 0.5)]
    pub dropout: f64,
    /// 入力画像サイズ（正方形）
    #[config(default = 64)]
    pub image_size: usize,
}

impl ModelConfig {
    /// 畳み込み3層を通した後の特徴マップの一辺
    ///
    /// - Conv (3x3, no padding): size -> size - 2
    /// - Pool (2x2): size -> size / 2（切り捨て）
    pub fn feature_map_size(&self) -> usize {
        let after_pool1 = self.image_size.saturating_sub(2) / 2;
        let after_pool2 = after_pool1.saturating_sub(2) / 2;
        after_pool2.saturating_sub(2)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.num_classes > 0, "num_classes must be positive");
        anyhow::ensure!(
            self.image_size >= MIN_IMAGE_SIZE && self.feature_map_size() > 0,
            "入力サイズが小さすぎます: {} (最小{}x{}が必要)",
            self.image_size,
            MIN_IMAGE_SIZE,
            MIN_IMAGE_SIZE
        );
        Ok(())
    }

    /// モデルを初期化
    ///
    /// 事前に [`ModelConfig::validate`] を通しておくこと。
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageClassifier<B> {
        let feature_map_size = self.feature_map_size();

        // 特徴次元 d = 128チャネル * feature_map_size * feature_map_size
        let d = 128 * feature_map_size * feature_map_size;
        let d_half = (d / 2).max(self.num_classes);

        log::debug!(
            "[Model] 入力 {}x{} -> 特徴 128 x {}x{} (d = {}) -> {} -> {}",
            self.image_size,
            self.image_size,
            feature_map_size,
            feature_map_size,
            d,
            d_half,
            self.num_classes
        );

        ImageClassifier {
            conv1: Conv2dConfig::new([3, 32], [3, 3]).with_stride([1, 1]).init(device),
            pool1: MaxPool2dConfig::new([2, 2]).init(),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).with_stride([1, 1]).init(device),
            pool2: MaxPool2dConfig::new([2, 2]).init(),
            conv3: Conv2dConfig::new([64, 128], [3, 3]).with_stride([1, 1]).init(device),
            fc1: LinearConfig::new(d, d_half).init(device),
            fc2: LinearConfig::new(d_half, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }
}

/// 画像分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 + ReLU + MaxPool 2x2} x 2層
/// - Conv 3x3 + ReLU
/// - Flatten
/// - FC: d -> d/2 + ReLU + Dropout
/// - FC: d/2 -> num_classes
#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    conv1: Conv2d<B>,  // 3 -> 32
    pool1: MaxPool2d,
    conv2: Conv2d<B>,  // 32 -> 64
    pool2: MaxPool2d,
    conv3: Conv2d<B>,  // 64 -> 128

    fc1: Linear<B>,
    fc2: Linear<B>,

    dropout: Dropout,
    activation: Relu,
}

impl<B: Backend> ImageClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc2.forward(x)
    }

    /// 順伝播と損失計算（学習用）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}
