//! 学習済みCNNによる推論

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use burn::{
    backend::NdArray,
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::ml::classifier::{ClassifierKind, FittedClassifier};
use crate::ml::image_input::load_and_normalize_bytes;
use crate::ml::ml_model::{ImageClassifier, ModelConfig};

pub type InferBackend = NdArray;

/// 学習済みCNN
///
/// Burnのモジュールは `Sync` を保証しないため、順伝播は `Mutex` で直列化します。
pub struct CnnClassifier {
    model: Mutex<ImageClassifier<InferBackend>>,
    num_classes: usize,
    image_size: u32,
    device: <InferBackend as Backend>::Device,
}

impl CnnClassifier {
    pub fn new(
        model: ImageClassifier<InferBackend>,
        num_classes: usize,
        image_size: u32,
        device: <InferBackend as Backend>::Device,
    ) -> Self {
        Self {
            model: Mutex::new(model),
            num_classes,
            image_size,
            device,
        }
    }

    /// `to_bytes` で書き出した重みからモデルを復元
    pub fn from_bytes(bytes: &[u8], num_classes: usize, image_size: u32) -> Result<Self> {
        let device: <InferBackend as Backend>::Device = Default::default();

        let config = ModelConfig::new(num_classes)
            .with_dropout(0.0) // 推論時はドロップアウトなし
            .with_image_size(image_size as usize);
        config.validate()?;

        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(bytes.to_vec(), &device)
            .map_err(|e| anyhow!("モデル重みの読み込みエラー: {:?}", e))?;
        let model = config.init::<InferBackend>(&device).load_record(record);

        Ok(Self::new(model, num_classes, image_size, device))
    }
}

impl FittedClassifier for CnnClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Cnn
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn predict_scores(&self, image_bytes: &[u8]) -> Result<Vec<f32>> {
        let size = self.image_size as usize;
        let image_data = load_and_normalize_bytes(image_bytes, self.image_size)?;

        let tensor = Tensor::<InferBackend, 1>::from_floats(image_data.as_slice(), &self.device)
            .reshape([1, 3, size, size]);

        let output = {
            let model = self.model.lock().map_err(|_| anyhow!("CNN model lock poisoned"))?;
            model.forward(tensor)
        };

        softmax(output, 1)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("推論結果の取得エラー: {:?}", e))
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let model = self.model.lock().map_err(|_| anyhow!("CNN model lock poisoned"))?;
        BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(model.clone().into_record(), ())
            .map_err(|e| anyhow!("モデル重みの書き出しエラー: {:?}", e))
    }
}
