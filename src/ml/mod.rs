pub mod classifier;
pub mod histogram;
pub mod image_input;

#[cfg(feature = "ml")]
pub mod inference;
#[cfg(feature = "ml")]
pub mod ml_model;
#[cfg(feature = "ml")]
pub mod training;

pub use classifier::{restore_classifier, ClassifierKind, ClassifierTrainer, EncodedSample, FittedClassifier};
pub use histogram::{HistogramClassifier, HistogramTrainer};
#[cfg(feature = "ml")]
pub use inference::CnnClassifier;
#[cfg(feature = "ml")]
pub use ml_model::{ImageClassifier, ModelConfig};
#[cfg(feature = "ml")]
pub use training::CnnTrainer;
