pub mod folder_loader;

pub use folder_loader::{Dataset, DatasetLoader, LabeledSample, DEFAULT_IMAGE_EXTENSIONS};
