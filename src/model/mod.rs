pub mod config;
pub mod model_metadata;
pub mod model_storage;
pub mod schema;

pub use config::{AppConfig, InferenceSettings, ModelSettings, TrainingSettings};
pub use model_metadata::ModelMetadata;
pub use model_storage::{load_metadata, load_model_with_metadata, save_model_with_metadata};
pub use schema::{ColumnKind, ModelSchema, SchemaColumn};
