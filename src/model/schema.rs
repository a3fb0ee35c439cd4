//! 学習済みパイプラインのスキーマ
//!
//! ラベル列はキー列として語彙（キー値）を持ちます。推論時のラベル名は
//! 必ずここから取り出し、ディレクトリ名などから作り直しません。

use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, Result};
use crate::pipeline::LabelVocabulary;

/// 列の型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Bytes,
    /// `cardinality` 個のキーを取る列
    Key { cardinality: usize },
    /// 長さ固定の f32 ベクトル
    Vector { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_values: Option<LabelVocabulary>,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            key_values: None,
        }
    }

    /// 語彙付きのキー列
    pub fn key(name: impl Into<String>, vocabulary: LabelVocabulary) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Key {
                cardinality: vocabulary.len(),
            },
            key_values: Some(vocabulary),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelSchema {
    columns: Vec<SchemaColumn>,
}

impl ModelSchema {
    pub fn new(columns: Vec<SchemaColumn>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// キー列の語彙を取り出す
    ///
    /// 列がない、またはキー値を持たない場合は [`PredictorError::LabelColumnMissing`]。
    pub fn key_values(&self, column: &str) -> Result<&LabelVocabulary> {
        self.column(column)
            .and_then(|c| c.key_values.as_ref())
            .ok_or_else(|| PredictorError::LabelColumnMissing(column.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ModelSchema {
        ModelSchema::new(vec![
            SchemaColumn::key("Label", LabelVocabulary::from_labels(["beagle", "pug"])),
            SchemaColumn::new("ImageSource", ColumnKind::Bytes),
            SchemaColumn::new("Score", ColumnKind::Vector { len: 2 }),
        ])
    }

    #[test]
    fn test_key_values_of_label_column() {
        let schema = schema();
        let vocab = schema.key_values("Label").unwrap();
        assert_eq!(vocab.as_slice(), &["beagle", "pug"]);
        assert_eq!(schema.column("Label").unwrap().kind, ColumnKind::Key { cardinality: 2 });
    }

    #[test]
    fn test_missing_or_keyless_column() {
        let schema = schema();
        assert!(matches!(
            schema.key_values("Breed"),
            Err(PredictorError::LabelColumnMissing(name)) if name == "Breed"
        ));
        assert!(matches!(
            schema.key_values("ImageSource"),
            Err(PredictorError::LabelColumnMissing(_))
        ));
    }

    #[test]
    fn test_schema_json_round_trip() {
        let schema = schema();
        let json = serde_json::to_string(&schema).unwrap();
        let restored: ModelSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, restored);
    }
}
