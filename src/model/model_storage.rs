//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（分類器の種類、スキーマ、語彙など）
//! - model.bin       - 分類器のパラメータ（バイナリ）

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

use crate::error::{PredictorError, Result};
use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 一時ファイルに書き切ってから差し替えるため、途中で失敗しても
/// 既存のアーティファクトが壊れることはありません。
pub fn save_model_with_metadata(output_path: &Path, metadata: &ModelMetadata, model_binary: &[u8]) -> Result<()> {
    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PredictorError::io(parent, e))?;
    }

    let temp_path = temp_path_for(output_path);
    let result = write_archive(&temp_path, metadata, model_binary)
        .and_then(|()| fs::rename(&temp_path, output_path).map_err(|e| PredictorError::io(output_path, e)));

    if result.is_err() {
        fs::remove_file(&temp_path).ok();
    } else {
        log::info!("モデルを保存しました: {}", output_path.display());
    }
    result
}

fn write_archive(path: &Path, metadata: &ModelMetadata, model_binary: &[u8]) -> Result<()> {
    let io_err = |e: std::io::Error| PredictorError::io(path, e);

    let file = File::create(path).map_err(io_err)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json = metadata
        .to_json_string()
        .map_err(|e| PredictorError::invalid_artifact(path, format!("{e:#}")))?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json.as_bytes()).map_err(io_err)?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary).map_err(io_err)?;

    let mut encoder = tar_builder.into_inner().map_err(io_err)?;
    encoder.flush().map_err(io_err)?;
    encoder.finish().map_err(io_err)?.sync_all().map_err(io_err)?;
    Ok(())
}

fn append_entry<W: Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, bytes)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn open_archive(path: &Path) -> Result<Archive<GzDecoder<File>>> {
    if !path.is_file() {
        return Err(PredictorError::ModelArtifactNotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| PredictorError::io(path, e))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Tar.gzからモデルメタデータのみ読み込む
pub fn load_metadata(path: &Path) -> Result<ModelMetadata> {
    let (metadata, _) = read_entries(path, false)?;
    metadata.ok_or_else(|| PredictorError::invalid_artifact(path, "metadata.json not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    match read_entries(path, true)? {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(PredictorError::invalid_artifact(path, "metadata.json not found in tar.gz archive")),
        (_, None) => Err(PredictorError::invalid_artifact(path, "model.bin not found in tar.gz archive")),
    }
}

fn read_entries(path: &Path, with_binary: bool) -> Result<(Option<ModelMetadata>, Option<Vec<u8>>)> {
    let mut archive = open_archive(path)?;
    let invalid = |e: std::io::Error| PredictorError::invalid_artifact(path, e.to_string());

    let mut metadata = None;
    let mut binary = None;

    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        let name = entry.path().map_err(invalid)?.to_string_lossy().into_owned();

        match name.as_str() {
            METADATA_ENTRY => {
                let mut json = String::new();
                entry.read_to_string(&mut json).map_err(invalid)?;
                let parsed = ModelMetadata::from_json_string(&json)
                    .map_err(|e| PredictorError::invalid_artifact(path, format!("{e:#}")))?;
                metadata = Some(parsed);
                if !with_binary {
                    break;
                }
            }
            MODEL_ENTRY if with_binary => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer).map_err(invalid)?;
                binary = Some(buffer);
            }
            _ => {}
        }
    }

    Ok((metadata, binary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::ClassifierKind;
    use crate::model::schema::{ModelSchema, SchemaColumn};
    use crate::pipeline::LabelVocabulary;

    fn metadata() -> ModelMetadata {
        let schema = ModelSchema::new(vec![SchemaColumn::key(
            "Label",
            LabelVocabulary::from_labels(["pug", "beagle", "husky"]),
        )]);
        ModelMetadata::new(ClassifierKind::Histogram, 32, schema, 3)
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("breeds.tar.gz");

        save_model_with_metadata(&path, &metadata(), &[9, 8, 7]).unwrap();

        let (loaded, binary) = load_model_with_metadata(&path).unwrap();
        assert_eq!(loaded, metadata_with_time(&loaded));
        assert_eq!(binary, vec![9, 8, 7]);
        assert_eq!(
            loaded.schema.key_values("Label").unwrap().as_slice(),
            &["pug", "beagle", "husky"]
        );
        assert!(!temp_path_for(&path).exists());
    }

    fn metadata_with_time(loaded: &ModelMetadata) -> ModelMetadata {
        ModelMetadata {
            trained_at: loaded.trained_at.clone(),
            ..metadata()
        }
    }

    #[test]
    fn test_load_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breeds.tar.gz");
        save_model_with_metadata(&path, &metadata(), b"weights").unwrap();

        assert_eq!(load_metadata(&path).unwrap().model_input_size, 32);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model_with_metadata(&dir.path().join("nope.tar.gz")).unwrap_err();
        assert!(matches!(err, PredictorError::ModelArtifactNotFound(_)));
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.tar.gz");
        fs::write(&path, b"this is not gzip").unwrap();

        let err = load_model_with_metadata(&path).unwrap_err();
        assert!(matches!(err, PredictorError::InvalidArtifact { .. }));
    }

    #[test]
    fn test_overwrite_replaces_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breeds.tar.gz");
        save_model_with_metadata(&path, &metadata(), b"old").unwrap();
        save_model_with_metadata(&path, &metadata(), b"new").unwrap();

        let (_, binary) = load_model_with_metadata(&path).unwrap();
        assert_eq!(binary, b"new");
    }

    #[test]
    fn test_duplicate_vocabulary_is_invalid_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.tar.gz");
        let json = metadata()
            .to_json_string()
            .unwrap()
            .replace("\"beagle\"", "\"pug\"");

        let mut builder = Builder::new(GzEncoder::new(File::create(&path).unwrap(), Compression::default()));
        append_entry(&mut builder, METADATA_ENTRY, json.as_bytes()).unwrap();
        append_entry(&mut builder, MODEL_ENTRY, b"weights").unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = load_model_with_metadata(&path).unwrap_err();
        assert!(matches!(err, PredictorError::InvalidArtifact { .. }));
    }
}
