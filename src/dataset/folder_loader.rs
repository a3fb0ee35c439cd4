//! フォルダ構成からの学習データ読み込み
//!
//! ルートディレクトリ直下のサブディレクトリ名をラベルとして扱い、
//! その中の画像ファイルをすべてメモリに読み込みます。
//!
//! ```text
//! root/
//!   beagle/  001.jpg 002.png ...
//!   pug/     a.jpeg ...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PredictorError, Result};

/// 学習対象とする拡張子（小文字、ドットなし）
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// ラベル付きサンプル（1ファイル = 1サンプル）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSample {
    label: String,
    image_bytes: Vec<u8>,
}

impl LabeledSample {
    pub fn new(label: impl Into<String>, image_bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            image_bytes,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.image_bytes
    }
}

/// 読み込み順を保持したサンプル集合
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    samples: Vec<LabeledSample>,
}

impl Dataset {
    pub fn from_samples(samples: Vec<LabeledSample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabeledSample> {
        self.samples.iter()
    }

    /// 出現順で重複を除いたラベル一覧
    pub fn distinct_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for sample in &self.samples {
            if !labels.contains(&sample.label()) {
                labels.push(sample.label());
            }
        }
        labels
    }

    /// ラベルごとのサンプル数（出現順）
    pub fn label_counts(&self) -> Vec<(&str, usize)> {
        self.distinct_labels()
            .into_iter()
            .map(|label| {
                let count = self.samples.iter().filter(|s| s.label() == label).count();
                (label, count)
            })
            .collect()
    }
}

/// ディレクトリツリーから [`Dataset`] を組み立てるローダー
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    extensions: Vec<String>,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 許可する拡張子を差し替える（大文字小文字は区別しない）
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn is_allowed(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| *allowed == ext))
    }

    /// ルート直下のサブディレクトリをラベルとして全画像を読み込む
    ///
    /// サブディレクトリが1つもなければ [`PredictorError::NoLabelDirectories`]。
    /// 画像が1枚もないラベルはエラーにせず、結果に現れないだけです。
    /// 孫ディレクトリは走査しません。
    pub fn load(&self, root: &Path) -> Result<Dataset> {
        let label_dirs = sorted_entries(root)?
            .into_iter()
            .filter(|path| path.is_dir())
            .collect::<Vec<_>>();

        if label_dirs.is_empty() {
            return Err(PredictorError::NoLabelDirectories(root.to_path_buf()));
        }

        let mut samples = Vec::new();
        for dir in &label_dirs {
            let label = dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| PredictorError::Config(format!("Invalid label directory: {}", dir.display())))?;

            let images = sorted_entries(dir)?
                .into_iter()
                .filter(|path| path.is_file() && self.is_allowed(path))
                .collect::<Vec<_>>();

            if images.is_empty() {
                log::debug!("ラベル '{}' には画像がないためスキップします", label);
                continue;
            }

            log::debug!("  ラベル '{}': {} 枚", label, images.len());
            for path in images {
                let bytes = fs::read(&path).map_err(|e| PredictorError::io(&path, e))?;
                samples.push(LabeledSample::new(label.clone(), bytes));
            }
        }

        let dataset = Dataset::from_samples(samples);
        log::info!(
            "{} から {} 枚の画像を読み込みました（ラベル {} 個）",
            root.display(),
            dataset.len(),
            dataset.distinct_labels().len()
        );
        Ok(dataset)
    }
}

/// ディレクトリ内のエントリを名前順で返す（読み込み順を環境に依存させない）
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PredictorError::io(dir, e))? {
        let entry = entry.map_err(|e| PredictorError::io(dir, e))?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn write(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_load_counts_allowed_files_per_label() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("beagle/1.jpg"), b"b1");
        write(&root.path().join("beagle/2.PNG"), b"b2");
        write(&root.path().join("beagle/notes.txt"), b"ignored");
        write(&root.path().join("pug/a.jpeg"), b"p1");
        write(&root.path().join("pug/b.Gif"), b"p2");
        write(&root.path().join("pug/nested/c.jpg"), b"too deep");
        write(&root.path().join("husky/readme.md"), b"no images");
        write(&root.path().join("stray.jpg"), b"not in a label dir");

        let dataset = DatasetLoader::new().load(root.path()).unwrap();

        assert_eq!(dataset.len(), 4);
        let labels: BTreeSet<&str> = dataset.distinct_labels().into_iter().collect();
        assert_eq!(labels, BTreeSet::from(["beagle", "pug"]));
        assert!(dataset.iter().all(|s| s.image_bytes() != b"too deep"));
    }

    #[test]
    fn test_load_reads_bytes_eagerly() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("pug/a.png"), &[1, 2, 3, 4]);

        let dataset = DatasetLoader::new().load(root.path()).unwrap();

        assert_eq!(dataset.samples()[0].label(), "pug");
        assert_eq!(dataset.samples()[0].image_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_no_subdirectories_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("lonely.png"), b"x");

        let err = DatasetLoader::new().load(root.path()).unwrap_err();
        assert!(matches!(err, PredictorError::NoLabelDirectories(_)));
    }

    #[test]
    fn test_label_dirs_without_images_yield_empty_dataset() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("empty")).unwrap();

        let dataset = DatasetLoader::new().load(root.path()).unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let root = tempfile::tempdir().unwrap();
        let err = DatasetLoader::new()
            .load(&root.path().join("does-not-exist"))
            .unwrap_err();
        assert!(matches!(err, PredictorError::Io { .. }));
    }

    #[test]
    fn test_custom_extensions() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("pug/a.png"), b"x");
        write(&root.path().join("pug/b.bmp"), b"y");

        let dataset = DatasetLoader::new()
            .with_extensions([".BMP"])
            .load(root.path())
            .unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.samples()[0].image_bytes(), b"y");
    }

    #[test]
    fn test_label_counts_follow_load_order() {
        let dataset = Dataset::from_samples(vec![
            LabeledSample::new("pug", vec![1]),
            LabeledSample::new("beagle", vec![2]),
            LabeledSample::new("pug", vec![3]),
        ]);

        assert_eq!(dataset.label_counts(), vec![("pug", 2), ("beagle", 1)]);
    }
}
