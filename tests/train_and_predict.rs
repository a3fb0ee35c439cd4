use std::fs;
use std::io::Cursor;
use std::path::Path;

use breed_predictor_lib::{
    fit, AppConfig, ClassifierKind, DatasetLoader, HistogramTrainer, InferenceEngine, PipelineBuilder, PredictorError,
    ScoreRanker,
};

fn write_png(path: &Path, rgb: [u8; 3]) {
    let img = image::RgbImage::from_pixel(16, 16, image::Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    fs::write(path, buf.into_inner()).unwrap();
}

fn build_dataset(root: &Path) {
    let breeds = [("beagle", [200, 120, 40]), ("husky", [220, 220, 230]), ("pug", [30, 30, 30])];
    for (breed, rgb) in breeds {
        let dir = root.join(breed);
        fs::create_dir_all(&dir).unwrap();
        write_png(&dir.join("a.png"), rgb);
        write_png(&dir.join("b.png"), [rgb[0] / 2 + 10, rgb[1] / 2 + 10, rgb[2] / 2 + 10]);
        fs::write(dir.join("notes.txt"), "not an image").unwrap();
    }
    fs::create_dir_all(root.join("empty")).unwrap();
}

#[test]
fn trained_artifact_round_trips_through_engine() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("train");
    build_dataset(&data);

    let dataset = DatasetLoader::new().load(&data).unwrap();
    assert_eq!(dataset.len(), 6);
    assert_eq!(dataset.distinct_labels(), ["beagle", "husky", "pug"]);

    let pipeline = PipelineBuilder::new(HistogramTrainer::new(4, 16)).build();
    let model = fit(&pipeline, &dataset).unwrap();
    let artifact = dir.path().join("models").join("breeds.tar.gz");
    model.save(&artifact).unwrap();

    let engine = InferenceEngine::load(&artifact).unwrap();
    assert_eq!(engine.vocabulary().as_slice(), &["beagle", "husky", "pug"]);

    let query = dir.path().join("query.png");
    write_png(&query, [25, 25, 25]);
    let bytes = fs::read(&query).unwrap();

    let result = engine.predict(&bytes).unwrap();
    assert_eq!(result.score_vector.len(), engine.vocabulary().len());
    assert_eq!(result.predicted_label, "pug");

    let ranked = ScoreRanker::default().rank(&result, engine.vocabulary()).unwrap();
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].label, "pug");
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));

    assert_eq!(engine.predict_file(&query).unwrap(), ranked);
}

#[test]
fn train_and_save_uses_configured_paths() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("train");
    build_dataset(&data);

    let mut config = AppConfig::default();
    config.classifier = ClassifierKind::Histogram;
    config.training.dataset_dir = data;
    config.training.image_size = 16;
    config.model.model_path = dir.path().join("model.tar.gz");

    breed_predictor_lib::train_and_save(&config).unwrap();
    assert!(config.model.model_path.is_file());

    let metadata = breed_predictor_lib::model::load_metadata(&config.model.model_path).unwrap();
    assert_eq!(metadata.classifier, ClassifierKind::Histogram);
    assert_eq!(metadata.num_training_samples, 6);
}

#[test]
fn root_without_label_directories_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("stray.png"), b"").unwrap();

    let err = DatasetLoader::new().load(dir.path()).unwrap_err();
    assert!(matches!(err, PredictorError::NoLabelDirectories(_)));
}

#[test]
fn missing_artifact_has_no_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let err = InferenceEngine::load(&dir.path().join("nowhere.tar.gz")).unwrap_err();
    assert!(matches!(err, PredictorError::ModelArtifactNotFound(_)));
}
