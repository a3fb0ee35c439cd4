//! 犬種分類器のコマンドライン
//!
//! - `breed_predictor [predict] [画像パス]`: 画像を分類して上位候補を表示（パス省略時は標準入力から読む）
//! - `breed_predictor train [データフォルダ]`: 学習してアーティファクトを保存
//! - `breed_predictor info [モデルパス]`: アーティファクトのメタデータを表示

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use breed_predictor_lib::model::load_metadata;
use breed_predictor_lib::{get_engine, train_and_save, AppConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("predict");
    let operand = args.get(1).map(PathBuf::from);

    match command {
        "predict" => predict(operand),
        "train" => train(operand),
        "info" => info(operand),
        // 引数が1つだけならパスとみなす
        other if args.len() == 1 => predict(Some(PathBuf::from(other))),
        other => bail!("Unknown command: {other} (expected predict, train or info)"),
    }
}

fn predict(image_path: Option<PathBuf>) -> Result<()> {
    let image_path = match image_path {
        Some(path) => path,
        None => read_path_from_stdin()?,
    };

    let config = AppConfig::load_or_default();
    let engine = get_engine()?;
    let ranked = engine.predict_file(&image_path)?;

    for entry in ranked.iter().take(config.inference.top_k) {
        println!("Breed: {} => Accuracy: {:.2}%", entry.label, entry.score * 100.0);
    }
    Ok(())
}

fn read_path_from_stdin() -> Result<PathBuf> {
    print!("Image path: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("Failed to read image path from stdin")?;
    let line = line.trim().trim_matches('"');
    if line.is_empty() {
        bail!("No image path given");
    }
    Ok(PathBuf::from(line))
}

fn train(dataset_dir: Option<PathBuf>) -> Result<()> {
    let mut config = AppConfig::load_or_default();
    if let Some(dir) = dataset_dir {
        config.training.dataset_dir = dir;
    }
    config.log_summary();

    let model = train_and_save(&config)?;
    println!(
        "Saved {} classifier with {} labels to {}",
        model.classifier_kind(),
        model.vocabulary().len(),
        config.model.model_path.display()
    );
    Ok(())
}

fn info(model_path: Option<PathBuf>) -> Result<()> {
    let model_path = model_path.unwrap_or_else(|| AppConfig::load_or_default().model.model_path);
    let metadata = load_metadata(&model_path)?;

    println!("{}", metadata.to_json_string()?);
    Ok(())
}
