pub mod export;
pub mod import;
pub mod search;

use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::embedding::local::{model_paths, MODEL_FILE, TOKENIZER_FILE};

const HF_BASE: &str = "https://huggingface.co/sentence-transformers";

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &crate::config::EmbeddingConfig) -> Result<()> {
    let (model_path, tokenizer_path) = model_paths(config);
    if let Some(dir) = model_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create cache dir: {}", dir.display()))?;
    }

    let files = [
        (format!("{HF_BASE}/{}/resolve/main/onnx/{MODEL_FILE}", config.model), model_path),
        (format!("{HF_BASE}/{}/resolve/main/{TOKENIZER_FILE}", config.model), tokenizer_path),
    ];

    for (url, dest) in &files {
        if dest.exists() {
            println!("Already present: {}", dest.display());
            continue;
        }
        println!("Downloading {url}");
        download_file(url, dest).await?;
        println!("Saved to {}", dest.display());
    }

    println!("Model '{}' ready.", config.model);
    Ok(())
}

/// Stream a URL to disk with a progress bar. Writes to a temp file, then renames.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;
    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    let mut body = Box::pin(response.bytes_stream());
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("error reading response")?;
        file.write_all(&chunk).await.context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
