use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Model artifact {0} is missing and no MODEL_URL is configured")]
    Missing(PathBuf),
    #[error("Model download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Make sure the model file exists locally, downloading it once if needed.
pub async fn ensure_model_artifact(path: &Path, url: Option<&str>) -> Result<(), ArtifactError> {
    if path.exists() {
        log::info!("Model artifact found at {}", path.display());
        return Ok(());
    }
    let url = url.ok_or_else(|| ArtifactError::Missing(path.to_path_buf()))?;

    log::info!("Downloading model from {} to {}", url, path.display());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = path.with_extension("part");
    let result = download(url, &partial).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    let written = result?;
    tokio::fs::rename(&partial, path).await?;
    log::info!("Model downloaded ({} bytes) to {}", written, path.display());
    Ok(())
}

async fn download(url: &str, destination: &Path) -> Result<u64, ArtifactError> {
    let mut response = reqwest::get(url).await?.error_for_status()?;
    let mut file = tokio::fs::File::create(destination).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn existing_artifact_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rice_model.onnx");
        std::fs::write(&path, b"weights").unwrap();

        ensure_model_artifact(&path, Some("http://127.0.0.1:9/never-fetched"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"weights");
    }

    #[actix_web::test]
    async fn missing_artifact_without_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model").join("rice_model.onnx");

        let err = ensure_model_artifact(&path, None).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Missing(p) if p == path));
    }

    #[actix_web::test]
    async fn failed_download_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rice_model.onnx");

        let err = ensure_model_artifact(&path, Some("http://127.0.0.1:9/rice_model.onnx"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Download(_)));
        assert!(!path.exists());
        assert!(!path.with_extension("part").exists());
    }
}
