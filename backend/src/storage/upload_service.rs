use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

const CAPTURES_DIR: &str = "captures";
const DETECTIONS_DIR: &str = "detections";
const DISEASES_DIR: &str = "diseases";
const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePolicy {
    /// Camera captures, pruned after a while.
    Transient,
    Durable,
}

/// Public URL of a stored image reference such as `detections/leaf1.jpg`.
pub fn media_url(relative_path: &str) -> String {
    match relative_path.split_once('/') {
        Some((dir, name)) if dir == CAPTURES_DIR => {
            format!("/detect/uploads/{}", urlencoding::encode(name))
        }
        Some((dir, name)) => format!("/media/{}/{}", dir, urlencoding::encode(name)),
        None => format!("/media/{}", urlencoding::encode(relative_path)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub policy: StoragePolicy,
    pub file_name: String,
    pub relative_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Unsupported file type: {0:?}")]
    UnsupportedFileType(String),
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("File too large")]
    FileTooLarge,
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
    #[error("Storage write error: {0}")]
    StorageWrite(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct UploadService {
    transient_dir: PathBuf,
    media_root: PathBuf,
    max_bytes: usize,
}

impl UploadService {
    pub fn new(transient_dir: PathBuf, media_root: PathBuf, max_bytes: usize) -> Self {
        Self {
            transient_dir,
            media_root,
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn ensure_dirs(&self) -> Result<(), UploadError> {
        fs::create_dir_all(&self.transient_dir)?;
        fs::create_dir_all(self.media_root.join(DETECTIONS_DIR))?;
        fs::create_dir_all(self.media_root.join(DISEASES_DIR))?;
        Ok(())
    }

    fn directory(&self, policy: StoragePolicy) -> PathBuf {
        match policy {
            StoragePolicy::Transient => self.transient_dir.clone(),
            StoragePolicy::Durable => self.media_root.join(DETECTIONS_DIR),
        }
    }

    fn prefix(policy: StoragePolicy) -> &'static str {
        match policy {
            StoragePolicy::Transient => CAPTURES_DIR,
            StoragePolicy::Durable => DETECTIONS_DIR,
        }
    }

    pub fn validate_image_size(&self, image_data: &[u8]) -> Result<(), UploadError> {
        if image_data.is_empty() {
            return Err(UploadError::EmptyFile);
        }
        if image_data.len() > self.max_bytes {
            return Err(UploadError::FileTooLarge);
        }
        Ok(())
    }

    // Names are claimed with create-new opens, so nothing is ever overwritten.
    pub fn store(
        &self,
        original_name: &str,
        image_data: &[u8],
        policy: StoragePolicy,
    ) -> Result<StoredImage, UploadError> {
        let file_name = sanitize_filename(original_name)
            .ok_or_else(|| UploadError::UnsupportedFileType(original_name.to_string()))?;
        let extension = allowed_extension(&file_name)
            .ok_or_else(|| UploadError::UnsupportedFileType(original_name.to_string()))?;
        self.validate_image_size(image_data)?;

        let dir = self.directory(policy);
        fs::create_dir_all(&dir)?;

        let (file_name, path, mut file) = claim_name(&dir, &file_name, extension)?;
        if let Err(e) = file.write_all(image_data).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&path);
            return Err(UploadError::StorageWrite(e));
        }

        log::debug!("Stored upload {:?} as {}", original_name, path.display());
        Ok(StoredImage {
            policy,
            relative_path: format!("{}/{}", Self::prefix(policy), file_name),
            file_name,
        })
    }

    pub fn resolve(&self, policy: StoragePolicy, file_name: &str) -> Result<PathBuf, UploadError> {
        if !is_safe_name(file_name) {
            return Err(UploadError::InvalidName(file_name.to_string()));
        }
        Ok(self.directory(policy).join(file_name))
    }

    pub fn discard(&self, stored: &StoredImage) {
        let path = self.directory(stored.policy).join(&stored.file_name);
        if let Err(e) = fs::remove_file(&path) {
            log::warn!("Failed to remove discarded upload {}: {}", path.display(), e);
        }
    }

    /// Delete camera captures last modified at least `max_age` ago.
    pub fn prune_transient(&self, max_age: Duration) -> Result<usize, UploadError> {
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in fs::read_dir(&self.transient_dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let expired = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= max_age);
            if !expired {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to prune {}: {}", entry.path().display(), e),
            }
        }
        Ok(removed)
    }
}

fn claim_name(dir: &Path, file_name: &str, extension: &str) -> Result<(String, PathBuf, File), UploadError> {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);

    let mut candidate = file_name.to_string();
    for _ in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(&candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((candidate, path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let suffix = Uuid::new_v4().simple().to_string();
                candidate = format!("{}-{}.{}", stem, &suffix[..8], extension);
            }
            Err(e) => return Err(UploadError::StorageWrite(e)),
        }
    }
    Err(UploadError::StorageWrite(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free name for {file_name}"),
    )))
}

pub fn allowed_extension(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().copied().find(|allowed| *allowed == ext)
}

pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", ".");
    }
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.to_string())
}

pub fn is_safe_name(name: &str) -> bool {
    !name.contains("..") && sanitize_filename(name).as_deref() == Some(name)
}
