use actix_web::http::StatusCode;
use chrono::Utc;
use leafscan_shared::{ClassificationResult, DetectionOutcome, History, HistoryPage, UserId};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::models::CallerIdentity;
use crate::db::RepositoryError;
use crate::db::detection_repository::DetectionRepository;
use crate::db::disease_repository::DiseaseRepository;
use crate::db::models::{DetectionRecord, NewDetection, Page};
use crate::inference::model::{ClassifierError, LeafClassifier};
use crate::storage::upload_service::{media_url, StoragePolicy, UploadError, UploadService};

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("No image was uploaded")]
    MissingImage,
    #[error("Malformed upload form: {0}")]
    InvalidForm(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("Classification timed out after {0:?}")]
    Timeout(Duration),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Worker error: {0}")]
    Worker(String),
}

impl DetectError {
    pub fn user_message(&self) -> String {
        match self {
            DetectError::MissingImage | DetectError::Upload(UploadError::EmptyFile) => {
                "Please choose an image to upload.".to_string()
            }
            DetectError::Upload(UploadError::UnsupportedFileType(_)) => {
                "Unsupported file type. Allowed types: png, jpg, jpeg, gif.".to_string()
            }
            DetectError::InvalidForm(_) => "The upload could not be read.".to_string(),
            DetectError::Upload(UploadError::FileTooLarge) => {
                "The image is too large.".to_string()
            }
            DetectError::Classifier(ClassifierError::InvalidImage(_)) => {
                "The uploaded file could not be read as an image.".to_string()
            }
            _ => "Detection failed. Please try again later.".to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DetectError::MissingImage
            | DetectError::InvalidForm(_)
            | DetectError::Upload(UploadError::EmptyFile)
            | DetectError::Upload(UploadError::UnsupportedFileType(_))
            | DetectError::Upload(UploadError::FileTooLarge)
            | DetectError::Classifier(ClassifierError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            DetectError::Classifier(_) => StatusCode::SERVICE_UNAVAILABLE,
            DetectError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DetectError::Upload(_) | DetectError::Repository(_) | DetectError::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub struct ImageUpload {
    pub file_name: String,
    pub data: Vec<u8>,
    pub policy: StoragePolicy,
}

pub struct DetectionSettings {
    pub classify_timeout: Duration,
    pub history_page_size: u32,
    pub recent_limit: u32,
}

pub struct DetectionService {
    classifier: Arc<dyn LeafClassifier>,
    uploads: UploadService,
    detections: DetectionRepository,
    diseases: DiseaseRepository,
    settings: DetectionSettings,
}

impl DetectionService {
    pub fn new(
        classifier: Arc<dyn LeafClassifier>,
        uploads: UploadService,
        detections: DetectionRepository,
        diseases: DiseaseRepository,
        settings: DetectionSettings,
    ) -> Self {
        Self {
            classifier,
            uploads,
            detections,
            diseases,
            settings,
        }
    }

    pub fn uploads(&self) -> &UploadService {
        &self.uploads
    }

    // Nothing is recorded unless every step succeeds; the stored image is
    // removed again when a later step fails.
    pub async fn submit(
        &self,
        upload: ImageUpload,
        caller: &CallerIdentity,
    ) -> Result<DetectionOutcome, DetectError> {
        let ImageUpload {
            file_name,
            data,
            policy,
        } = upload;
        let data = Arc::new(data);

        let uploads = self.uploads.clone();
        let bytes = data.clone();
        let stored = tokio::task::spawn_blocking(move || uploads.store(&file_name, &bytes, policy))
            .await
            .map_err(|e| DetectError::Worker(e.to_string()))??;

        let result = match self.classify(data).await {
            Ok(result) => result,
            Err(e) => {
                self.uploads.discard(&stored);
                return Err(e);
            }
        };

        let label = result.label.to_string();
        let disease = match self.diseases.find_by_label(&label).await {
            Ok(disease) => disease,
            Err(e) => {
                log::warn!("Disease lookup for {:?} failed: {:?}", label, e);
                None
            }
        };

        let record = NewDetection {
            image_path: stored.relative_path.clone(),
            result: label,
            confidence: f64::from(result.confidence),
            user_id: caller.user_id(),
            created_at: Utc::now(),
        };
        let record_id = match self.detections.append(&record).await {
            Ok(id) => id,
            Err(e) => {
                self.uploads.discard(&stored);
                return Err(e.into());
            }
        };

        log::info!(
            "Detection {} recorded: {} ({:.1}%) for {:?}",
            record_id,
            record.result,
            result.confidence,
            caller
        );

        Ok(DetectionOutcome {
            record_id,
            result,
            image_url: media_url(&stored.relative_path),
            disease: disease.map(|d| d.to_view()),
        })
    }

    async fn classify(
        &self,
        data: Arc<Vec<u8>>,
    ) -> Result<ClassificationResult, DetectError> {
        let classifier = self.classifier.clone();
        let task = tokio::task::spawn_blocking(move || classifier.classify(&data));
        match tokio::time::timeout(self.settings.classify_timeout, task).await {
            Ok(joined) => Ok(joined.map_err(|e| DetectError::Worker(e.to_string()))??),
            Err(_) => Err(DetectError::Timeout(self.settings.classify_timeout)),
        }
    }

    pub async fn history(&self, caller: &CallerIdentity, page: u32) -> Result<History, DetectError> {
        match caller.user_id() {
            Some(user_id) => {
                let page = self
                    .detections
                    .list_by_user(user_id, page, self.settings.history_page_size)
                    .await?;
                Ok(History::Paginated(to_history_page(page)))
            }
            None => {
                let recent = self.detections.list_recent(self.settings.recent_limit).await?;
                Ok(History::Recent {
                    items: recent.iter().map(DetectionRecord::to_entry).collect(),
                })
            }
        }
    }

    pub async fn logs(
        &self,
        user_id: UserId,
        page: u32,
    ) -> Result<HistoryPage, DetectError> {
        let page = self
            .detections
            .list_by_user(user_id, page, self.settings.history_page_size)
            .await?;
        Ok(to_history_page(page))
    }
}

fn to_history_page(page: Page<DetectionRecord>) -> HistoryPage {
    HistoryPage {
        items: page.items.iter().map(DetectionRecord::to_entry).collect(),
        page: page.page,
        per_page: page.per_page,
        total: page.total,
    }
}
