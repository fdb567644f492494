use actix_files::{Files, NamedFile};
use actix_multipart::{Multipart, MultipartError};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use futures::TryStreamExt;
use leafscan_shared::{DashboardStats, DashboardView, DetectView, DetectionOutcome, History};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::auth::middleware::{AuthenticatedUser, Caller};
use crate::auth::models::CallerIdentity;
use crate::auth::routes::me;
use crate::db::detection_repository::DetectionRepository;
use crate::db::disease_repository::DiseaseRepository;
use crate::db::user_repository::UserRepository;
use crate::detect::{DetectError, DetectionService, ImageUpload};
use crate::session::stash::ResultStash;
use crate::session::SessionId;
use crate::storage::upload_service::{StoragePolicy, UploadError};

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    // Anything that is not a number is page 1.
    fn page(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, media_root: PathBuf) {
    cfg.service(
        web::resource("/detect")
            .route(web::get().to(show_detect))
            .route(web::post().to(submit_detect)),
    )
    .service(web::resource("/detect/logs").route(web::get().to(detection_logs)))
    .service(web::resource("/detect/uploads/{filename}").route(web::get().to(serve_upload)))
    .service(web::resource("/dashboard").route(web::get().to(dashboard)))
    .service(web::resource("/diseases").route(web::get().to(list_diseases)))
    .service(web::resource("/auth/me").route(web::get().to(me)))
    .service(web::resource("/health").route(web::get().to(health)))
    .service(Files::new("/media", media_root));
}

fn storage_policy(source: Option<&str>) -> StoragePolicy {
    match source {
        Some("camera") => StoragePolicy::Transient,
        Some("upload") | None => StoragePolicy::Durable,
        Some(other) => {
            warn!("Unknown upload source {:?}, storing durably", other);
            StoragePolicy::Durable
        }
    }
}

struct FormImage {
    file_name: String,
    data: Vec<u8>,
    too_large: bool,
}

#[derive(Default)]
struct UploadForm {
    image: Option<FormImage>,
    source: Option<String>,
}

impl UploadForm {
    async fn read(mut payload: Multipart, max_bytes: usize) -> Result<Self, MultipartError> {
        let mut form = UploadForm::default();
        while let Some(mut field) = payload.try_next().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    let file_name = field
                        .content_disposition()
                        .and_then(|cd| cd.get_filename())
                        .unwrap_or_default()
                        .to_string();
                    let mut data = Vec::new();
                    let mut too_large = false;
                    while let Some(chunk) = field.try_next().await? {
                        if too_large || data.len() + chunk.len() > max_bytes {
                            too_large = true;
                            continue;
                        }
                        data.extend_from_slice(&chunk);
                    }
                    form.image = Some(FormImage {
                        file_name,
                        data,
                        too_large,
                    });
                }
                "source" => {
                    let mut value = Vec::new();
                    while let Some(chunk) = field.try_next().await? {
                        value.extend_from_slice(&chunk);
                    }
                    form.source = Some(String::from_utf8_lossy(&value).trim().to_string());
                }
                other => {
                    log::debug!("Ignoring form field {:?}", other);
                    while field.try_next().await?.is_some() {}
                }
            }
        }
        Ok(form)
    }

    fn into_upload(self) -> Result<ImageUpload, DetectError> {
        let policy = storage_policy(self.source.as_deref());
        let image = self.image.ok_or(DetectError::MissingImage)?;
        if image.file_name.is_empty() {
            return Err(DetectError::MissingImage);
        }
        if image.too_large {
            return Err(UploadError::FileTooLarge.into());
        }
        Ok(ImageUpload {
            file_name: image.file_name,
            data: image.data,
            policy,
        })
    }
}

async fn show_detect(
    req: HttpRequest,
    caller: Caller,
    query: web::Query<PageQuery>,
    service: web::Data<DetectionService>,
    stash: web::Data<ResultStash<DetectionOutcome>>,
) -> HttpResponse {
    match service.history(&caller.0, query.page()).await {
        Ok(history) => {
            let outcome =
                SessionId::from_request(&req).and_then(|session| stash.take(&session));
            HttpResponse::Ok().json(DetectView {
                outcome,
                error: None,
                history,
            })
        }
        Err(e) => {
            error!("Failed to load detection history: {:?}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to load detection history".into(),
            })
        }
    }
}

async fn submit_detect(
    req: HttpRequest,
    caller: Caller,
    payload: Multipart,
    service: web::Data<DetectionService>,
    stash: web::Data<ResultStash<DetectionOutcome>>,
) -> HttpResponse {
    let upload = match UploadForm::read(payload, service.uploads().max_bytes()).await {
        Ok(form) => form.into_upload(),
        Err(e) => Err(DetectError::InvalidForm(e.to_string())),
    };
    let upload = match upload {
        Ok(upload) => upload,
        Err(e) => return failed_detection(&service, &caller.0, e).await,
    };

    match service.submit(upload, &caller.0).await {
        Ok(outcome) => {
            let existing = SessionId::from_request(&req);
            let session = existing.unwrap_or_else(SessionId::generate);
            stash.put(session, outcome);

            let mut response = HttpResponse::SeeOther();
            response.insert_header((header::LOCATION, "/detect"));
            if existing.is_none() {
                response.cookie(session.cookie());
            }
            response.finish()
        }
        Err(e) => failed_detection(&service, &caller.0, e).await,
    }
}

async fn failed_detection(
    service: &DetectionService,
    caller: &CallerIdentity,
    err: DetectError,
) -> HttpResponse {
    let status = err.status_code();
    if status.is_server_error() {
        error!("Detection failed: {:?}", err);
    } else {
        warn!("Detection rejected: {}", err);
    }

    let history = match service.history(caller, 1).await {
        Ok(history) => history,
        Err(e) => {
            error!("Failed to load detection history: {:?}", e);
            History::Recent { items: Vec::new() }
        }
    };
    HttpResponse::build(status).json(DetectView {
        outcome: None,
        error: Some(err.user_message()),
        history,
    })
}

async fn detection_logs(
    user: AuthenticatedUser,
    query: web::Query<PageQuery>,
    service: web::Data<DetectionService>,
) -> HttpResponse {
    match service.logs(user.0, query.page()).await {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => {
            error!("Failed to load detection logs for user {}: {:?}", user.0, e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to load detection logs".into(),
            })
        }
    }
}

async fn serve_upload(
    req: HttpRequest,
    path: web::Path<String>,
    service: web::Data<DetectionService>,
) -> HttpResponse {
    let file_name = path.into_inner();
    let file_path = match service.uploads().resolve(StoragePolicy::Transient, &file_name) {
        Ok(file_path) => file_path,
        Err(e) => {
            warn!("Refusing to serve upload: {}", e);
            return HttpResponse::BadRequest().json(ErrorResponse {
                error: "Invalid file name".into(),
            });
        }
    };

    match NamedFile::open_async(&file_path).await {
        Ok(file) => file.into_response(&req),
        Err(e) => {
            info!("Upload {} not served: {}", file_path.display(), e);
            HttpResponse::NotFound().json(ErrorResponse {
                error: "File not found".into(),
            })
        }
    }
}

async fn dashboard(
    caller: Caller,
    users: web::Data<UserRepository>,
    diseases: web::Data<DiseaseRepository>,
    detections: web::Data<DetectionRepository>,
) -> HttpResponse {
    let catalog = match diseases.list_all().await {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Failed to list diseases: {:?}", e);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to load dashboard".into(),
            });
        }
    };

    let stats = match &caller.0 {
        CallerIdentity::Anonymous => None,
        CallerIdentity::User { .. } => {
            let counts = async {
                Ok::<_, crate::db::RepositoryError>(DashboardStats {
                    users: users.count().await?,
                    diseases: diseases.count().await?,
                    detections: detections.count().await?,
                })
            };
            match counts.await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    error!("Failed to count dashboard stats: {:?}", e);
                    return HttpResponse::InternalServerError().json(ErrorResponse {
                        error: "Failed to load dashboard".into(),
                    });
                }
            }
        }
    };

    HttpResponse::Ok().json(DashboardView {
        role: caller.0.role_name().to_string(),
        stats,
        diseases: catalog.iter().map(|d| d.to_view()).collect(),
    })
}

async fn list_diseases(diseases: web::Data<DiseaseRepository>) -> HttpResponse {
    match diseases.list_all().await {
        Ok(catalog) => {
            let views: Vec<_> = catalog.iter().map(|d| d.to_view()).collect();
            HttpResponse::Ok().json(views)
        }
        Err(e) => {
            error!("Failed to list diseases: {:?}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to list diseases".into(),
            })
        }
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}
