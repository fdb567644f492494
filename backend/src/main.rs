//! LeafScan server.
//!
//! Needs an inference backend compiled in to serve: `cargo run --features onnx`
//! (or `--features torch`). A build without either exits at startup with
//! `ModelUnavailable`.

mod auth;
mod config;
mod db;
mod detect;
mod inference;
mod routes;
mod session;
mod storage;
#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use auth::jwt::JwtService;
use auth::middleware::IdentityMiddleware;
use config::AppConfig;
use db::detection_repository::DetectionRepository;
use db::disease_repository::DiseaseRepository;
use db::user_repository::UserRepository;
use detect::{DetectionService, DetectionSettings};
use inference::artifact::ensure_model_artifact;
use inference::config::PreprocessingConfig;
use inference::model::load_classifier;
use leafscan_shared::DetectionOutcome;
use routes::configure_routes;
use session::stash::ResultStash;
use std::env;
use std::time::Duration;
use storage::upload_service::UploadService;

const STASH_PURGE_INTERVAL: Duration = Duration::from_secs(60);
const CAPTURE_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn startup_error(context: &str, err: impl std::fmt::Debug) -> std::io::Error {
    log::error!("{}: {:?}", context, err);
    std::io::Error::other(format!("{}: {:?}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    // Model
    ensure_model_artifact(&config.model_path, config.model_url.as_deref())
        .await
        .map_err(|e| startup_error("Model artifact unavailable", e))?;
    let preprocessing = PreprocessingConfig::load_or_default(&config.preprocessing_config)
        .map_err(|e| startup_error("Failed to load preprocessing config", e))?;
    let classifier = load_classifier(&config.model_path, preprocessing)
        .map_err(|e| startup_error("Failed to load model at startup", e))?;
    log::info!("Model loaded from {}", config.model_path.display());

    // Database
    let pool = db::connect(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to database", e))?;
    db::migrate(&pool)
        .await
        .map_err(|e| startup_error("Failed to create schema", e))?;

    let users = UserRepository::new(pool.clone());
    let diseases = DiseaseRepository::new(pool.clone());
    let detections = DetectionRepository::new(pool);

    if config.disease_seed_path.exists() {
        let inserted = diseases
            .seed_from_file(&config.disease_seed_path)
            .await
            .map_err(|e| startup_error("Failed to seed disease catalog", e))?;
        log::info!(
            "Seeded {} new disease entries from {}",
            inserted,
            config.disease_seed_path.display()
        );
    } else {
        log::warn!(
            "Disease seed file {} not found, catalog left as is",
            config.disease_seed_path.display()
        );
    }

    // Storage
    let uploads = UploadService::new(
        config.transient_upload_dir.clone(),
        config.media_root.clone(),
        config.max_upload_bytes,
    );
    uploads
        .ensure_dirs()
        .map_err(|e| startup_error("Failed to create storage directories", e))?;

    // Authentication
    let jwt_secret = config.jwt_secret.clone().unwrap_or_else(|| {
        log::warn!("JWT_SECRET is not set; using a per-process secret, bearer tokens will not verify");
        uuid::Uuid::new_v4().simple().to_string()
    });
    let identity_middleware = IdentityMiddleware::new(JwtService::new(&jwt_secret), users.clone());

    let prune_uploads = uploads.clone();
    let transient_ttl = config.transient_ttl;
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(CAPTURE_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let uploads = prune_uploads.clone();
            match tokio::task::spawn_blocking(move || uploads.prune_transient(transient_ttl)).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => log::info!("Pruned {} expired camera captures", removed),
                Ok(Err(e)) => log::warn!("Failed to prune camera captures: {:?}", e),
                Err(e) => log::error!("Capture pruning task failed: {:?}", e),
            }
        }
    });

    let detection_service = web::Data::new(DetectionService::new(
        classifier,
        uploads,
        detections.clone(),
        diseases.clone(),
        DetectionSettings {
            classify_timeout: config.classify_timeout,
            history_page_size: config.history_page_size,
            recent_limit: config.recent_limit,
        },
    ));

    let stash = web::Data::new(ResultStash::<DetectionOutcome>::new(config.stash_ttl));
    let purge_stash = stash.clone();
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(STASH_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_stash.purge_expired();
            if purged > 0 {
                log::debug!(
                    "Purged {} expired detection results, {} pending",
                    purged,
                    purge_stash.len()
                );
            }
        }
    });

    let media_root = config.media_root.clone();
    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(identity_middleware.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(detection_service.clone())
            .app_data(stash.clone())
            .app_data(web::Data::new(users.clone()))
            .app_data(web::Data::new(diseases.clone()))
            .app_data(web::Data::new(detections.clone()))
            .configure(|cfg| configure_routes(cfg, media_root.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
