use actix_web::{web, HttpResponse, Result};
use log::error;

use crate::db::user_repository::UserRepository;

use super::middleware::AuthenticatedUser;
use super::models::AuthUser;

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn me(
    user: AuthenticatedUser,
    users: web::Data<UserRepository>,
) -> Result<HttpResponse> {
    log::info!("/auth/me endpoint called for user ID: {}", user.0);

    match users.get_user_by_id(user.0).await {
        Ok(Some(user_data)) => Ok(HttpResponse::Ok().json(AuthUser::from(user_data))),
        Ok(None) => {
            log::warn!("User not found in database for ID: {}", user.0);
            Ok(HttpResponse::NotFound().json(ErrorResponse {
                error: "User not found".to_string(),
            }))
        }
        Err(e) => {
            error!("Failed to fetch user data for ID {}: {:?}", user.0, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to fetch user".to_string(),
            }))
        }
    }
}
