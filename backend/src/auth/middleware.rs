use super::jwt::JwtService;
use super::models::CallerIdentity;
use crate::db::user_repository::UserRepository;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ok, ready, Ready};
use leafscan_shared::UserId;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

/// Resolves the optional bearer token of every request to a [`CallerIdentity`].
#[derive(Clone)]
pub struct IdentityMiddleware {
    jwt_service: Arc<JwtService>,
    users: UserRepository,
}

impl IdentityMiddleware {
    pub fn new(jwt_service: JwtService, users: UserRepository) -> Self {
        Self {
            jwt_service: Arc::new(jwt_service),
            users,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = IdentityMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(IdentityMiddlewareService {
            service: Rc::new(service),
            jwt_service: self.jwt_service.clone(),
            users: self.users.clone(),
        })
    }
}

pub struct IdentityMiddlewareService<S> {
    service: Rc<S>,
    jwt_service: Arc<JwtService>,
    users: UserRepository,
}

#[derive(Debug)]
enum AuthError {
    InvalidHeaderFormat,
    NotBearerToken,
    VerificationFailed(String),
}

impl AuthError {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthError::InvalidHeaderFormat => format!("Invalid Authorization header format (non-UTF-8) for path: {}", path),
            AuthError::NotBearerToken => format!("Authorization header for path {} doesn't start with 'Bearer '", path),
            AuthError::VerificationFailed(e) => format!("JWT token verification failed for path {}: {}", path, e),
        }
    }

    fn client_error_json(&self) -> serde_json::Value {
        let error_message = match self {
            AuthError::VerificationFailed(_) => "Token verification failed",
            _ => "Missing or invalid authorization token",
        };
        serde_json::json!({"error": error_message})
    }
}

fn validate_request_token(
    req: &ServiceRequest,
    jwt_service: &JwtService,
) -> Result<Option<UserId>, AuthError> {
    let Some(auth_header) = req.headers().get("Authorization") else {
        return Ok(None);
    };
    let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidHeaderFormat)?;
    let token = auth_str.strip_prefix("Bearer ").ok_or(AuthError::NotBearerToken)?;

    log::debug!("Found Bearer token, verifying...");
    let user_id = jwt_service
        .verify_user(token)
        .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;
    Ok(Some(user_id))
}

fn is_public_asset(path: &str) -> bool {
    path.starts_with("/media/") || path.starts_with("/detect/uploads/") || path == "/health"
}

impl<S, B> Service<ServiceRequest> for IdentityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt_service = self.jwt_service.clone();
        let users = self.users.clone();

        Box::pin(async move {
            let path_str = req.path().to_string();

            if is_public_asset(&path_str) {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }
            log::debug!("Identity middleware processing path: {}", &path_str);

            let identity = match validate_request_token(&req, &jwt_service) {
                Ok(None) => CallerIdentity::Anonymous,
                Ok(Some(user_id)) => match users.get_user_by_id(user_id).await {
                    Ok(Some(user)) => CallerIdentity::from(&user),
                    Ok(None) => {
                        log::warn!(
                            "Token subject {} has no user row, continuing as anonymous on {}",
                            user_id,
                            path_str
                        );
                        CallerIdentity::Anonymous
                    }
                    Err(e) => {
                        log::error!("Failed to look up user {}: {:?}", user_id, e);
                        let (http_req, _payload) = req.into_parts();
                        let response = HttpResponse::ServiceUnavailable()
                            .json(serde_json::json!({"error": "Identity lookup failed"}))
                            .map_into_right_body();
                        return Ok(ServiceResponse::new(http_req, response));
                    }
                },
                Err(auth_error) => {
                    log::warn!("{}", auth_error.log_message(&path_str));

                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Unauthorized()
                        .json(auth_error.client_error_json())
                        .map_into_right_body();
                    return Ok(ServiceResponse::new(http_req, response));
                }
            };

            req.extensions_mut().insert(identity);
            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

pub struct Caller(pub CallerIdentity);

impl FromRequest for Caller {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let identity = req
            .extensions()
            .get::<CallerIdentity>()
            .cloned()
            .unwrap_or_default();
        ok(Caller(identity))
    }
}

/// Like [`Caller`], but rejects anonymous requests with 401.
pub struct AuthenticatedUser(pub UserId);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let user_id = req
            .extensions()
            .get::<CallerIdentity>()
            .and_then(CallerIdentity::user_id);
        match user_id {
            Some(user_id) => ready(Ok(AuthenticatedUser(user_id))),
            None => {
                log::warn!("Rejecting anonymous request to {}", req.path());
                let response = HttpResponse::Unauthorized()
                    .json(serde_json::json!({"error": "Authentication required"}));
                ready(Err(actix_web::error::InternalError::from_response(
                    "authentication required",
                    response,
                )
                .into()))
            }
        }
    }
}
