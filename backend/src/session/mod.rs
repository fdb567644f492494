pub mod stash;

use actix_web::cookie::{Cookie, SameSite};
use actix_web::HttpRequest;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "leafscan_session";

/// Opaque per-browser key for short-lived server-side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_request(req: &HttpRequest) -> Option<Self> {
        let cookie = req.cookie(SESSION_COOKIE)?;
        Uuid::parse_str(cookie.value()).ok().map(Self)
    }

    pub fn cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, self.0.to_string())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish()
    }
}
