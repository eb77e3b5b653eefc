//! Wires the views into an actix app.
use actix_web::{get, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde_json::json;

use crate::jwt::Claims;
use crate::middleware::validate_bearer;
use crate::pages;


#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}


/// Returns the claims of the caller's token.
#[get("/me")]
async fn me(claims: Claims) -> HttpResponse {
    HttpResponse::Ok().json(claims)
}


/// Registers the public pages and the token protected `/api` scope.
///
/// The app must carry a `web::Data<JwtVerifier>` for the `/api` scope to accept anything.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    let auth = HttpAuthentication::bearer(validate_bearer);

    cfg.service(pages::home);
    cfg.service(health);
    cfg.service(
        web::scope("/api")
            .wrap(auth)
            .service(me)
    );
}
