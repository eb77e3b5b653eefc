//! Bearer token validation for `actix_web_httpauth::middleware::HttpAuthentication`.
//!
//! ```ignore
//! let auth = HttpAuthentication::bearer(validate_bearer);
//! App::new()
//!     .app_data(web::Data::new(JwtVerifier::from_config(&config)?))
//!     .service(web::scope("/api").wrap(auth).service(me))
//! ```
use actix_web::dev::ServiceRequest;
use actix_web::{web, HttpMessage};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use log::{error, warn};

use crate::errors::{CustomError, CustomErrorStatus};
use crate::jwt::JwtVerifier;


/// Verifies the bearer token and attaches its claims to the request.
///
/// A request without an `Authorization: Bearer` header never gets here, the
/// `BearerAuth` extractor rejects it with a 401 first.
///
/// # Arguments
/// * `req` - the incoming request
/// * `credentials` - the bearer credentials taken from the header
pub async fn validate_bearer(req: ServiceRequest, credentials: BearerAuth) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let verifier = match req.app_data::<web::Data<JwtVerifier>>().cloned() {
        Some(verifier) => verifier,
        None => {
            error!("no JwtVerifier registered as app data");
            let error = CustomError::new("token verifier not configured".to_string(), CustomErrorStatus::Unknown);
            return Err((error.into(), req))
        }
    };

    match verifier.verify(credentials.token()).await {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        },
        Err(reason) => {
            warn!("rejected bearer token for {}: {}", req.path(), reason);
            Err((CustomError::from(reason).into(), req))
        }
    }
}
