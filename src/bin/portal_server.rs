use actix_web::{middleware::Logger, web, App, HttpServer};
use log::info;
use portal_core::config::{AuthConfig, EnvConfig, ServerConfig};
use portal_core::jwt::JwtVerifier;
use portal_core::routes::configure_routes;


#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let server_config = ServerConfig::from_config::<EnvConfig>()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.message))?;
    let auth_config = AuthConfig::from_config::<EnvConfig>()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.message))?;
    let verifier = web::Data::new(
        JwtVerifier::from_config(&auth_config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.message))?
    );

    info!("verifying tokens issued by {} against {}", auth_config.issuer, auth_config.jwks_uri);
    info!("starting server on {}:{}", server_config.host, server_config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(verifier.clone())
            .configure(configure_routes)
    })
    .bind((server_config.host.as_str(), server_config.port))?
    .run()
    .await
}
