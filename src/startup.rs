use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;

use crate::configuration::{ApplicationSettings, JwtSettings};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    get_current_user, health_check, list_users, login, logout, refresh, register, validate_token,
};

/// Build and start the auth service.
///
/// Registration, login, and refresh are public (refresh is token-bearing
/// but pre-identity); everything else under /api/auth requires a valid
/// access token.
pub fn run(
    listener: TcpListener,
    connection: PgPool,
    jwt_config: JwtSettings,
    app_config: ApplicationSettings,
) -> Result<Server, std::io::Error> {
    let connection = web::Data::new(connection);
    let jwt_config_data = web::Data::new(jwt_config.clone());
    let app_config_data = web::Data::new(app_config);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(connection.clone())
            .app_data(jwt_config_data.clone())
            .app_data(app_config_data.clone())

            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/api/auth")
                    // Public routes (no authentication required)
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    // Protected routes (require JWT authentication)
                    .service(
                        web::scope("")
                            .wrap(JwtMiddleware::new(jwt_config.clone()))
                            .route("/logout", web::post().to(logout))
                            .route("/me", web::get().to(get_current_user))
                            .route("/validate", web::get().to(validate_token))
                            .route("/users", web::get().to(list_users)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
