/// API Gateway Authorization Pipeline
///
/// Every inbound request walks the same pipeline:
/// Received -> Classified -> (Public | AuthPending) -> Forwarded | Rejected.
/// Public paths are relayed unchanged; protected paths must carry a bearer
/// token that validates locally against the shared signing secret, and the
/// verified identity is injected as trusted headers before forwarding.
/// Rejections are terminal - the downstream is never contacted for them.

mod classify;
mod forward;

pub use classify::{classify, resolve_target, RouteClass};
pub use forward::{forward, USER_EMAIL_HEADER, USER_ID_HEADER};

use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpRequest, HttpResponse, HttpServer};
use std::net::TcpListener;
use std::time::Duration;

use crate::auth::validate_access_token;
use crate::configuration::{GatewaySettings, JwtSettings};
use crate::error::{AppError, AuthError, GatewayError};
use crate::logger::LoggerMiddleware;

/// The per-request pipeline. Registered as the default service so every
/// method and path funnels through it.
async fn pipeline(
    req: HttpRequest,
    body: web::Bytes,
    settings: web::Data<GatewaySettings>,
    jwt_config: web::Data<JwtSettings>,
    client: web::Data<reqwest::Client>,
) -> Result<HttpResponse, AppError> {
    let path = req.path();

    // The gateway answers its own health check
    if path == "/health" {
        return Ok(HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "service": "api-gateway"
        })));
    }

    let target = resolve_target(path, settings.get_ref())
        .ok_or_else(|| AppError::Gateway(GatewayError::RouteNotFound(path.to_string())))?;

    let identity = match classify(path, &settings.public_prefixes) {
        RouteClass::Public => None,
        RouteClass::Protected => {
            let token = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .ok_or(AppError::Auth(AuthError::MissingToken))?;

            // Local cryptographic validation; no call to the auth service.
            // Failures reject here, before any downstream traffic.
            let claims = validate_access_token(token, jwt_config.get_ref())?;

            tracing::debug!(
                user_id = %claims.sub,
                path = %path,
                "Request authorized, injecting identity"
            );
            Some(claims)
        }
    };

    forward(client.get_ref(), target, &req, body, identity.as_ref()).await
}

/// Build and start the gateway server.
pub fn run_gateway(
    listener: TcpListener,
    settings: GatewaySettings,
    jwt_config: JwtSettings,
) -> Result<Server, std::io::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(settings.forward_timeout_ms))
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let settings = web::Data::new(settings);
    let jwt_config = web::Data::new(jwt_config);
    let client = web::Data::new(client);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .app_data(settings.clone())
            .app_data(jwt_config.clone())
            .app_data(client.clone())
            .default_service(web::route().to(pipeline))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
