/// Request classification
///
/// First step of the authorization pipeline: decide whether an inbound path
/// is public or has to carry a bearer token, and which downstream service
/// owns it. Both decisions are pure functions of the path and configuration.

use crate::configuration::GatewaySettings;

/// Authorization class of an inbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Forwarded unchanged, no token required
    Public,
    /// Bearer token must be present and valid before forwarding
    Protected,
}

/// Classify a request path against the public-prefix allowlist.
///
/// Anything not explicitly allowlisted is protected; new routes are
/// authenticated by default.
pub fn classify(path: &str, public_prefixes: &[String]) -> RouteClass {
    if public_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
        RouteClass::Public
    } else {
        RouteClass::Protected
    }
}

/// Resolve the downstream base URL owning a path.
///
/// Returns `None` for paths no downstream owns; the pipeline answers those
/// with 404 without forwarding.
pub fn resolve_target<'a>(path: &'a str, settings: &'a GatewaySettings) -> Option<&'a str> {
    if path.starts_with("/api/auth") {
        Some(settings.auth_service_url.as_str())
    } else if path.starts_with("/api/todos") || path.starts_with("/api/user") {
        Some(settings.todo_service_url.as_str())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> GatewaySettings {
        GatewaySettings {
            port: 0,
            auth_service_url: "http://auth:8001".to_string(),
            todo_service_url: "http://todo:8000".to_string(),
            public_prefixes: vec![
                "/health".to_string(),
                "/api/auth/register".to_string(),
                "/api/auth/login".to_string(),
                "/api/auth/refresh".to_string(),
            ],
            forward_timeout_ms: 5000,
        }
    }

    #[test]
    fn login_and_register_are_public() {
        let s = test_settings();
        assert_eq!(classify("/api/auth/login", &s.public_prefixes), RouteClass::Public);
        assert_eq!(classify("/api/auth/register", &s.public_prefixes), RouteClass::Public);
        assert_eq!(classify("/api/auth/refresh", &s.public_prefixes), RouteClass::Public);
        assert_eq!(classify("/health", &s.public_prefixes), RouteClass::Public);
    }

    #[test]
    fn everything_else_is_protected() {
        let s = test_settings();
        assert_eq!(classify("/api/todos", &s.public_prefixes), RouteClass::Protected);
        assert_eq!(classify("/api/auth/me", &s.public_prefixes), RouteClass::Protected);
        assert_eq!(classify("/api/auth/logout", &s.public_prefixes), RouteClass::Protected);
        assert_eq!(classify("/api/auth/users", &s.public_prefixes), RouteClass::Protected);
        assert_eq!(classify("/anything", &s.public_prefixes), RouteClass::Protected);
    }

    #[test]
    fn targets_resolve_by_path_root() {
        let s = test_settings();
        assert_eq!(resolve_target("/api/auth/login", &s), Some("http://auth:8001"));
        assert_eq!(resolve_target("/api/todos/42", &s), Some("http://todo:8000"));
        assert_eq!(resolve_target("/api/user/profile", &s), Some("http://todo:8000"));
        assert_eq!(resolve_target("/api/unknown", &s), None);
        assert_eq!(resolve_target("/", &s), None);
    }
}
