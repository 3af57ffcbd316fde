use config::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub gateway: GatewaySettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    /// bcrypt work factor used when hashing passwords
    pub bcrypt_cost: u32,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 1800 for 30 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

/// API gateway settings
///
/// The gateway validates access tokens locally with the shared JWT secret,
/// so it also reads the `jwt` section; this struct carries only what is
/// specific to the proxy itself.
#[derive(serde::Deserialize, Clone)]
pub struct GatewaySettings {
    pub port: u16,
    pub auth_service_url: String,
    pub todo_service_url: String,
    /// Path prefixes that bypass authorization (registration, login, ...)
    pub public_prefixes: Vec<String>,
    /// Upper bound on a single forwarded request, in milliseconds
    pub forward_timeout_ms: u64,
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .build()?;
    settings.try_deserialize::<Settings>()
}
