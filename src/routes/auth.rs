/// Authentication Routes
///
/// Handles user registration, login, token refresh, logout, remote token
/// validation, and current user information.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{
    consume_refresh_token, generate_access_token, generate_refresh_token, hash_password,
    revoke_refresh_token, save_refresh_token, verify_dummy_password, verify_password, Claims,
};
use crate::configuration::{ApplicationSettings, JwtSettings};
use crate::error::{AppError, AuthError, ErrorContext};
use crate::validators::{is_valid_email, is_valid_name};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh / logout request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub created_at: String,
}

/// POST /api/auth/register
///
/// Register a new user with email, password, and name.
/// Returns access token and refresh token on success.
///
/// # Validation
/// - Email must be valid format and not already registered
/// - Password must be 8+ chars with digit, lowercase, and uppercase
/// - Names must be non-empty without control characters
///
/// # Errors
/// - 400: Validation errors (invalid email/password/name)
/// - 409: Email already registered (duplicate)
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
    app_config: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    // Validate inputs
    let email = is_valid_email(&form.email)?;
    let first_name = is_valid_name("first_name", &form.first_name)?;
    let last_name = is_valid_name("last_name", &form.last_name)?;
    let password_hash = hash_password(&form.password, app_config.bcrypt_cost)?;

    // Create user; the unique index on email turns duplicates into 409
    let user_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(&first_name)
    .bind(&last_name)
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    // Issue token pair
    let access_token = generate_access_token(&user_id, &email, "user", jwt_config.get_ref())?;
    let refresh_token = generate_refresh_token();

    save_refresh_token(
        pool.get_ref(),
        user_id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /api/auth/login
///
/// Authenticate user with email and password.
/// Returns access token and refresh token on success.
///
/// # Errors
/// - 400: Validation error (invalid email format)
/// - 401: Invalid credentials (unknown email, wrong password, or inactive account)
/// - 500: Internal server error
///
/// # Security Notes
/// - Uses the same 401 for "not found", "wrong password", and "inactive"
/// - A dummy bcrypt verification runs on the not-found path so response
///   timing does not reveal whether the email exists
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let email = is_valid_email(&form.email)?;

    let user = sqlx::query_as::<_, (Uuid, String, String, String, bool)>(
        "SELECT id, email, password_hash, role, is_active FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?;

    let (user_id, user_email, password_hash, role, is_active) = match user {
        Some(row) => row,
        None => {
            verify_dummy_password(&form.password);
            return Err(AppError::Auth(AuthError::InvalidCredentials));
        }
    };

    let password_valid = verify_password(&form.password, &password_hash)?;
    if !password_valid || !is_active {
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    // Issue token pair
    let access_token = generate_access_token(&user_id, &user_email, &role, jwt_config.get_ref())?;
    let refresh_token = generate_refresh_token();

    save_refresh_token(
        pool.get_ref(),
        user_id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /api/auth/refresh
///
/// Refresh access token using a refresh token.
/// Implements token rotation: the presented token is consumed atomically
/// and a new pair is issued.
///
/// # Token Rotation Security
/// - The revoked flag flips in a single conditional UPDATE; of two
///   concurrent calls presenting the same token, exactly one wins
/// - Replaying a consumed token is rejected with 401
/// - The owning account must still be active at refresh time
///
/// # Errors
/// - 401: Invalid, expired, revoked, or already-consumed refresh token;
///        or owning account deactivated
/// - 500: Internal server error
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    // Consume the presented token (atomic rotation step)
    let user_id = consume_refresh_token(pool.get_ref(), &form.refresh_token).await?;

    // Live is_active check on every refresh; a deactivated owner gets the
    // same 401 as a bad token. The presented token is already burned.
    let user = sqlx::query_as::<_, (String, String)>(
        "SELECT email, role FROM users WHERE id = $1 AND is_active = true",
    )
    .bind(user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(AppError::Auth(AuthError::TokenInvalid))?;

    let (user_email, role) = user;

    // Issue the replacement pair
    let access_token = generate_access_token(&user_id, &user_email, &role, jwt_config.get_ref())?;
    let refresh_token = generate_refresh_token();

    save_refresh_token(
        pool.get_ref(),
        user_id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "Token refreshed successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /api/auth/logout
///
/// Revoke a refresh token. **Requires valid JWT access token.**
/// Idempotent: logging out an already-revoked or unknown token succeeds.
///
/// # Errors
/// - 401: Missing or invalid access token (handled by middleware)
/// - 500: Internal server error
pub async fn logout(
    form: web::Json<RefreshRequest>,
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    revoke_refresh_token(pool.get_ref(), &form.refresh_token).await?;

    tracing::info!(user_id = %claims.sub, "User logged out");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}

/// GET /api/auth/me
///
/// Get current authenticated user's information.
/// **Requires valid JWT access token** in Authorization header.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 404: User not found or inactive
/// - 500: Internal server error
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, (Uuid, String, String, String, bool, chrono::DateTime<Utc>)>(
        r#"
        SELECT id, email, first_name, last_name, is_active, created_at
        FROM users WHERE id = $1 AND is_active = true
        "#,
    )
    .bind(user_id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.0.to_string(),
        email: user.1,
        first_name: user.2,
        last_name: user.3,
        is_active: user.4,
        created_at: user.5.to_rfc3339(),
    }))
}

/// GET /api/auth/validate
///
/// Validate the presented access token and echo the embedded identity.
/// Intended for downstream services that cannot verify tokens locally.
/// The token itself is checked by the JWT middleware; this handler only
/// renders the claims and never touches the store.
pub async fn validate_token(claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "valid": true,
        "user": {
            "id": claims.sub,
            "email": claims.email,
            "role": claims.role,
        }
    })))
}
