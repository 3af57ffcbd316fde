/// Refresh Token Management
///
/// Handles secure refresh token generation, storage, rotation, and revocation.
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use: rotation revokes the presented token atomically
/// - Database-backed; revoked rows are kept for audit, never deleted

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// Generate a new cryptographically secure refresh token
///
/// Creates a 64-character random alphanumeric token. The token is returned
/// in plaintext (this is what the client stores); the server stores only
/// the SHA-256 hash.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Hash a refresh token using SHA-256
///
/// Never store plaintext tokens in the database.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Save a refresh token to the database
///
/// # Arguments
/// * `pool` - Database connection pool
/// * `user_id` - User ID that owns this token
/// * `token` - Plaintext refresh token
/// * `expiry_seconds` - Token lifetime in seconds
///
/// # Errors
/// Returns error if database operation fails
pub async fn save_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
    expiry_seconds: i64,
) -> Result<(), AppError> {
    let token_hash = hash_token(token);
    let expires_at = Utc::now() + Duration::seconds(expiry_seconds);

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Consume a refresh token for rotation
///
/// A single conditional UPDATE flips `is_revoked` from false to true and
/// returns the owning user. The condition doubles as the validity check:
/// a miss, an expired token, an already-revoked token, and a lost race with
/// a concurrent rotation all look the same - zero rows updated. Under two
/// concurrent calls presenting the same token, exactly one gets the row.
///
/// # Arguments
/// * `pool` - Database connection pool
/// * `token` - Plaintext refresh token to consume
///
/// # Returns
/// User ID that owned the token
///
/// # Errors
/// Returns `AuthError::TokenInvalid` if no live matching token exists
pub async fn consume_refresh_token(pool: &PgPool, token: &str) -> Result<Uuid, AppError> {
    let token_hash = hash_token(token);
    let now = Utc::now();

    let row = sqlx::query_as::<_, (Uuid,)>(
        r#"
        UPDATE refresh_tokens
        SET is_revoked = true, revoked_at = $1
        WHERE token_hash = $2 AND is_revoked = false AND expires_at > $1
        RETURNING user_id
        "#,
    )
    .bind(now)
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((user_id,)) => Ok(user_id),
        None => {
            tracing::warn!("Refresh token rejected: unknown, expired, revoked, or already consumed");
            Err(AppError::Auth(AuthError::TokenInvalid))
        }
    }
}

/// Revoke a single refresh token
///
/// Used for logout. Idempotent: revoking an already-revoked or unknown
/// token is a no-op success, not an error.
///
/// # Arguments
/// * `pool` - Database connection pool
/// * `token` - Plaintext refresh token to revoke
///
/// # Errors
/// Returns error if database operation fails
pub async fn revoke_refresh_token(pool: &PgPool, token: &str) -> Result<(), AppError> {
    let token_hash = hash_token(token);

    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET is_revoked = true, revoked_at = $1
        WHERE token_hash = $2 AND is_revoked = false
        "#,
    )
    .bind(Utc::now())
    .bind(token_hash)
    .execute(pool)
    .await?;

    Ok(())
}
