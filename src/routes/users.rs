/// User Administration Routes

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::{AppError, AuthError};
use crate::routes::auth::UserResponse;

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Deserialize)]
pub struct ListUsersQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/auth/users
///
/// List all users, newest first. **Requires an access token whose claims
/// carry the administrative role**; any other authenticated caller gets 403.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 403: Caller is not an administrator
/// - 500: Internal server error
pub async fn list_users(
    claims: web::ReqData<Claims>,
    query: web::Query<ListUsersQuery>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    if !claims.is_admin() {
        tracing::warn!(user_id = %claims.sub, "Non-admin attempted user listing");
        return Err(AppError::Auth(AuthError::AdminRequired));
    }

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let rows = sqlx::query_as::<_, (Uuid, String, String, String, bool, chrono::DateTime<Utc>)>(
        r#"
        SELECT id, email, first_name, last_name, is_active, created_at
        FROM users
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    let users: Vec<UserResponse> = rows
        .into_iter()
        .map(|(id, email, first_name, last_name, is_active, created_at)| UserResponse {
            id: id.to_string(),
            email,
            first_name,
            last_name,
            is_active,
            created_at: created_at.to_rfc3339(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(users))
}
