use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::net::TcpListener;
use todo_services::configuration::{get_configuration, DatabaseSettings};
use todo_services::startup::run;

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    // low work factor keeps the suite fast
    configuration.application.bcrypt_cost = 4;
    let connection_pool = configure_database(&configuration.database).await;

    let server = run(
        listener,
        connection_pool.clone(),
        configuration.jwt.clone(),
        configuration.application.clone(),
    )
    .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

fn register_body(email: &str) -> Value {
    json!({
        "email": email,
        "password": "SecurePass123",
        "first_name": "John",
        "last_name": "Doe"
    })
}

async fn register_user(app: &TestApp, client: &reqwest::Client, email: &str) -> Value {
    let response = client
        .post(&format!("{}/api/auth/register", &app.address))
        .json(&register_body(email))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(201, response.status().as_u16());
    response.json().await.expect("Failed to parse response")
}

// --- Health Check ---

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(&format!("{}/health", &app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

// --- Registration Tests ---

#[tokio::test]
async fn register_returns_201_and_persists_user() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let body = register_user(&app, &client, "john@example.com").await;
    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_some());
    assert_eq!(body["token_type"], "Bearer");

    let user = sqlx::query_as::<_, (String, String, String, bool)>(
        "SELECT email, first_name, last_name, is_active FROM users WHERE email = 'john@example.com'",
    )
    .fetch_one(&app.db_pool)
    .await
    .expect("Failed to fetch created user");

    assert_eq!(user.0, "john@example.com");
    assert_eq!(user.1, "John");
    assert_eq!(user.2, "Doe");
    assert!(user.3, "New users start active");
}

#[tokio::test]
async fn register_returns_400_for_invalid_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let invalid_emails = vec!["notanemail", "user@", "@example.com", "user@@example.com"];

    for invalid_email in invalid_emails {
        let response = client
            .post(&format!("{}/api/auth/register", &app.address))
            .json(&register_body(invalid_email))
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject invalid email: {}",
            invalid_email
        );
    }
}

#[tokio::test]
async fn register_returns_400_for_weak_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let long_password = "a".repeat(129);
    let weak_passwords = vec![
        ("short", "password too short"),
        ("nouppercase123", "no uppercase"),
        ("NOLOWERCASE123", "no lowercase"),
        ("NoDigits", "no digits"),
        (long_password.as_str(), "password too long"),
    ];

    for (weak_password, reason) in weak_passwords {
        let body = json!({
            "email": "test@example.com",
            "password": weak_password,
            "first_name": "Test",
            "last_name": "User"
        });

        let response = client
            .post(&format!("{}/api/auth/register", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject weak password: {}",
            reason
        );
    }
}

#[tokio::test]
async fn register_returns_409_for_duplicate_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "john@example.com").await;

    let response = client
        .post(&format!("{}/api/auth/register", &app.address))
        .json(&register_body("john@example.com"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(
        409,
        response.status().as_u16(),
        "Should reject duplicate email with 409 Conflict"
    );
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "DUPLICATE_ENTRY");
}

#[tokio::test]
async fn register_returns_400_for_missing_fields() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let test_cases = vec![
        (
            json!({"email": "t@example.com", "password": "Pass1234"}),
            "missing names",
        ),
        (
            json!({"password": "Pass1234", "first_name": "A", "last_name": "B"}),
            "missing email",
        ),
        (
            json!({"email": "t@example.com", "first_name": "A", "last_name": "B"}),
            "missing password",
        ),
        (json!({}), "missing all fields"),
    ];

    for (body, reason) in test_cases {
        let response = client
            .post(&format!("{}/api/auth/register", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject request: {}",
            reason
        );
    }
}

// --- Login Tests ---

#[tokio::test]
async fn login_returns_token_pair_for_valid_credentials() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "john@example.com").await;

    let login_body = json!({
        "email": "john@example.com",
        "password": "SecurePass123"
    });

    let response = client
        .post(&format!("{}/api/auth/login", &app.address))
        .json(&login_body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    let access_token = body["access_token"].as_str().expect("No access token");
    assert!(body.get("refresh_token").is_some());

    // The access token must validate and carry the registered identity
    let me = client
        .get(&format!("{}/api/auth/me", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, me.status().as_u16());
    let me_body: Value = me.json().await.expect("Failed to parse response");
    assert_eq!(me_body["email"], "john@example.com");
    assert_eq!(me_body["first_name"], "John");
}

#[tokio::test]
async fn login_returns_401_for_wrong_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "john@example.com").await;

    let login_body = json!({
        "email": "john@example.com",
        "password": "WrongPassword123"
    });

    let response = client
        .post(&format!("{}/api/auth/login", &app.address))
        .json(&login_body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_failures_do_not_reveal_which_factor_failed() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "john@example.com").await;

    // Deactivate the account
    sqlx::query("UPDATE users SET is_active = false WHERE email = 'john@example.com'")
        .execute(&app.db_pool)
        .await
        .expect("Failed to deactivate user");

    let cases = vec![
        json!({"email": "nonexistent@example.com", "password": "SecurePass123"}),
        json!({"email": "john@example.com", "password": "WrongPassword123"}),
        json!({"email": "john@example.com", "password": "SecurePass123"}),
    ];

    let mut bodies = Vec::new();
    for case in cases {
        let response = client
            .post(&format!("{}/api/auth/login", &app.address))
            .json(&case)
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(401, response.status().as_u16());
        let mut body: Value = response.json().await.expect("Failed to parse response");
        // error_id and timestamp vary per response
        body.as_object_mut().unwrap().remove("error_id");
        body.as_object_mut().unwrap().remove("timestamp");
        bodies.push(body);
    }

    assert_eq!(bodies[0], bodies[1], "unknown email vs wrong password");
    assert_eq!(bodies[1], bodies[2], "wrong password vs inactive account");
}

// --- Protected Routes Tests ---

#[tokio::test]
async fn protected_route_returns_401_without_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/api/auth/me", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "MISSING_TOKEN");
}

#[tokio::test]
async fn protected_route_returns_401_with_invalid_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/api/auth/me", &app.address))
        .header("Authorization", "Bearer invalid.token.here")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn protected_route_rejects_malformed_authorization_header() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let malformed_headers = vec![
        "Bearer",             // missing token
        "Basic dXNlcjpwYXNz", // not Bearer
        "BearerToken",        // missing space
        "",                   // empty
    ];

    for header in malformed_headers {
        let response = client
            .get(&format!("{}/api/auth/me", &app.address))
            .header("Authorization", header)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(
            401,
            response.status().as_u16(),
            "Should reject malformed header: {}",
            header
        );
    }
}

#[tokio::test]
async fn validate_endpoint_echoes_claims() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let tokens = register_user(&app, &client, "john@example.com").await;
    let access_token = tokens["access_token"].as_str().unwrap();

    let response = client
        .get(&format!("{}/api/auth/validate", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["valid"], true);
    assert_eq!(body["user"]["email"], "john@example.com");
}

// --- Token Refresh Tests ---

#[tokio::test]
async fn refresh_rotates_the_refresh_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let tokens = register_user(&app, &client, "john@example.com").await;
    let old_refresh_token = tokens["refresh_token"].as_str().unwrap();

    let response = client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": old_refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.get("access_token").is_some());
    let new_refresh_token = body["refresh_token"].as_str().expect("No new refresh token");

    assert_ne!(
        old_refresh_token, new_refresh_token,
        "Refresh token should be rotated on each refresh"
    );
}

#[tokio::test]
async fn replaying_a_consumed_refresh_token_returns_401() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let tokens = register_user(&app, &client, "john@example.com").await;
    let t0 = tokens["refresh_token"].as_str().unwrap();

    // Refresh(T0) succeeds
    let first = client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": t0 }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, first.status().as_u16());

    // Refresh(T0) again is a replay
    let second = client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": t0 }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, second.status().as_u16());
}

#[tokio::test]
async fn concurrent_refresh_has_exactly_one_winner() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let tokens = register_user(&app, &client, "john@example.com").await;
    let t0 = tokens["refresh_token"].as_str().unwrap().to_string();

    let send = |token: String| {
        let client = client.clone();
        let url = format!("{}/api/auth/refresh", &app.address);
        async move {
            client
                .post(&url)
                .json(&json!({ "refresh_token": token }))
                .send()
                .await
                .expect("Failed to execute request.")
                .status()
                .as_u16()
        }
    };

    let (a, b) = tokio::join!(send(t0.clone()), send(t0));

    let mut statuses = [a, b];
    statuses.sort_unstable();
    assert_eq!(
        statuses,
        [200, 401],
        "exactly one concurrent refresh may win"
    );
}

#[tokio::test]
async fn refresh_returns_401_for_unknown_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": "definitely_not_a_valid_token_in_database" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_400_for_missing_token_field() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_401_for_deactivated_owner() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let tokens = register_user(&app, &client, "john@example.com").await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    sqlx::query("UPDATE users SET is_active = false WHERE email = 'john@example.com'")
        .execute(&app.db_pool)
        .await
        .expect("Failed to deactivate user");

    let response = client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

// --- Logout Tests ---

#[tokio::test]
async fn logout_revokes_the_refresh_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let tokens = register_user(&app, &client, "john@example.com").await;
    let access_token = tokens["access_token"].as_str().unwrap();
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    let logout = client
        .post(&format!("{}/api/auth/logout", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, logout.status().as_u16());

    // Logout(T) then Refresh(T) always fails
    let refresh = client
        .post(&format!("{}/api/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, refresh.status().as_u16());
}

#[tokio::test]
async fn logout_is_idempotent() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let tokens = register_user(&app, &client, "john@example.com").await;
    let access_token = tokens["access_token"].as_str().unwrap();
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    for _ in 0..2 {
        let response = client
            .post(&format!("{}/api/auth/logout", &app.address))
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(
            200,
            response.status().as_u16(),
            "revoking an already-revoked token is a no-op success"
        );
    }
}

#[tokio::test]
async fn logout_requires_authentication() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/api/auth/logout", &app.address))
        .json(&json!({ "refresh_token": "whatever" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

// --- User Listing Tests ---

#[tokio::test]
async fn list_users_returns_403_for_non_admin() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let tokens = register_user(&app, &client, "john@example.com").await;
    let access_token = tokens["access_token"].as_str().unwrap();

    let response = client
        .get(&format!("{}/api/auth/users", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(403, response.status().as_u16());
}

#[tokio::test]
async fn list_users_returns_all_users_for_admin() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "admin@example.com").await;
    register_user(&app, &client, "john@example.com").await;

    // Promote and log in again so the fresh claims carry the admin role
    sqlx::query("UPDATE users SET role = 'admin' WHERE email = 'admin@example.com'")
        .execute(&app.db_pool)
        .await
        .expect("Failed to promote user");

    let login = client
        .post(&format!("{}/api/auth/login", &app.address))
        .json(&json!({"email": "admin@example.com", "password": "SecurePass123"}))
        .send()
        .await
        .expect("Failed to execute request.");
    let login_body: Value = login.json().await.expect("Failed to parse response");
    let admin_token = login_body["access_token"].as_str().unwrap();

    let response = client
        .get(&format!("{}/api/auth/users", &app.address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let users: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(users.as_array().unwrap().len(), 2);
}
