/// Authentication module
///
/// Handles JWT token generation/validation, password hashing,
/// and refresh token management.

mod claims;
mod jwt;
mod password;
mod refresh_token;

pub use claims::{Claims, ADMIN_ROLE};
pub use jwt::generate_access_token;
pub use jwt::validate_access_token;
pub use password::hash_password;
pub use password::verify_dummy_password;
pub use password::verify_password;
pub use refresh_token::consume_refresh_token;
pub use refresh_token::generate_refresh_token;
pub use refresh_token::revoke_refresh_token;
pub use refresh_token::save_refresh_token;
