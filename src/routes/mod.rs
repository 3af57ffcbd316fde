mod auth;
mod health_check;
mod users;

pub use auth::{
    get_current_user, login, logout, refresh, register, validate_token, AuthResponse,
    LoginRequest, RefreshRequest, RegisterRequest, UserResponse,
};
pub use health_check::health_check;
pub use users::list_users;
