// Authentication module
// JWT bearer authentication for studio users and staff, argon2 password checks

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod token;

// Re-export commonly used types
pub use error::AuthError;
pub use handlers::{login_handler, update_profile_handler};
pub use middleware::{AuthenticatedUser, StaffUser};
pub use models::{AuthResponse, LoginRequest, UpdateProfileRequest, User, UserResponse};
pub use repository::{PgUserRepository, UserRepository};
pub use service::AuthService;
pub use token::TokenService;
