pub mod auth;

pub use auth::{extract_token, validate_jwt, AuthError, AuthGate, AuthedUser};
