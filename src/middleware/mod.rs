mod auth;
mod client_ip;
mod error_handler;

pub use auth::{AuthUser, auth_middleware};
pub use client_ip::ClientIp;
pub use error_handler::log_errors;
