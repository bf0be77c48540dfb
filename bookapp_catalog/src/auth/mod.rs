pub use identity::Identity;
pub use jwt::{Claims, JwtService, TokenError};
pub use middleware::authentication_filter;

mod identity;
mod jwt;
mod middleware;
pub mod password;
