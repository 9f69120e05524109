//! Authentication adapters.
//!
//! - `jwt` - HMAC-signed JWT validation for the `TokenValidator` port

mod jwt;

pub use jwt::JwtTokenValidator;
