//! Token issuance and validation for connections authenticating via
//! `CreateConn`.

pub mod error;
pub mod jwt;

pub use error::{Error, Result};
pub use jwt::{Claims, JwtSigner};
