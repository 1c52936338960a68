//! Identity: credential primitives, bearer resolution, and the account
//! flows shared by both protocol frontends.

pub mod flows;
pub mod password;
pub mod resolver;
pub mod tokens;

pub use flows::TokenGrant;
pub use resolver::{resolve_bearer, resolve_bearer_optional};
pub use tokens::{Claims, TokenError};
